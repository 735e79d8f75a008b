//! Image and font steps.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};

use super::{Content, Payload, StepKind, TransformContext, TransformStep, Transformer};
use crate::Result;
use crate::asset::AssetId;
use crate::graph::ModuleOutput;

/// MIME type by extension, for data URIs and the dev server.
pub fn mime_type(ext: &str) -> &'static str {
    match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "woff" => "font/woff",
        "woff2" => "font/woff2",
        "ttf" => "font/ttf",
        "css" => "text/css; charset=utf-8",
        "js" | "mjs" => "text/javascript; charset=utf-8",
        "json" | "map" => "application/json",
        "html" => "text/html; charset=utf-8",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

pub fn data_uri(ext: &str, bytes: &[u8]) -> String {
    format!("data:{};base64,{}", mime_type(ext), BASE64.encode(bytes))
}

fn raw_bytes(content: Content, step: &TransformStep, cx: &TransformContext<'_>) -> Result<Vec<u8>> {
    match content {
        Content::Raw(bytes) => Ok(bytes),
        Content::Css(text) | Content::Script(text) | Content::Json(text) => Ok(text.into_bytes()),
        Content::Module(output) => Err(cx.error(
            step,
            format!("expected file contents, got {}", output.kind_name()),
        )),
    }
}

fn extension(id: &AssetId) -> String {
    id.extension().unwrap_or_default()
}

/// Inlines assets smaller than the step's limit as data URIs and emits the
/// rest as files.
pub struct AssetInliner;

impl Transformer for AssetInliner {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let limit = match step.kind {
            StepKind::AssetInlineOrResource { limit } => limit,
            _ => 0,
        };
        let bytes = raw_bytes(input.content, step, cx)?;
        let ext = extension(cx.asset);

        let output = if (bytes.len() as u64) < limit {
            ModuleOutput::Inline {
                data_uri: data_uri(&ext, &bytes),
            }
        } else {
            ModuleOutput::Resource { bytes, ext }
        };
        Ok(Payload::new(Content::Module(output)).with_dependencies(input.dependencies))
    }
}

/// Always emits the asset as a file.
pub struct AssetResource;

impl Transformer for AssetResource {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        let bytes = raw_bytes(input.content, step, cx)?;
        let output = ModuleOutput::Resource {
            bytes,
            ext: extension(cx.asset),
        };
        Ok(Payload::new(Content::Module(output)).with_dependencies(input.dependencies))
    }
}
