//! Transform steps, the payload they exchange, and chain application.
//!
//! A chain is an ordered list of [`TransformStep`]s. Each step is served by
//! a [`Transformer`] looked up by name in a [`TransformSet`], so any built-in
//! step can be swapped for an external implementation. Steps run strictly in
//! order; the output payload of one step is the input of the next.

mod component;
mod css;
mod media;
mod preprocess;
mod script;
mod script_setup;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use indexmap::IndexMap;
use kiln_config::{BuildMode, EffectiveConfig};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::asset::{Asset, AssetId, ModuleType};
use crate::cache::{CacheKey, TransformCache, compute_cache_key};
use crate::graph::{Dependency, ModuleOutput};
use crate::registry::ResolvedChain;
use crate::{Error, Result};

pub use component::{ComponentCompiler, split_component};
pub use css::{CssDependencies, Prefixer, StyleExtract, StyleInject, css_placeholder};
pub use media::{AssetInliner, AssetResource, data_uri, mime_type};
pub use preprocess::Preprocessor;
pub use script::Downlevel;
pub(crate) use css::json_string;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreprocessorKind {
    Less,
    Sass,
    Stylus,
}

impl PreprocessorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PreprocessorKind::Less => "less",
            PreprocessorKind::Sass => "sass",
            PreprocessorKind::Stylus => "stylus",
        }
    }
}

/// What a step does. The step name used for lookup and diagnostics is
/// [`StepKind::name`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "kebab-case")]
pub enum StepKind {
    Preprocess { lang: PreprocessorKind },
    Prefix,
    CssDeps,
    StyleInject,
    StyleExtract,
    Downlevel,
    ComponentCompile,
    AssetInlineOrResource { limit: u64 },
    AssetResource,
    Passthrough,
}

impl StepKind {
    pub fn name(&self) -> &'static str {
        match self {
            StepKind::Preprocess { lang } => match lang {
                PreprocessorKind::Less => "preprocess-less",
                PreprocessorKind::Sass => "preprocess-sass",
                PreprocessorKind::Stylus => "preprocess-stylus",
            },
            StepKind::Prefix => "prefix",
            StepKind::CssDeps => "css-deps",
            StepKind::StyleInject => "style-inject",
            StepKind::StyleExtract => "style-extract",
            StepKind::Downlevel => "downlevel",
            StepKind::ComponentCompile => "component-compile",
            StepKind::AssetInlineOrResource { .. } => "asset-inline",
            StepKind::AssetResource => "asset-resource",
            StepKind::Passthrough => "passthrough",
        }
    }

    /// Steps whose output embeds the asset identity, so a cached result for
    /// the same bytes at another path cannot be reused.
    pub fn is_path_sensitive(&self) -> bool {
        matches!(
            self,
            StepKind::CssDeps
                | StepKind::StyleInject
                | StepKind::ComponentCompile
                | StepKind::Preprocess { .. }
        )
    }

    fn default_cache(&self) -> CachePolicy {
        match self {
            StepKind::Downlevel => CachePolicy::Disk,
            StepKind::Passthrough | StepKind::AssetResource => CachePolicy::None,
            _ => CachePolicy::Memory,
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where a step's results may be cached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePolicy {
    None,
    Memory,
    /// Memory plus the on-disk tier under the cache directory.
    Disk,
}

/// One resolved step of a chain. Immutable once the chain is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformStep {
    pub kind: StepKind,
    pub options: IndexMap<String, Value>,
    pub cache: CachePolicy,
}

impl TransformStep {
    pub fn new(kind: StepKind) -> Self {
        Self {
            cache: kind.default_cache(),
            kind,
            options: IndexMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_cache(mut self, cache: CachePolicy) -> Self {
        self.cache = cache;
        self
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn option_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    pub fn option_strings(&self, key: &str) -> Vec<String> {
        self.options
            .get(key)
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Content flowing between steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Content {
    Raw(Vec<u8>),
    Css(String),
    Script(String),
    Json(String),
    /// A step produced a terminal module form.
    Module(ModuleOutput),
}

impl Content {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Content::Raw(_) => "raw",
            Content::Css(_) => "css",
            Content::Script(_) => "script",
            Content::Json(_) => "json",
            Content::Module(output) => output.kind_name(),
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Content::Raw(bytes) => Some(bytes),
            Content::Css(text) | Content::Script(text) | Content::Json(text) => {
                Some(text.as_bytes())
            }
            Content::Module(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub content: Content,
    pub dependencies: Vec<Dependency>,
}

impl Payload {
    pub fn new(content: Content) -> Self {
        Self {
            content,
            dependencies: Vec::new(),
        }
    }

    pub fn raw(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Content::Raw(bytes.into()))
    }

    pub fn with_dependencies(mut self, dependencies: Vec<Dependency>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

/// Read-only facts a transformer may consult.
#[derive(Debug, Clone, Copy)]
pub struct TransformContext<'a> {
    pub root: &'a Path,
    pub asset: &'a AssetId,
    pub mode: BuildMode,
}

impl TransformContext<'_> {
    /// Text of `content`, or a transform error naming `step`.
    pub fn text<'c>(&self, content: &'c Content, step: &TransformStep) -> Result<&'c str> {
        let bytes = content.as_bytes().ok_or_else(|| {
            self.error(
                step,
                format!("expected text input, got {}", content.kind_name()),
            )
        })?;
        std::str::from_utf8(bytes)
            .map_err(|e| self.error(step, format!("input is not valid UTF-8: {e}")))
    }

    pub fn error(&self, step: &TransformStep, message: impl Into<String>) -> Error {
        Error::Transform {
            step: step.name().to_string(),
            asset: self.asset.to_string(),
            message: message.into(),
        }
    }
}

/// A single chain step implementation.
///
/// Implementations must be pure functions of `input`, `step` and the asset
/// identity: results are cached on exactly those inputs.
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        input: Payload,
        step: &TransformStep,
        cx: &TransformContext<'_>,
    ) -> Result<Payload>;
}

struct Passthrough;

impl Transformer for Passthrough {
    fn transform(
        &self,
        input: Payload,
        _step: &TransformStep,
        _cx: &TransformContext<'_>,
    ) -> Result<Payload> {
        Ok(input)
    }
}

/// Transformers by step name.
#[derive(Clone)]
pub struct TransformSet {
    transformers: FxHashMap<&'static str, Arc<dyn Transformer>>,
}

impl TransformSet {
    /// The built-in implementations for every [`StepKind`].
    pub fn builtin() -> Self {
        let mut transformers: FxHashMap<&'static str, Arc<dyn Transformer>> =
            FxHashMap::default();
        let preprocessor: Arc<dyn Transformer> = Arc::new(Preprocessor);
        for lang in [
            PreprocessorKind::Less,
            PreprocessorKind::Sass,
            PreprocessorKind::Stylus,
        ] {
            transformers.insert(
                StepKind::Preprocess { lang }.name(),
                Arc::clone(&preprocessor),
            );
        }
        transformers.insert(StepKind::Prefix.name(), Arc::new(Prefixer));
        transformers.insert(StepKind::CssDeps.name(), Arc::new(CssDependencies));
        transformers.insert(StepKind::StyleInject.name(), Arc::new(StyleInject));
        transformers.insert(StepKind::StyleExtract.name(), Arc::new(StyleExtract));
        transformers.insert(StepKind::Downlevel.name(), Arc::new(Downlevel));
        transformers.insert(
            StepKind::ComponentCompile.name(),
            Arc::new(ComponentCompiler),
        );
        transformers.insert(
            StepKind::AssetInlineOrResource { limit: 0 }.name(),
            Arc::new(AssetInliner),
        );
        transformers.insert(StepKind::AssetResource.name(), Arc::new(AssetResource));
        transformers.insert(StepKind::Passthrough.name(), Arc::new(Passthrough));
        Self { transformers }
    }

    /// Replace the implementation of one step.
    pub fn with_override(mut self, step: StepKind, transformer: Arc<dyn Transformer>) -> Self {
        self.transformers.insert(step.name(), transformer);
        self
    }

    pub fn get(&self, step: &TransformStep) -> Option<&Arc<dyn Transformer>> {
        self.transformers.get(step.name())
    }
}

impl Default for TransformSet {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for TransformSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.transformers.keys().collect();
        names.sort();
        f.debug_struct("TransformSet").field("steps", &names).finish()
    }
}

/// Result of running one asset through its chain.
#[derive(Debug, Clone)]
pub struct ChainOutput {
    pub module_type: ModuleType,
    pub output: ModuleOutput,
    pub dependencies: Vec<Dependency>,
    /// Cache keys touched, so callers can prune everything else.
    pub cache_keys: Vec<CacheKey>,
}

/// Run `asset` through `chain`, consulting `cache` per step.
pub fn apply_chain(
    asset: &Asset,
    chain: &ResolvedChain,
    transforms: &TransformSet,
    cache: &TransformCache,
    config: &EffectiveConfig,
) -> Result<ChainOutput> {
    let cx = TransformContext {
        root: &config.root,
        asset: &asset.id,
        mode: config.mode,
    };
    let mut payload = Payload::raw(asset.content.clone());
    let mut cache_keys = Vec::new();

    for step in chain.steps.iter() {
        let transformer = transforms.get(step).ok_or_else(|| {
            cx.error(step, "no transformer registered for this step")
        })?;

        if step.cache == CachePolicy::None {
            payload = transformer.transform(payload, step, &cx)?;
            continue;
        }

        let key = compute_cache_key(step, &payload, &asset.id);
        payload = match cache.get(&key, step.cache) {
            Some(hit) => hit,
            None => {
                let out = transformer.transform(payload, step, &cx)?;
                cache.put(key.clone(), &out, step.cache);
                out
            }
        };
        cache_keys.push(key);
    }

    debug!(
        asset = %asset.id,
        rule = chain.rule,
        steps = chain.steps.len(),
        "applied transform chain"
    );

    let output = finalize(payload.content, chain.module_type, &asset.id);
    Ok(ChainOutput {
        module_type: chain.module_type,
        output,
        dependencies: payload.dependencies,
        cache_keys,
    })
}

/// Map whatever the last step produced onto a terminal module form.
fn finalize(content: Content, module_type: ModuleType, id: &AssetId) -> ModuleOutput {
    match content {
        Content::Module(output) => output,
        Content::Script(code) => ModuleOutput::Script { code },
        Content::Json(text) => ModuleOutput::Json { text },
        Content::Css(css) => ModuleOutput::Style { css },
        Content::Raw(bytes) => match module_type {
            ModuleType::Script => ModuleOutput::Script {
                code: String::from_utf8_lossy(&bytes).into_owned(),
            },
            ModuleType::Json => ModuleOutput::Json {
                text: String::from_utf8_lossy(&bytes).into_owned(),
            },
            _ => ModuleOutput::Resource {
                bytes,
                ext: id.extension().unwrap_or_default(),
            },
        },
    }
}
