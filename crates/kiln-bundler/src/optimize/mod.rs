//! Post-transform passes.
//!
//! [`split_chunks`] runs in every mode. [`optimize`] runs the production
//! passes: script and stylesheet minification over assembled chunks, and
//! recompression of emitted images. The passes touch disjoint data, and a
//! failure in any of them degrades to the unoptimized input with an
//! [`DiagnosticOrigin::Optimization`] warning.

mod css;
mod image;
mod jpeg;
mod js;
mod split;
mod svg;

use kiln_config::EffectiveConfig;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::asset::{AssetId, ModuleType};
use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::graph::{BuildGraph, Chunk, ModuleOutput};

pub use css::minify_stylesheet;
pub use image::{PNG_MIN_PSNR, recompress};
pub use js::{MinifiedScript, minify_script};
pub use split::{COMMON_CHUNK, VENDOR_CHUNK, entry_chunks, split_chunks};
pub use svg::optimize_svg;

/// Run every pass `config` enables.
pub fn optimize(graph: &mut BuildGraph, config: &EffectiveConfig) -> Vec<Diagnostic> {
    let mut warnings = Vec::new();
    if config.minify {
        warnings.extend(minify_chunks(&mut graph.chunks, config));
    }
    if config.optimize_images {
        warnings.extend(recompress_images(graph));
    }
    info!(warnings = warnings.len(), "optimization finished");
    warnings
}

fn chunk_warning(chunk: &Chunk, message: String) -> Diagnostic {
    Diagnostic::warning(
        DiagnosticOrigin::Optimization,
        Some(AssetId::new(chunk.name.as_str())),
        message,
    )
}

fn minify_chunks(chunks: &mut [Chunk], config: &EffectiveConfig) -> Vec<Diagnostic> {
    chunks
        .par_iter_mut()
        .flat_map_iter(|chunk| {
            let mut warnings = Vec::new();

            if let Some(script) = &chunk.script {
                match minify_script(script, Some(&chunk.name)) {
                    Ok(minified) => {
                        chunk.script_map = match (&chunk.lines, &minified.map) {
                            (Some(lines), Some(map)) => Some(lines.compose(map, config.source_map)),
                            _ => None,
                        };
                        chunk.script = Some(minified.code);
                    }
                    Err(message) => warnings.push(chunk_warning(chunk, message)),
                }
            }

            if let Some(style) = &chunk.style {
                match minify_stylesheet(style, &config.browserslist) {
                    Ok(minified) => chunk.style = Some(minified),
                    Err(message) => warnings.push(chunk_warning(chunk, message)),
                }
            }

            debug!(chunk = %chunk.name, "minified");
            warnings
        })
        .collect()
}

fn recompress_images(graph: &mut BuildGraph) -> Vec<Diagnostic> {
    let images: Vec<_> = graph
        .modules
        .values_mut()
        .filter(|m| m.module_type == ModuleType::Image)
        .collect();

    images
        .into_par_iter()
        .filter_map(|module| {
            let ModuleOutput::Resource { bytes, ext } = &mut module.output else {
                return None;
            };
            match recompress(ext, bytes) {
                Ok(Some(rewritten)) => {
                    debug!(asset = %module.id, before = bytes.len(), after = rewritten.len(), "recompressed");
                    *bytes = rewritten;
                    None
                }
                Ok(None) => None,
                Err(message) => Some(Diagnostic::warning(
                    DiagnosticOrigin::Optimization,
                    Some(module.id.clone()),
                    format!("{message}; keeping the original bytes"),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ChunkKind, Module};
    use kiln_config::BuildMode;

    fn image(id: &str, bytes: &[u8]) -> Module {
        Module {
            id: AssetId::new(id),
            module_type: ModuleType::Image,
            output: ModuleOutput::Resource {
                bytes: bytes.to_vec(),
                ext: AssetId::new(id).extension().unwrap_or_default(),
            },
            dependencies: Vec::new(),
            source_hash: String::new(),
        }
    }

    #[test]
    fn corrupt_image_keeps_original_bytes_with_warning() {
        let mut graph = BuildGraph::default();
        let corrupt = b"\x89PNG\r\n\x1a\nthis is not a png".to_vec();
        let module = image("src/assets/broken.png", &corrupt);
        graph.modules.insert(module.id.clone(), module);

        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        let warnings = optimize(&mut graph, &config);

        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].origin, DiagnosticOrigin::Optimization);
        assert_eq!(warnings[0].asset.as_ref().unwrap().as_str(), "src/assets/broken.png");
        let ModuleOutput::Resource { bytes, .. } = &graph.modules[0].output else {
            panic!("resource expected");
        };
        assert_eq!(bytes, &corrupt);
    }

    #[test]
    fn development_runs_no_passes() {
        let mut graph = BuildGraph::default();
        let mut chunk = Chunk::new("main", ChunkKind::Entry);
        chunk.script = Some("var   a = 1;\n".into());
        graph.chunks.push(chunk);
        let module = image("src/a.png", b"broken");
        graph.modules.insert(module.id.clone(), module);

        let config = kiln_config::resolve(BuildMode::Development, &Default::default());
        assert!(optimize(&mut graph, &config).is_empty());
        assert_eq!(graph.chunks[0].script.as_deref(), Some("var   a = 1;\n"));
    }

    #[test]
    fn production_minifies_chunk_text() {
        let mut graph = BuildGraph::default();
        let mut chunk = Chunk::new("main", ChunkKind::Entry);
        chunk.script = Some("var   answer = 40 + 2;\nconsole.log(answer);\n".into());
        chunk.style = Some("p {\n  color: red;\n}\n".into());
        graph.chunks.push(chunk);

        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        assert!(optimize(&mut graph, &config).is_empty());

        let chunk = &graph.chunks[0];
        assert!(!chunk.script.as_deref().unwrap().contains("var   answer"));
        assert_eq!(chunk.style.as_deref(), Some("p{color:red}"));
    }
}
