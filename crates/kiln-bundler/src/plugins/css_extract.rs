//! Standalone stylesheet extraction.
//!
//! Collects the extracted stylesheets of each chunk, in the chunk's module
//! order, into one stylesheet per chunk. Imported stylesheets precede their
//! importers because chunk order is dependency-first.

use super::{BuildContext, Plugin, PluginPhase};
use crate::Result;
use crate::diagnostics::Diagnostic;
use crate::graph::{BuildGraph, ModuleOutput};

pub struct CssExtract;

impl Plugin for CssExtract {
    fn name(&self) -> &'static str {
        "css-extract"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Assemble
    }

    fn apply(&self, graph: &mut BuildGraph, _cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>> {
        let BuildGraph {
            modules, chunks, ..
        } = graph;

        for chunk in chunks.iter_mut() {
            let sheets: Vec<&str> = chunk
                .modules
                .iter()
                .filter_map(|id| match modules.get(id).map(|m| &m.output) {
                    Some(ModuleOutput::Style { css }) if !css.trim().is_empty() => {
                        Some(css.trim_end())
                    }
                    _ => None,
                })
                .collect();

            if !sheets.is_empty() {
                let mut css = sheets.join("\n");
                css.push('\n');
                tracing::debug!(chunk = %chunk.name, sheets = sheets.len(), "extracted styles");
                chunk.style = Some(css);
            }
        }
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetId, ModuleType};
    use crate::graph::{Chunk, ChunkKind, Module};
    use kiln_config::BuildMode;

    fn module(id: &str, output: ModuleOutput) -> Module {
        Module {
            id: AssetId::new(id),
            module_type: ModuleType::Stylesheet,
            output,
            dependencies: Vec::new(),
            source_hash: String::new(),
        }
    }

    #[test]
    fn joins_chunk_styles_in_module_order() {
        let mut graph = BuildGraph::default();
        for m in [
            module("src/base.css", ModuleOutput::Style { css: "body{margin:0}".into() }),
            module("src/app.css", ModuleOutput::Style { css: "p{color:red}".into() }),
            module("src/main.js", ModuleOutput::Script { code: String::new() }),
        ] {
            graph.modules.insert(m.id.clone(), m);
        }
        let mut chunk = Chunk::new("main", ChunkKind::Entry);
        chunk.modules = vec![
            AssetId::new("src/base.css"),
            AssetId::new("src/app.css"),
            AssetId::new("src/main.js"),
        ];
        graph.chunks.push(chunk);
        graph.chunks.push(Chunk::new("runtime~main", ChunkKind::Runtime));

        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        CssExtract
            .apply(&mut graph, &BuildContext { config: &config })
            .unwrap();

        assert_eq!(
            graph.chunk("main").unwrap().style.as_deref(),
            Some("body{margin:0}\np{color:red}\n")
        );
        assert_eq!(graph.chunk("runtime~main").unwrap().style, None);
    }
}
