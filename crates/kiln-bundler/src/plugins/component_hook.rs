//! Re-entry of component blocks into dispatch.
//!
//! The component compile step only splits a `.vue` file into blocks. This
//! plugin turns every freshly split component into a small glue module and
//! queues its script and style blocks as virtual assets, so they run
//! through the same chains as standalone `.js` and stylesheet files:
//!
//! ```text
//! import __kiln_script from "src/App.vue?type=script&index=0&lang=js";
//! import "src/App.vue?type=style&index=0&lang=scss";
//! var __kiln_component = __kiln_script || {};
//! __kiln_component.template = "<div>...</div>";
//! export default __kiln_component;
//! ```
//!
//! Templates are attached as strings and compiled by the framework at
//! runtime.

use std::fmt::Write as _;

use tracing::debug;

use super::{BuildContext, Plugin, PluginPhase};
use crate::asset::{Asset, AssetId};
use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::graph::{BlockKind, BuildGraph, Dependency, DependencyKind, ModuleOutput};
use crate::transform::json_string;
use crate::{Error, Result};

pub struct ComponentHook;

impl ComponentHook {
    fn glue(
        &self,
        id: &AssetId,
        blocks: &[crate::graph::ComponentBlock],
        pending: &mut Vec<Asset>,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<(String, Vec<Dependency>)> {
        let mut imports = String::new();
        let mut dependencies = Vec::new();
        let mut has_script = false;
        let mut template = None;

        for block in blocks {
            let kind = match block.kind {
                BlockKind::Template => {
                    if block.lang != "html" {
                        return Err(Error::Plugin {
                            plugin: self.name().to_string(),
                            message: format!(
                                "{id}: <template lang=\"{}\"> is not supported",
                                block.lang
                            ),
                        });
                    }
                    template = Some(block.content.trim());
                    continue;
                }
                BlockKind::Script => "script",
                BlockKind::Style => "style",
            };

            let block_id = AssetId::component_block(id, kind, block.index, &block.lang);
            if block.kind == BlockKind::Script {
                has_script = true;
                let _ = writeln!(
                    imports,
                    "import __kiln_script from {};",
                    json_string(block_id.as_str())
                );
            } else {
                if block.scoped {
                    warnings.push(Diagnostic::warning(
                        DiagnosticOrigin::Plugin,
                        Some(block_id.clone()),
                        "scoped styles are applied globally",
                    ));
                }
                let _ = writeln!(imports, "import {};", json_string(block_id.as_str()));
            }

            dependencies.push(Dependency::resolved(
                block_id.as_str(),
                DependencyKind::Import,
                block_id.clone(),
            ));
            pending.push(Asset::new(block_id, block.content.clone()));
        }

        let mut code = imports;
        if has_script {
            code.push_str("var __kiln_component = __kiln_script || {};\n");
        } else {
            code.push_str("var __kiln_component = {};\n");
        }
        if let Some(template) = template {
            let _ = writeln!(
                code,
                "__kiln_component.template = {};",
                json_string(template)
            );
        }
        code.push_str("export default __kiln_component;\n");
        Ok((code, dependencies))
    }
}

impl Plugin for ComponentHook {
    fn name(&self) -> &'static str {
        "component-hook"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Transform
    }

    fn apply(&self, graph: &mut BuildGraph, _cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>> {
        let mut warnings = Vec::new();
        let mut pending = Vec::new();

        for id in &graph.fresh {
            let Some(module) = graph.modules.get_mut(id) else {
                continue;
            };
            let ModuleOutput::Component { blocks } = &module.output else {
                continue;
            };

            let (code, dependencies) = self.glue(id, blocks, &mut pending, &mut warnings)?;
            debug!(component = %id, blocks = dependencies.len(), "component split");
            module.output = ModuleOutput::Script { code };
            module.dependencies = dependencies;
        }

        for asset in pending {
            if !graph.is_known(&asset.id) {
                graph.pending.push(asset);
            }
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::ModuleType;
    use crate::graph::Module;
    use crate::transform::split_component;
    use kiln_config::BuildMode;

    fn graph_with(source: &str) -> BuildGraph {
        let id = AssetId::new("src/App.vue");
        let mut graph = BuildGraph::default();
        graph.modules.insert(
            id.clone(),
            Module {
                id: id.clone(),
                module_type: ModuleType::Component,
                output: ModuleOutput::Component {
                    blocks: split_component(source).unwrap(),
                },
                dependencies: Vec::new(),
                source_hash: String::new(),
            },
        );
        graph.fresh.push(id);
        graph
    }

    fn apply(graph: &mut BuildGraph) -> Vec<Diagnostic> {
        let config = kiln_config::resolve(BuildMode::Development, &Default::default());
        ComponentHook
            .apply(graph, &BuildContext { config: &config })
            .unwrap()
    }

    #[test]
    fn component_becomes_glue_and_queues_blocks() {
        let mut graph = graph_with(
            "<template><p>{{ msg }}</p></template>\n\
             <script>export default { data() { return { msg: 'hi' } } }</script>\n\
             <style lang=\"scss\" scoped>p { color: red }</style>\n",
        );
        let warnings = apply(&mut graph);

        let module = graph.module(&AssetId::new("src/App.vue")).unwrap();
        let ModuleOutput::Script { code } = &module.output else {
            panic!("expected glue script");
        };
        assert!(code.contains(
            "import __kiln_script from \"src/App.vue?type=script&index=0&lang=js\";"
        ));
        assert!(code.contains("import \"src/App.vue?type=style&index=0&lang=scss\";"));
        assert!(code.contains("__kiln_component.template = \"<p>{{ msg }}</p>\";"));
        assert_eq!(module.dependencies.len(), 2);
        assert!(module.dependencies.iter().all(|d| d.target.is_some()));

        let pending: Vec<_> = graph.pending.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(
            pending,
            vec![
                "src/App.vue?type=script&index=0&lang=js",
                "src/App.vue?type=style&index=0&lang=scss"
            ]
        );
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn template_only_component_gets_empty_options() {
        let mut graph = graph_with("<template><hr></template>");
        apply(&mut graph);
        let module = graph.module(&AssetId::new("src/App.vue")).unwrap();
        let ModuleOutput::Script { code } = &module.output else {
            panic!("expected glue script");
        };
        assert!(code.contains("var __kiln_component = {};"));
        assert!(graph.pending.is_empty());
    }

    #[test]
    fn foreign_template_languages_fail() {
        let mut graph = graph_with("<template lang=\"pug\">p hi</template>");
        let config = kiln_config::resolve(BuildMode::Development, &Default::default());
        let err = ComponentHook
            .apply(&mut graph, &BuildContext { config: &config })
            .unwrap_err();
        assert!(matches!(err, Error::Plugin { .. }));
    }
}
