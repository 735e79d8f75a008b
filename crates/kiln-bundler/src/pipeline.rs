//! The staged build.
//!
//! ```text
//! collect entries
//!   → analyze plugins
//!   → transform rounds (parallel per asset) ⇄ transform plugins ⇄ resolution
//!   → split → link
//!   → assemble plugins
//!   → optimize (production)
//!   → name + fingerprint
//!   → finalize plugins
//!   → emit (production)
//! ```
//!
//! Every stage either completes or fails the whole build. Nothing is written
//! until every stage has succeeded, so a failed or cancelled production
//! build leaves the previous output untouched.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use indexmap::IndexMap;
use kiln_config::{ConfigError, EffectiveConfig};
use rayon::prelude::*;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, info};

use crate::asset::{Asset, AssetId, ModuleType};
use crate::cache::{CacheKey, TransformCache, content_hash};
use crate::diagnostics::Diagnostic;
use crate::graph::{BuildGraph, ChunkKind, Module, ModuleOutput, OutputKind};
use crate::link::{
    DEFINE_PREFIX_LINES, define, factory_body, merge_dependencies, scan_dependencies,
};
use crate::optimize::{entry_chunks, optimize, split_chunks};
use crate::output::{BuildOutput, ModuleRecord, write_output};
use crate::plugins::{BuildContext, Plugin, PluginPhase, PluginRegistry, assemble};
use crate::registry::TransformRegistry;
use crate::resolve::Resolver;
use crate::runtime::{RUNTIME_SOURCE, entry_call};
use crate::sourcemap::LineMap;
use crate::transform::{TransformSet, apply_chain};
use crate::{Error, Result};

/// Shared flag that aborts a running build at the next stage or asset
/// boundary.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

pub struct Pipeline {
    config: EffectiveConfig,
    registry: TransformRegistry,
    transforms: TransformSet,
    plugins: PluginRegistry,
    resolver: Resolver,
    cancel: CancellationFlag,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("mode", &self.config.mode)
            .field("root", &self.config.root)
            .field("plugins", &self.plugins.names())
            .finish_non_exhaustive()
    }
}

fn absolute(path: &Path) -> std::path::PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

impl Pipeline {
    /// Build the rule table and plugin set for `config`.
    pub fn new(config: &EffectiveConfig) -> Result<Self> {
        let mut config = config.clone();
        for path in [
            &mut config.root,
            &mut config.src_dir,
            &mut config.public_dir,
            &mut config.out_dir,
            &mut config.cache_dir,
            &mut config.html_template,
        ] {
            *path = absolute(path);
        }

        let registry = TransformRegistry::builtin(&config)?;
        let plugins = PluginRegistry::from_entries(&assemble(&config))?;
        let resolver = Resolver::new(&config);
        let pipeline = Self {
            config,
            registry,
            transforms: TransformSet::builtin(),
            plugins,
            resolver,
            cancel: CancellationFlag::new(),
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Component blocks only re-enter dispatch through the component hook.
    fn validate(&self) -> Result<()> {
        if self.registry.has_rule_for(ModuleType::Component)
            && !self.plugins.contains("component-hook")
        {
            return Err(ConfigError::InvalidRule {
                rule: "components".to_string(),
                message: "component rule requires the component-hook plugin".to_string(),
            }
            .into());
        }
        Ok(())
    }

    pub fn with_registry(mut self, registry: TransformRegistry) -> Result<Self> {
        self.registry = registry;
        self.validate()?;
        Ok(self)
    }

    /// Swap in external transform implementations.
    pub fn with_transforms(mut self, transforms: TransformSet) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn with_plugins(mut self, plugins: PluginRegistry) -> Result<Self> {
        self.plugins = plugins;
        self.validate()?;
        Ok(self)
    }

    pub fn with_plugin(mut self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugins.add(plugin);
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &EffectiveConfig {
        &self.config
    }

    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Run every stage. In production the output directory is replaced only
    /// once all stages have succeeded.
    pub fn build(&self, cache: &TransformCache) -> Result<BuildOutput> {
        let started = Instant::now();
        let config = &self.config;
        let mut warnings = Vec::new();

        let mut graph = self.collect_entries()?;
        self.run_phase(PluginPhase::Analyze, &mut graph, &mut warnings)?;

        let live_keys = self.transform_all(&mut graph, cache, &mut warnings)?;
        info!(modules = graph.modules.len(), "transformed");
        self.cancel.check()?;

        split_chunks(&mut graph);
        let factories = self.link(&mut graph)?;
        self.cancel.check()?;

        self.run_phase(PluginPhase::Assemble, &mut graph, &mut warnings)?;
        warnings.extend(optimize(&mut graph, config));
        self.cancel.check()?;

        crate::naming::name_outputs(&mut graph, config);
        self.run_phase(PluginPhase::Finalize, &mut graph, &mut warnings)?;
        self.cancel.check()?;

        cache.prune(&live_keys);
        for warning in &warnings {
            warning.log();
        }

        let output = BuildOutput {
            mode: config.mode,
            entrypoints: entrypoints(&graph),
            modules: module_records(&graph, factories),
            files: graph.files,
            warnings,
            written: config.write_to_disk,
        };

        if config.write_to_disk {
            self.cancel.check()?;
            write_output(&output.files, &config.out_dir, config.clean_output)?;
        }

        info!(
            mode = config.mode.as_str(),
            files = output.files.len(),
            warnings = output.warnings.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "build finished"
        );
        Ok(output)
    }

    fn collect_entries(&self) -> Result<BuildGraph> {
        let root = &self.config.root;
        let mut entries = IndexMap::new();
        let mut pending = Vec::new();
        for (name, path) in &self.config.entries {
            let id = AssetId::from_path(root, &root.join(path));
            if !pending.iter().any(|a: &Asset| a.id == id) {
                pending.push(Asset::read(root, id.clone())?);
            }
            entries.insert(name.clone(), id);
        }
        let mut graph = BuildGraph::new(entries);
        graph.pending = pending;
        Ok(graph)
    }

    fn run_phase(
        &self,
        phase: PluginPhase,
        graph: &mut BuildGraph,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<()> {
        let cx = BuildContext {
            config: &self.config,
        };
        for plugin in self.plugins.phase(phase) {
            self.cancel.check()?;
            let found = plugin.apply(graph, &cx)?;
            debug!(plugin = plugin.name(), warnings = found.len(), "plugin applied");
            warnings.extend(found);
        }
        Ok(())
    }

    /// Transform rounds until nothing is pending. Returns the cache keys the
    /// build touched.
    fn transform_all(
        &self,
        graph: &mut BuildGraph,
        cache: &TransformCache,
        warnings: &mut Vec<Diagnostic>,
    ) -> Result<FxHashSet<CacheKey>> {
        let mut live = FxHashSet::default();
        let mut round = 0;

        while !graph.pending.is_empty() {
            self.cancel.check()?;
            round += 1;

            let mut batch = std::mem::take(&mut graph.pending);
            let mut seen = FxHashSet::default();
            batch.retain(|asset| {
                !graph.modules.contains_key(&asset.id) && seen.insert(asset.id.clone())
            });

            let results: Vec<Result<(Module, Vec<CacheKey>)>> = batch
                .par_iter()
                .map(|asset| {
                    self.cancel.check()?;
                    self.transform_one(asset, cache)
                })
                .collect();

            graph.fresh.clear();
            for result in results {
                let (module, keys) = result?;
                live.extend(keys);
                graph.fresh.push(module.id.clone());
                graph.modules.insert(module.id.clone(), module);
            }
            debug!(round, modules = graph.fresh.len(), "transform round");

            self.run_phase(PluginPhase::Transform, graph, warnings)?;
            self.resolve_fresh(graph)?;
        }
        graph.fresh.clear();
        Ok(live)
    }

    fn transform_one(
        &self,
        asset: &Asset,
        cache: &TransformCache,
    ) -> Result<(Module, Vec<CacheKey>)> {
        let chain = self.registry.resolve_chain(&asset.id, self.config.mode)?;
        let out = apply_chain(asset, &chain, &self.transforms, cache, &self.config)?;

        let mut dependencies = out.dependencies;
        if let ModuleOutput::Script { code } = &out.output {
            merge_dependencies(&mut dependencies, scan_dependencies(&asset.id, code)?);
        }

        let module = Module {
            id: asset.id.clone(),
            module_type: out.module_type,
            output: out.output,
            dependencies,
            source_hash: content_hash(&asset.content),
        };
        Ok((module, out.cache_keys))
    }

    /// Resolve the new modules' references and queue unseen targets.
    fn resolve_fresh(&self, graph: &mut BuildGraph) -> Result<()> {
        let mut discovered = Vec::new();
        for id in &graph.fresh {
            let Some(module) = graph.modules.get_mut(id) else {
                continue;
            };
            for dep in module.dependencies.iter_mut().filter(|d| d.target.is_none()) {
                let target = self.resolver.resolve(&dep.specifier, id, &dep.kind)?;
                dep.target = Some(target.clone());
                discovered.push(target);
            }
        }

        for target in discovered {
            if graph.is_known(&target) {
                continue;
            }
            let asset = Asset::read(&self.config.root, target)?;
            graph.pending.push(asset);
        }
        Ok(())
    }

    /// Assemble each chunk's script. Returns every module's `define`
    /// statement, for hot updates.
    fn link(&self, graph: &mut BuildGraph) -> Result<FxHashMap<AssetId, String>> {
        let BuildGraph {
            entries,
            modules,
            chunks,
            ..
        } = graph;

        let linked: Vec<Vec<(AssetId, String)>> = chunks
            .par_iter_mut()
            .map(|chunk| -> Result<Vec<(AssetId, String)>> {
                let mut lines = LineMap::new();
                let mut defined = Vec::new();

                if chunk.kind == ChunkKind::Runtime {
                    lines.push_raw(RUNTIME_SOURCE);
                }
                for id in &chunk.modules {
                    let module = modules.get(id).ok_or_else(|| Error::Transform {
                        step: "link".to_string(),
                        asset: id.to_string(),
                        message: "module missing from graph".to_string(),
                    })?;
                    let statement = define(id, &factory_body(module)?);
                    match module_source(module) {
                        Some(source) => {
                            lines.push_module(id, source, &statement, DEFINE_PREFIX_LINES + 1)
                        }
                        None => lines.push_raw(&statement),
                    }
                    defined.push((id.clone(), statement));
                }
                if chunk.kind == ChunkKind::Entry {
                    for name in &chunk.entries {
                        if let Some(entry) = entries.get(name) {
                            lines.push_raw(&entry_call(entry));
                        }
                    }
                }

                chunk.script = Some(lines.text().to_string());
                chunk.lines = Some(lines);
                Ok(defined)
            })
            .collect::<Result<_>>()?;

        Ok(linked.into_iter().flatten().collect())
    }
}

/// Text the factory body lines were taken from, for source maps.
fn module_source(module: &Module) -> Option<&str> {
    match &module.output {
        ModuleOutput::Script { code } => Some(code),
        ModuleOutput::Json { text } => Some(text),
        _ => None,
    }
}

fn entrypoints(graph: &BuildGraph) -> IndexMap<String, Vec<String>> {
    graph
        .entries
        .keys()
        .map(|entry| {
            let mut paths = Vec::new();
            for chunk in entry_chunks(graph, entry) {
                for file in graph.files.iter().filter(|f| {
                    f.origin.as_deref() == Some(chunk.name.as_str())
                        && matches!(f.kind, OutputKind::Script | OutputKind::Style)
                }) {
                    paths.push(file.path.clone());
                }
            }
            (entry.clone(), paths)
        })
        .collect()
}

fn module_records(
    graph: &BuildGraph,
    mut factories: FxHashMap<AssetId, String>,
) -> IndexMap<AssetId, ModuleRecord> {
    graph
        .modules
        .values()
        .map(|module| {
            let hot_swappable = match (&module.module_type, &module.output) {
                (ModuleType::Stylesheet, ModuleOutput::Script { .. }) => true,
                (_, ModuleOutput::Script { code }) => code.contains("module.hot.accept"),
                _ => false,
            };
            let record = ModuleRecord {
                module_type: module.module_type,
                source_hash: module.source_hash.clone(),
                factory: factories.remove(&module.id),
                hot_swappable,
            };
            (module.id.clone(), record)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::{BuildMode, KilnConfig};
    use std::fs;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(
            src.join("main.js"),
            "import { greet } from \"./greet.js\";\nimport \"./main.css\";\ngreet();\n",
        )
        .unwrap();
        fs::write(
            src.join("greet.js"),
            "export function greet() {\n  return \"hi\";\n}\n",
        )
        .unwrap();
        fs::write(src.join("main.css"), "body { margin: 0; }\n").unwrap();
        dir
    }

    fn config(root: &Path, mode: BuildMode) -> EffectiveConfig {
        let base = KilnConfig {
            root: root.to_path_buf(),
            ..KilnConfig::default()
        };
        let mut config = kiln_config::resolve(mode, &base);
        config.lint.enabled = false;
        config
    }

    #[test]
    fn cancelled_build_returns_cancelled() {
        let dir = project();
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let pipeline = Pipeline::new(&config(dir.path(), BuildMode::Development))
            .unwrap()
            .with_cancellation(cancel);

        let err = pipeline.build(&TransformCache::in_memory()).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn development_build_links_chunks_in_memory() {
        let dir = project();
        let pipeline = Pipeline::new(&config(dir.path(), BuildMode::Development)).unwrap();
        let output = pipeline.build(&TransformCache::in_memory()).unwrap();

        assert!(!output.written);
        assert!(!dir.path().join("dist").exists());
        assert_eq!(
            output.entrypoints["main"],
            vec![
                "static/js/runtime~main.js".to_string(),
                "static/js/main.js".to_string()
            ]
        );

        let main = String::from_utf8(output.file("static/js/main.js").unwrap().contents.clone())
            .unwrap();
        assert!(main.contains("__kiln_define(\"src/greet.js\""));
        assert!(main.contains("__kiln_require(\"src/main.js\");"));
        assert!(main.ends_with("//# sourceMappingURL=main.js.map\n"));
        assert!(output.file("static/js/main.js.map").is_some());

        let css = &output.modules[&AssetId::new("src/main.css")];
        assert!(css.hot_swappable);
        assert!(css.factory.as_deref().unwrap().contains("require.style("));
    }

    #[test]
    fn component_rule_without_hook_is_rejected() {
        let dir = project();
        let pipeline = Pipeline::new(&config(dir.path(), BuildMode::Development)).unwrap();
        let err = pipeline.with_plugins(PluginRegistry::new()).unwrap_err();
        assert!(err.is_config());
    }
}
