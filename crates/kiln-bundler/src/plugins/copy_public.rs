//! Mirrors the public directory into the output.
//!
//! Files matching any `ignore` glob are skipped; the default ignores the
//! HTML template, which the html plugin already emits processed. A public
//! file whose path collides with a built output is skipped with a warning.

use std::fs;
use std::path::PathBuf;

use ignore::WalkBuilder;
use ignore::overrides::OverrideBuilder;
use kiln_config::ConfigError;
use serde::Deserialize;
use tracing::debug;

use super::registry::{PluginId, parse_params};
use super::{BuildContext, Plugin, PluginPhase};
use crate::asset::AssetId;
use crate::diagnostics::{Diagnostic, DiagnosticOrigin};
use crate::graph::{BuildGraph, OutputFile, OutputKind};
use crate::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct CopyPublic {
    from: PathBuf,
    #[serde(default)]
    ignore: Vec<String>,
    #[serde(default = "enabled")]
    enabled: bool,
}

fn enabled() -> bool {
    true
}

impl CopyPublic {
    pub fn from_params(params: &serde_json::Value) -> std::result::Result<Self, ConfigError> {
        parse_params(PluginId::CopyPublic, params)
    }

    fn plugin_error(&self, message: impl Into<String>) -> Error {
        Error::Plugin {
            plugin: self.name().to_string(),
            message: message.into(),
        }
    }

    /// Public files to copy, as (output path, absolute path), sorted.
    fn collect(&self) -> Result<Vec<(String, PathBuf)>> {
        let mut overrides = OverrideBuilder::new(&self.from);
        for glob in &self.ignore {
            overrides
                .add(&format!("!{glob}"))
                .map_err(|e| self.plugin_error(format!("invalid ignore glob '{glob}': {e}")))?;
        }
        let overrides = overrides
            .build()
            .map_err(|e| self.plugin_error(e.to_string()))?;

        let mut files = Vec::new();
        let walker = WalkBuilder::new(&self.from)
            .hidden(false)
            .ignore(false)
            .parents(false)
            .git_ignore(false)
            .git_exclude(false)
            .git_global(false)
            .overrides(overrides)
            .build();
        for entry in walker {
            let entry = entry.map_err(|e| self.plugin_error(e.to_string()))?;
            if !entry.file_type().is_some_and(|t| t.is_file()) {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.from)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            files.push((relative, entry.into_path()));
        }
        files.sort();
        Ok(files)
    }
}

impl Plugin for CopyPublic {
    fn name(&self) -> &'static str {
        "copy-public"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Finalize
    }

    fn apply(&self, graph: &mut BuildGraph, _cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>> {
        if !self.enabled || !self.from.is_dir() {
            debug!(from = %self.from.display(), "nothing to copy");
            return Ok(Vec::new());
        }

        let mut warnings = Vec::new();
        for (path, source) in self.collect()? {
            if graph.file(&path).is_some() {
                warnings.push(Diagnostic::warning(
                    DiagnosticOrigin::Plugin,
                    Some(AssetId::new(path.as_str())),
                    "public file collides with a built output and was not copied",
                ));
                continue;
            }
            let contents = fs::read(&source).map_err(|e| Error::IoError {
                message: format!("failed to read public file '{}'", source.display()),
                source: e,
            })?;
            graph.files.push(OutputFile {
                path,
                contents,
                kind: OutputKind::Static,
                origin: None,
            });
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_config::BuildMode;

    #[test]
    fn copies_public_tree_except_ignored_and_colliding() {
        let dir = tempfile::tempdir().unwrap();
        let public = dir.path().join("public");
        fs::create_dir_all(public.join("img")).unwrap();
        fs::write(public.join("index.html"), "<html></html>").unwrap();
        fs::write(public.join("favicon.ico"), [0u8, 1, 2]).unwrap();
        fs::write(public.join("img/bg.png"), [9u8]).unwrap();
        fs::write(public.join(".well-known"), "x").unwrap();
        fs::write(public.join("robots.txt"), "User-agent: *").unwrap();

        let plugin = CopyPublic {
            from: public,
            ignore: vec!["**/index.html".into()],
            enabled: true,
        };
        let mut graph = BuildGraph::default();
        graph.files.push(OutputFile {
            path: "robots.txt".into(),
            contents: Vec::new(),
            kind: OutputKind::Static,
            origin: None,
        });

        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        let warnings = plugin
            .apply(&mut graph, &BuildContext { config: &config })
            .unwrap();

        let mut paths: Vec<_> = graph.files.iter().map(|f| f.path.as_str()).collect();
        paths.sort();
        assert_eq!(
            paths,
            vec![".well-known", "favicon.ico", "img/bg.png", "robots.txt"]
        );
        assert_eq!(warnings.len(), 1);
        assert_eq!(graph.file("img/bg.png").unwrap().contents, vec![9u8]);
    }

    #[test]
    fn missing_public_dir_is_not_an_error() {
        let plugin = CopyPublic {
            from: PathBuf::from("/nonexistent/public"),
            ignore: Vec::new(),
            enabled: true,
        };
        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        let mut graph = BuildGraph::default();
        assert!(plugin
            .apply(&mut graph, &BuildContext { config: &config })
            .unwrap()
            .is_empty());
        assert!(graph.files.is_empty());
    }
}
