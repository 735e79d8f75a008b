//! Lint gate over first-party sources.
//!
//! Every `.js`/`.mjs` file and every component `<script>` block under the
//! source directory is parsed with oxc and checked for syntax errors and
//! `debugger` statements. Results are cached per file content hash,
//! independently of the transform cache, and persisted as JSON so unchanged
//! files are not re-linted across runs.
//!
//! Findings are reported as diagnostics. With `fail_on_error` set, any
//! error-level finding fails the build instead.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use kiln_config::ConfigError;
use oxc_allocator::Allocator;
use oxc_ast::ast::DebuggerStatement;
use oxc_ast_visit::Visit;
use oxc_parser::Parser;
use oxc_span::SourceType;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::registry::{PluginId, parse_params};
use super::{BuildContext, Plugin, PluginPhase};
use crate::asset::AssetId;
use crate::cache::content_hash;
use crate::diagnostics::{Diagnostic, DiagnosticOrigin, DiagnosticSeverity};
use crate::graph::BlockKind;
use crate::transform::split_component;
use crate::{Error, Result};

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    pub rule: String,
    pub severity: DiagnosticSeverity,
    /// 1-based; absent when the parser reports no position.
    pub line: Option<u32>,
    pub message: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LintCache {
    version: u32,
    entries: HashMap<String, Vec<Finding>>,
}

#[derive(Debug, Deserialize)]
struct Params {
    include: PathBuf,
    #[serde(default)]
    fail_on_error: bool,
    #[serde(default)]
    cache_file: Option<PathBuf>,
}

pub struct LintGate {
    include: PathBuf,
    fail_on_error: bool,
    cache_file: Option<PathBuf>,
    /// Loaded on first use, then kept for the life of the plugin.
    cache: Mutex<Option<LintCache>>,
}

impl LintGate {
    pub fn from_params(params: &serde_json::Value) -> std::result::Result<Self, ConfigError> {
        let params: Params = parse_params(PluginId::LintGate, params)?;
        Ok(Self {
            include: params.include,
            fail_on_error: params.fail_on_error,
            cache_file: params.cache_file,
            cache: Mutex::new(None),
        })
    }

    fn load_cache(&self) -> LintCache {
        let Some(path) = &self.cache_file else {
            return LintCache::default();
        };
        let cache = fs::read(path)
            .ok()
            .and_then(|bytes| serde_json::from_slice::<LintCache>(&bytes).ok())
            .filter(|cache| cache.version == CACHE_VERSION);
        cache.unwrap_or_else(|| LintCache {
            version: CACHE_VERSION,
            entries: HashMap::new(),
        })
    }

    fn save_cache(&self, cache: &LintCache) {
        let Some(path) = &self.cache_file else {
            return;
        };
        let result = (|| -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let json = serde_json::to_vec(cache).map_err(std::io::Error::other)?;
            let tmp = path.with_extension("tmp");
            fs::write(&tmp, json)?;
            fs::rename(&tmp, path)
        })();
        if let Err(e) = result {
            warn!(path = %path.display(), "failed to persist lint cache: {e}");
        }
    }

    fn sources(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.include)
            .filter_entry(|entry| entry.file_name() != "node_modules")
            .build();
        let mut files: Vec<PathBuf> = walker
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
            .map(|entry| entry.into_path())
            .filter(|path| {
                matches!(
                    path.extension().and_then(|e| e.to_str()),
                    Some("js" | "mjs" | "vue")
                )
            })
            .collect();
        files.sort();
        files
    }
}

impl Plugin for LintGate {
    fn name(&self) -> &'static str {
        "lint-gate"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Analyze
    }

    fn apply(
        &self,
        _graph: &mut crate::graph::BuildGraph,
        cx: &BuildContext<'_>,
    ) -> Result<Vec<Diagnostic>> {
        if !self.include.is_dir() {
            return Ok(Vec::new());
        }

        let mut guard = self.cache.lock();
        let cache = guard.get_or_insert_with(|| self.load_cache());
        let shared = Mutex::new(std::mem::take(&mut cache.entries));

        let results: Vec<(PathBuf, String, Vec<Finding>)> = self
            .sources()
            .into_par_iter()
            .filter_map(|path| {
                let source = fs::read_to_string(&path).ok()?;
                let hash = content_hash(source.as_bytes());
                if let Some(findings) = shared.lock().get(&hash) {
                    return Some((path, hash, findings.clone()));
                }
                let findings = lint_file(&path, &source);
                shared.lock().insert(hash.clone(), findings.clone());
                Some((path, hash, findings))
            })
            .collect();

        // Forget results for content that no longer exists.
        let mut entries = shared.into_inner();
        entries.retain(|hash, _| results.iter().any(|(_, h, _)| h == hash));
        cache.entries = entries;
        self.save_cache(cache);
        drop(guard);

        let mut diagnostics = Vec::new();
        let mut errors = 0;
        for (path, _, findings) in &results {
            let asset = AssetId::from_path(&cx.config.root, path);
            for finding in findings {
                let message = match finding.line {
                    Some(line) => format!("line {line}: {} ({})", finding.message, finding.rule),
                    None => format!("{} ({})", finding.message, finding.rule),
                };
                diagnostics.push(match finding.severity {
                    DiagnosticSeverity::Error => {
                        errors += 1;
                        Diagnostic::error(DiagnosticOrigin::Lint, Some(asset.clone()), message)
                    }
                    DiagnosticSeverity::Warning => {
                        Diagnostic::warning(DiagnosticOrigin::Lint, Some(asset.clone()), message)
                    }
                });
            }
        }

        info!(files = results.len(), findings = diagnostics.len(), "lint finished");
        if self.fail_on_error && errors > 0 {
            return Err(Error::Plugin {
                plugin: self.name().to_string(),
                message: format!(
                    "{errors} lint error(s): {}",
                    diagnostics
                        .iter()
                        .filter(|d| d.severity == DiagnosticSeverity::Error)
                        .map(ToString::to_string)
                        .collect::<Vec<_>>()
                        .join("; ")
                ),
            });
        }
        Ok(diagnostics)
    }
}

#[derive(Default)]
struct DebuggerFinder {
    offsets: Vec<u32>,
}

impl<'a> Visit<'a> for DebuggerFinder {
    fn visit_debugger_statement(&mut self, it: &DebuggerStatement) {
        self.offsets.push(it.span.start);
    }
}

fn line_of(source: &str, offset: u32) -> u32 {
    let end = (offset as usize).min(source.len());
    source.as_bytes()[..end].iter().filter(|b| **b == b'\n').count() as u32 + 1
}

/// Lint one file. Component files are linted through their script block.
pub fn lint_file(path: &Path, source: &str) -> Vec<Finding> {
    if path.extension().is_some_and(|e| e == "vue") {
        let blocks = match split_component(source) {
            Ok(blocks) => blocks,
            Err(message) => {
                return vec![Finding {
                    rule: "parse".into(),
                    severity: DiagnosticSeverity::Error,
                    line: None,
                    message,
                }];
            }
        };
        let Some(script) = blocks.iter().find(|b| b.kind == BlockKind::Script) else {
            return Vec::new();
        };
        let offset = source
            .find(script.content.as_str())
            .map_or(0, |at| line_of(source, at as u32) - 1);
        let mut findings = lint_script(&script.content);
        for finding in &mut findings {
            finding.line = finding.line.map(|l| l + offset);
        }
        return findings;
    }
    lint_script(source)
}

fn lint_script(source: &str) -> Vec<Finding> {
    let allocator = Allocator::default();
    let parsed = Parser::new(&allocator, source, SourceType::mjs()).parse();
    if !parsed.errors.is_empty() {
        return parsed
            .errors
            .iter()
            .map(|e| Finding {
                rule: "parse".into(),
                severity: DiagnosticSeverity::Error,
                line: None,
                message: e.to_string(),
            })
            .collect();
    }

    let mut finder = DebuggerFinder::default();
    finder.visit_program(&parsed.program);
    finder
        .offsets
        .into_iter()
        .map(|offset| Finding {
            rule: "no-debugger".into(),
            severity: DiagnosticSeverity::Error,
            line: Some(line_of(source, offset)),
            message: "unexpected 'debugger' statement".into(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::BuildGraph;
    use kiln_config::{BuildMode, KilnConfig};
    use serde_json::json;

    fn project() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(src.join("node_modules/pkg")).unwrap();
        fs::write(src.join("ok.js"), "export const a = 1;\n").unwrap();
        fs::write(src.join("bad.js"), "let a = 1;\n\ndebugger;\n").unwrap();
        fs::write(
            src.join("App.vue"),
            "<template><p/></template>\n<script>\nexport default {\n  mounted() { debugger }\n}\n</script>\n",
        )
        .unwrap();
        fs::write(src.join("node_modules/pkg/index.js"), "debugger;").unwrap();
        dir
    }

    fn gate(dir: &Path, fail_on_error: bool) -> LintGate {
        LintGate::from_params(&json!({
            "include": dir.join("src"),
            "fail_on_error": fail_on_error,
            "cache_file": dir.join("cache/.lintcache"),
        }))
        .unwrap()
    }

    fn run(gate: &LintGate, root: &Path) -> Result<Vec<Diagnostic>> {
        let base = KilnConfig {
            root: root.to_path_buf(),
            ..KilnConfig::default()
        };
        let config = kiln_config::resolve(BuildMode::Development, &base);
        gate.apply(&mut BuildGraph::default(), &BuildContext { config: &config })
    }

    #[test]
    fn reports_debugger_statements_with_lines() {
        let dir = project();
        let diagnostics = run(&gate(dir.path(), false), dir.path()).unwrap();

        let rendered: Vec<String> = diagnostics.iter().map(ToString::to_string).collect();
        assert_eq!(rendered.len(), 2, "{rendered:?}");
        assert!(rendered.contains(
            &"[lint] src/bad.js: line 3: unexpected 'debugger' statement (no-debugger)".to_string()
        ));
        assert!(rendered.iter().any(|d| d.starts_with("[lint] src/App.vue: line 4:")));
        assert!(diagnostics.iter().all(|d| d.origin == DiagnosticOrigin::Lint));
        assert!(dir.path().join("cache/.lintcache").is_file());
    }

    #[test]
    fn cache_survives_a_fresh_plugin() {
        let dir = project();
        let first = run(&gate(dir.path(), false), dir.path()).unwrap();
        let cache = fs::read_to_string(dir.path().join("cache/.lintcache")).unwrap();
        assert!(cache.contains("no-debugger"));

        let second = run(&gate(dir.path(), false), dir.path()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn fail_on_error_turns_findings_fatal() {
        let dir = project();
        let err = run(&gate(dir.path(), true), dir.path()).unwrap_err();
        assert!(matches!(err, Error::Plugin { ref plugin, .. } if plugin == "lint-gate"));
    }

    #[test]
    fn syntax_errors_are_findings() {
        let findings = lint_file(Path::new("x.js"), "let = ;");
        assert_eq!(findings[0].rule, "parse");
    }
}
