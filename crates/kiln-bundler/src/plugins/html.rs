//! HTML shell emission.
//!
//! Reads the HTML template (or a minimal built-in shell when it is missing),
//! substitutes `<%= BASE_URL %>` with the public path, and injects a
//! `<link>` per stylesheet before `</head>` and a deferred `<script>` per
//! script chunk before `</body>`. Chunks load runtime first, then vendor
//! and shared code, then entries.

use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use kiln_config::ConfigError;
use serde::Deserialize;
use tracing::debug;

use super::registry::{PluginId, parse_params};
use super::{BuildContext, Plugin, PluginPhase};
use crate::diagnostics::Diagnostic;
use crate::graph::{BuildGraph, ChunkKind, OutputFile, OutputKind};
use crate::{Error, Result};

const DEFAULT_SHELL: &str = "<!DOCTYPE html>
<html lang=\"en\">
  <head>
    <meta charset=\"utf-8\">
    <meta name=\"viewport\" content=\"width=device-width,initial-scale=1\">
    <title>kiln app</title>
  </head>
  <body>
    <div id=\"app\"></div>
  </body>
</html>
";

#[derive(Debug, Clone, Deserialize)]
pub struct HtmlEmit {
    template: PathBuf,
    filename: String,
    public_path: String,
}

impl HtmlEmit {
    pub fn from_params(params: &serde_json::Value) -> std::result::Result<Self, ConfigError> {
        parse_params(PluginId::HtmlEmit, params)
    }

    fn read_template(&self) -> Result<String> {
        match fs::read_to_string(&self.template) {
            Ok(template) => Ok(template),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(template = %self.template.display(), "no HTML template, using default shell");
                Ok(DEFAULT_SHELL.to_string())
            }
            Err(source) => Err(Error::IoError {
                message: format!(
                    "failed to read HTML template '{}'",
                    self.template.display()
                ),
                source,
            }),
        }
    }

    /// Render the shell around the given stylesheet and script paths.
    pub fn render(&self, template: &str, styles: &[&str], scripts: &[&str]) -> String {
        let html = template.replace("<%= BASE_URL %>", &self.public_path);

        let mut links = String::new();
        for href in styles {
            let _ = writeln!(
                links,
                "    <link href=\"{}{}\" rel=\"stylesheet\">",
                self.public_path, href
            );
        }
        let mut tags = String::new();
        for src in scripts {
            let _ = writeln!(
                tags,
                "    <script defer src=\"{}{}\"></script>",
                self.public_path, src
            );
        }

        let html = insert_before(&html, "</head>", &links);
        insert_before(&html, "</body>", &tags)
    }
}

/// Insert `fragment` before the last `marker` (case-insensitive), or append.
fn insert_before(html: &str, marker: &str, fragment: &str) -> String {
    if fragment.is_empty() {
        return html.to_string();
    }
    match html.to_ascii_lowercase().rfind(marker) {
        Some(at) => format!("{}{}{}", &html[..at], fragment, &html[at..]),
        None => format!("{html}{fragment}"),
    }
}

impl Plugin for HtmlEmit {
    fn name(&self) -> &'static str {
        "html-emit"
    }

    fn phase(&self) -> PluginPhase {
        PluginPhase::Finalize
    }

    fn apply(&self, graph: &mut BuildGraph, _cx: &BuildContext<'_>) -> Result<Vec<Diagnostic>> {
        let template = self.read_template()?;

        // (kind, chunk position) so ties keep split order.
        let rank = |origin: Option<&String>| {
            origin
                .and_then(|name| graph.chunks.iter().position(|c| &c.name == name))
                .map(|i| (graph.chunks[i].kind, i))
                .unwrap_or((ChunkKind::Entry, usize::MAX))
        };
        let mut styles: Vec<_> = graph
            .files
            .iter()
            .filter(|f| f.kind == OutputKind::Style)
            .map(|f| (rank(f.origin.as_ref()), f.path.as_str()))
            .collect();
        let mut scripts: Vec<_> = graph
            .files
            .iter()
            .filter(|f| f.kind == OutputKind::Script)
            .map(|f| (rank(f.origin.as_ref()), f.path.as_str()))
            .collect();
        styles.sort();
        scripts.sort();

        let styles: Vec<&str> = styles.into_iter().map(|(_, p)| p).collect();
        let scripts: Vec<&str> = scripts.into_iter().map(|(_, p)| p).collect();
        let html = self.render(&template, &styles, &scripts);

        graph.files.retain(|f| f.path != self.filename);
        graph.files.push(OutputFile {
            path: self.filename.clone(),
            contents: html.into_bytes(),
            kind: OutputKind::Html,
            origin: None,
        });
        Ok(Vec::new())
    }
}
