//! Source maps for script chunks.
//!
//! A chunk is assembled from module factories whose body lines are the
//! module's transformed code, line for line. [`LineMap`] records, while a
//! chunk is assembled, which module line each chunk line came from. That
//! table alone is the unminified map; after minification it is composed
//! with the minifier's own map.
//!
//! [`SourceMapStrategy::Full`] maps every line at column 0 and at its first
//! non-blank column and embeds `sourcesContent`;
//! [`SourceMapStrategy::CheapModule`] maps line starts only and embeds no
//! sources.

use kiln_config::SourceMapStrategy;
use oxc_sourcemap::{SourceMap, SourceMapBuilder};

use crate::asset::AssetId;

/// Prefix for source paths inside maps.
pub const SOURCE_PREFIX: &str = "kiln:///";

#[derive(Debug, Clone, Default)]
pub struct LineMap {
    /// (asset id, code the body lines were taken from)
    sources: Vec<(String, String)>,
    /// For each chunk line: (source index, line in that source).
    lines: Vec<Option<(u32, u32)>>,
    text: String,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    fn push_lines(&mut self, text: &str, mut origin: impl FnMut(usize) -> Option<(u32, u32)>) {
        let count = text.matches('\n').count();
        for i in 0..count {
            self.lines.push(origin(i));
        }
        self.text.push_str(text);
        if !text.ends_with('\n') {
            self.lines.push(origin(count));
            self.text.push('\n');
        }
    }

    /// Append text with no source.
    pub fn push_raw(&mut self, text: &str) {
        self.push_lines(text, |_| None);
    }

    /// Append a module's `define` statement. Lines
    /// `body_offset..body_offset + n` map to lines `0..n` of `original`.
    pub fn push_module(&mut self, id: &AssetId, original: &str, defined: &str, body_offset: u32) {
        let source = self.sources.len() as u32;
        self.sources.push((id.to_string(), original.to_string()));
        let body_lines = original.lines().count().max(1) as u32;
        self.push_lines(defined, |line| {
            let line = line as u32;
            (line >= body_offset && line < body_offset + body_lines)
                .then(|| (source, line - body_offset))
        });
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Where chunk line `line` came from: (asset id, line).
    pub fn origin(&self, line: u32) -> Option<(&str, u32)> {
        let (source, src_line) = (*self.lines.get(line as usize)?)?;
        Some((self.sources[source as usize].0.as_str(), src_line))
    }

    fn builder(&self) -> (SourceMapBuilder, Vec<u32>) {
        let mut builder = SourceMapBuilder::default();
        let ids = self
            .sources
            .iter()
            .map(|(id, content)| {
                builder.set_source_and_content(&format!("{SOURCE_PREFIX}{id}"), content)
            })
            .collect();
        (builder, ids)
    }

    fn indent(&self, source: u32, line: u32) -> u32 {
        self.sources[source as usize]
            .1
            .lines()
            .nth(line as usize)
            .map(|l| (l.len() - l.trim_start().len()) as u32)
            .unwrap_or(0)
    }

    /// Map of the assembled text itself.
    pub fn to_map(&self, strategy: SourceMapStrategy) -> String {
        let (mut builder, ids) = self.builder();
        for (dst_line, origin) in self.lines.iter().enumerate() {
            let Some((source, src_line)) = *origin else {
                continue;
            };
            let dst_line = dst_line as u32;
            let src_id = Some(ids[source as usize]);
            builder.add_token(dst_line, 0, src_line, 0, src_id, None);
            if strategy == SourceMapStrategy::Full {
                let indent = self.indent(source, src_line);
                if indent > 0 {
                    builder.add_token(dst_line, indent, src_line, indent, src_id, None);
                }
            }
        }
        finish(builder.into_sourcemap(), strategy)
    }

    /// Compose with `minified`, a map from minified output back to
    /// [`LineMap::text`].
    pub fn compose(&self, minified: &SourceMap, strategy: SourceMapStrategy) -> String {
        let (mut builder, ids) = self.builder();
        let mut last: Option<(u32, u32, u32)> = None;
        for token in minified.get_tokens() {
            let Some(Some((source, src_line))) = self.lines.get(token.get_src_line() as usize)
            else {
                continue;
            };
            let dst = (token.get_dst_line(), token.get_dst_col(), *src_line);
            if strategy == SourceMapStrategy::CheapModule
                && last.is_some_and(|(line, _, src)| line == dst.0 && src == dst.2)
            {
                continue;
            }
            let src_col = match strategy {
                SourceMapStrategy::Full => token.get_src_col(),
                SourceMapStrategy::CheapModule => 0,
            };
            builder.add_token(
                dst.0,
                dst.1,
                *src_line,
                src_col,
                Some(ids[*source as usize]),
                None,
            );
            last = Some(dst);
        }
        finish(builder.into_sourcemap(), strategy)
    }
}

fn finish(map: SourceMap, strategy: SourceMapStrategy) -> String {
    let json = map.to_json_string();
    if strategy == SourceMapStrategy::Full {
        return json;
    }
    match serde_json::from_str::<serde_json::Value>(&json) {
        Ok(mut value) => {
            if let Some(object) = value.as_object_mut() {
                object.remove("sourcesContent");
            }
            value.to_string()
        }
        Err(_) => json,
    }
}

/// Trailing comment pointing a script at its map.
pub fn mapping_comment(map_file_name: &str) -> String {
    format!("//# sourceMappingURL={map_file_name}\n")
}
