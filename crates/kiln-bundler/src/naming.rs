//! Output naming and fingerprinting.
//!
//! Names come from the configured filename templates:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `[name]` | chunk name, or file stem for media |
//! | `[ext]` | extension with leading dot |
//! | `[contenthash:N]`, `[hash:N]` | first N hex chars of blake3 over the final bytes |
//!
//! Emitted media get their names first so that every
//! `__kiln_asset_<hex>__` placeholder left by the transforms can be replaced
//! with a final URL. Chunk text is fingerprinted after that substitution,
//! so a changed image also changes the hash of every chunk that refers to it.

use std::borrow::Cow;

use kiln_config::EffectiveConfig;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::asset::AssetId;
use crate::graph::{BuildGraph, Chunk, DependencyKind, ModuleOutput, OutputFile, OutputKind};
use crate::link::asset_placeholder;
use crate::sourcemap::mapping_comment;

const PLACEHOLDER_PREFIX: &str = "__kiln_asset_";
const PLACEHOLDER_HEX: usize = 16;

const DEFAULT_HASH_LENGTH: usize = 20;

/// First `len` hex chars of blake3 over `bytes`.
pub fn fingerprint(bytes: &[u8], len: usize) -> String {
    let hex = blake3::hash(bytes).to_hex();
    hex[..len.min(hex.len())].to_string()
}

/// Fill a filename template. The hash is only computed if the template asks
/// for one. Unrecognized bracketed text is copied through.
pub fn render_template(template: &str, name: &str, ext: &str, bytes: &[u8]) -> String {
    let mut out = String::with_capacity(template.len() + name.len());
    let mut hash: Option<String> = None;
    let mut rest = template;

    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let Some(close) = rest[open..].find(']').map(|i| open + i) else {
            rest = &rest[open..];
            break;
        };
        let token = &rest[open + 1..close];
        let (key, len) = match token.split_once(':') {
            Some((key, len)) => (key, len.parse().ok()),
            None => (token, None),
        };
        match key {
            "name" => out.push_str(name),
            "ext" => out.push_str(ext),
            "contenthash" | "hash" => {
                let full = hash.get_or_insert_with(|| fingerprint(bytes, 64));
                let len = len.unwrap_or(DEFAULT_HASH_LENGTH).min(full.len());
                out.push_str(&full[..len]);
            }
            _ => out.push_str(&rest[open..=close]),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    out
}

/// Replace every known placeholder in `text`. Unknown ones stay as written.
pub fn substitute_placeholders<'t>(text: &'t str, urls: &FxHashMap<String, String>) -> Cow<'t, str> {
    if urls.is_empty() || !text.contains(PLACEHOLDER_PREFIX) {
        return Cow::Borrowed(text);
    }
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(at) = rest.find(PLACEHOLDER_PREFIX) {
        out.push_str(&rest[..at]);
        let len = PLACEHOLDER_PREFIX.len() + PLACEHOLDER_HEX + 2;
        let candidate = rest.get(at..at + len);
        match candidate.and_then(|c| urls.get(c)) {
            Some(url) => {
                out.push_str(url);
                rest = &rest[at + len..];
            }
            None => {
                out.push_str(PLACEHOLDER_PREFIX);
                rest = &rest[at + PLACEHOLDER_PREFIX.len()..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

/// `path` with `~n` inserted before the extension.
fn disambiguate(path: &str, n: usize) -> String {
    let name_start = path.rfind('/').map_or(0, |i| i + 1);
    match path[name_start..].rfind('.') {
        Some(dot) if dot > 0 => {
            let at = name_start + dot;
            format!("{}~{n}{}", &path[..at], &path[at..])
        }
        _ => format!("{path}~{n}"),
    }
}

/// Tracks used output paths. Identical content at the same path is emitted
/// once; different content gets a disambiguated name.
#[derive(Default)]
struct PathTable {
    used: FxHashMap<String, String>,
}

impl PathTable {
    /// The path to use, and whether the file still needs emitting.
    fn claim(&mut self, path: String, contents: &[u8]) -> (String, bool) {
        let hash = fingerprint(contents, 64);
        let mut candidate = path.clone();
        let mut n = 1;
        loop {
            match self.used.get(&candidate).cloned() {
                None => {
                    self.used.insert(candidate.clone(), hash);
                    return (candidate, true);
                }
                Some(existing) if existing == hash => return (candidate, false),
                Some(_) => {
                    candidate = disambiguate(&path, n);
                    n += 1;
                }
            }
        }
    }
}

/// Name every emitted module and chunk, substitute placeholders and push the
/// resulting files onto `graph.files`.
pub fn name_outputs(graph: &mut BuildGraph, config: &EffectiveConfig) {
    let templates = &config.filenames;
    let mut paths = PathTable::default();
    for file in &graph.files {
        paths.used.insert(file.path.clone(), fingerprint(&file.contents, 64));
    }

    let mut media = Vec::new();
    for module in graph.modules.values() {
        let ModuleOutput::Resource { bytes, ext } = &module.output else {
            continue;
        };
        let path = render_template(&templates.media, module.id.stem(), ext, bytes);
        let (path, emit) = paths.claim(path, bytes);
        graph
            .resource_urls
            .insert(module.id.clone(), format!("{}{path}", config.public_path));
        if emit {
            media.push(OutputFile {
                path,
                contents: bytes.clone(),
                kind: OutputKind::Media,
                origin: Some(module.id.to_string()),
            });
        }
    }
    graph.files.extend(media);

    let urls = placeholder_urls(graph);

    let mut files = Vec::new();
    for chunk in &mut graph.chunks {
        if let Some(script) = chunk.script.take() {
            let script = substitute_placeholders(&script, &urls).into_owned();
            files.extend(script_files(chunk, script, config, &mut paths));
        }
        if let Some(style) = chunk.style.take() {
            let style = substitute_placeholders(&style, &urls).into_owned();
            let template = if chunk.uses_entry_template() {
                &templates.css
            } else {
                &templates.css_chunk
            };
            let path = render_template(template, &chunk.name, ".css", style.as_bytes());
            let (path, emit) = paths.claim(path, style.as_bytes());
            if emit {
                files.push(OutputFile {
                    path,
                    contents: style.clone().into_bytes(),
                    kind: OutputKind::Style,
                    origin: Some(chunk.name.clone()),
                });
            }
            chunk.style = Some(style);
        }
    }
    debug!(
        media = graph.resource_urls.len(),
        chunk_files = files.len(),
        "named outputs"
    );
    graph.files.extend(files);
}

/// Final URL for every placeholder the transforms left behind.
fn placeholder_urls(graph: &BuildGraph) -> FxHashMap<String, String> {
    let mut urls = FxHashMap::default();
    for (id, url) in &graph.resource_urls {
        urls.insert(asset_placeholder(id), url.clone());
    }
    for module in graph.modules.values() {
        for dep in &module.dependencies {
            let (DependencyKind::CssUrl { placeholder }, Some(target)) = (&dep.kind, &dep.target)
            else {
                continue;
            };
            if let Some(url) = target_url(graph, target) {
                urls.insert(placeholder.clone(), url);
            }
        }
    }
    urls
}

fn target_url(graph: &BuildGraph, target: &AssetId) -> Option<String> {
    if let Some(url) = graph.resource_urls.get(target) {
        return Some(url.clone());
    }
    match &graph.modules.get(target)?.output {
        ModuleOutput::Inline { data_uri } => Some(data_uri.clone()),
        _ => None,
    }
}

/// The script file and its source map.
fn script_files(
    chunk: &mut Chunk,
    script: String,
    config: &EffectiveConfig,
    paths: &mut PathTable,
) -> Vec<OutputFile> {
    let template = if chunk.uses_entry_template() {
        &config.filenames.entry
    } else {
        &config.filenames.chunk
    };
    let path = render_template(template, &chunk.name, ".js", script.as_bytes());
    let (path, _) = paths.claim(path, script.as_bytes());

    let map = chunk
        .script_map
        .take()
        .or_else(|| chunk.lines.as_ref().map(|lines| lines.to_map(config.source_map)));

    let mut files = Vec::with_capacity(2);
    let mut contents = script.clone();
    if let Some(map) = map {
        let map_path = format!("{path}.map");
        let map_name = map_path.rsplit('/').next().unwrap_or(&map_path);
        contents.push_str(&mapping_comment(map_name));
        files.push(OutputFile {
            path: map_path.clone(),
            contents: map.clone().into_bytes(),
            kind: OutputKind::SourceMap,
            origin: Some(chunk.name.clone()),
        });
        chunk.script_map = Some(map);
    }
    files.insert(
        0,
        OutputFile {
            path,
            contents: contents.into_bytes(),
            kind: OutputKind::Script,
            origin: Some(chunk.name.clone()),
        },
    );
    chunk.script = Some(script);
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::ModuleType;
    use crate::graph::{ChunkKind, Dependency, Module};
    use kiln_config::BuildMode;

    #[test]
    fn templates_fill_name_ext_and_hash() {
        let bytes = b"console.log(1)";
        let hash = fingerprint(bytes, 10);
        assert_eq!(hash.len(), 10);
        assert_eq!(
            render_template("static/js/[name].[contenthash:10].js", "main", ".js", bytes),
            format!("static/js/main.{hash}.js")
        );
        assert_eq!(
            render_template("static/media/[hash:10][ext]", "logo", ".png", bytes),
            format!("static/media/{hash}.png")
        );
        assert_eq!(
            render_template("static/media/[name][ext]", "logo", ".png", bytes),
            "static/media/logo.png"
        );
    }

    #[test]
    fn unknown_placeholders_survive_substitution() {
        let mut urls = FxHashMap::default();
        urls.insert(
            "__kiln_asset_0000000000000000__".to_string(),
            "/static/media/a.png".to_string(),
        );
        let text = "a(\"__kiln_asset_0000000000000000__\") b(\"__kiln_asset_1111111111111111__\")";
        assert_eq!(
            substitute_placeholders(text, &urls),
            "a(\"/static/media/a.png\") b(\"__kiln_asset_1111111111111111__\")"
        );
    }

    #[test]
    fn same_named_media_in_development_are_disambiguated() {
        let mut graph = BuildGraph::default();
        for (id, bytes) in [("src/a/logo.png", b"aaaa"), ("src/b/logo.png", b"bbbb")] {
            let module = Module {
                id: AssetId::new(id),
                module_type: ModuleType::Image,
                output: ModuleOutput::Resource {
                    bytes: bytes.to_vec(),
                    ext: ".png".into(),
                },
                dependencies: Vec::new(),
                source_hash: String::new(),
            };
            graph.modules.insert(module.id.clone(), module);
        }
        let config = kiln_config::resolve(BuildMode::Development, &Default::default());
        name_outputs(&mut graph, &config);

        let paths: Vec<_> = graph.files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["static/media/logo.png", "static/media/logo~1.png"]);
        assert_eq!(
            graph.resource_urls[&AssetId::new("src/b/logo.png")],
            "/static/media/logo~1.png"
        );
    }

    #[test]
    fn css_urls_and_script_references_get_final_urls() {
        let mut graph = BuildGraph::default();
        let logo = AssetId::new("src/logo.png");
        let placeholder = crate::transform::css_placeholder(&AssetId::new("src/app.css"), "./logo.png");
        graph.modules.insert(
            logo.clone(),
            Module {
                id: logo.clone(),
                module_type: ModuleType::Image,
                output: ModuleOutput::Resource {
                    bytes: vec![1, 2, 3],
                    ext: ".png".into(),
                },
                dependencies: Vec::new(),
                source_hash: String::new(),
            },
        );
        graph.modules.insert(
            AssetId::new("src/app.css"),
            Module {
                id: AssetId::new("src/app.css"),
                module_type: ModuleType::Stylesheet,
                output: ModuleOutput::Style { css: String::new() },
                dependencies: vec![Dependency::resolved(
                    "./logo.png",
                    DependencyKind::CssUrl {
                        placeholder: placeholder.clone(),
                    },
                    logo.clone(),
                )],
                source_hash: String::new(),
            },
        );
        let mut chunk = Chunk::new("main", ChunkKind::Entry);
        chunk.script = Some(format!("var u = \"{}\";\n", asset_placeholder(&logo)));
        chunk.style = Some(format!(".a{{background:url({placeholder})}}"));
        graph.chunks.push(chunk);

        let config = kiln_config::resolve(BuildMode::Production, &Default::default());
        name_outputs(&mut graph, &config);

        let url = graph.resource_urls[&logo].clone();
        assert!(url.starts_with("/static/media/") && url.ends_with(".png"));
        let chunk = &graph.chunks[0];
        assert_eq!(chunk.script.as_deref(), Some(format!("var u = \"{url}\";\n").as_str()));
        assert!(chunk.style.as_deref().unwrap().contains(&url));

        let script = graph
            .files
            .iter()
            .find(|f| f.kind == OutputKind::Script)
            .unwrap();
        assert!(script.path.starts_with("static/js/main.") && script.path.ends_with(".js"));
        assert!(graph.files.iter().any(|f| f.kind == OutputKind::Style));
    }
}
