//! The mode resolver.
//!
//! [`resolve`] is a pure function of a [`BuildMode`] and a validated
//! [`KilnConfig`]. The resulting [`EffectiveConfig`] is a read-only snapshot
//! that lives for exactly one build.

use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::config::{KilnConfig, LintSettings, PreprocessorCommands, UnhandledAssets};
use crate::dev::DevSettings;
use crate::mode::BuildMode;

/// Source map flavour emitted next to script chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SourceMapStrategy {
    /// Line and column mappings with embedded sources.
    Full,
    /// Line-only mappings, no embedded sources.
    CheapModule,
}

/// How stylesheets reach the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StyleStrategy {
    /// Styles ride inside script modules and are attached at runtime.
    Inject,
    /// Styles are written to standalone `.css` files.
    Extract,
}

impl StyleStrategy {
    pub fn for_mode(mode: BuildMode) -> Self {
        if mode.is_production() {
            StyleStrategy::Extract
        } else {
            StyleStrategy::Inject
        }
    }
}

/// Output path templates.
///
/// Placeholders: `[name]`, `[ext]` (with leading dot), `[contenthash:N]` and
/// `[hash:N]`, both of which expand to the first N hex characters of the
/// content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilenameTemplates {
    pub entry: String,
    pub chunk: String,
    pub css: String,
    pub css_chunk: String,
    pub media: String,
}

impl FilenameTemplates {
    fn hashed(hash_length: usize) -> Self {
        Self {
            entry: format!("static/js/[name].[contenthash:{hash_length}].js"),
            chunk: format!("static/js/[name].[contenthash:{hash_length}].chunk.js"),
            css: format!("static/css/[name].[contenthash:{hash_length}].css"),
            css_chunk: format!("static/css/[name].[contenthash:{hash_length}].chunk.css"),
            media: format!("static/media/[hash:{hash_length}][ext]"),
        }
    }

    fn stable() -> Self {
        Self {
            entry: "static/js/[name].js".to_string(),
            chunk: "static/js/[name].chunk.js".to_string(),
            css: "static/css/[name].css".to_string(),
            css_chunk: "static/css/[name].chunk.css".to_string(),
            media: "static/media/[name][ext]".to_string(),
        }
    }

    /// True if any template embeds a fingerprint.
    pub fn is_fingerprinted(&self) -> bool {
        [&self.entry, &self.chunk, &self.css, &self.css_chunk, &self.media]
            .iter()
            .any(|t| t.contains("hash:"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EffectiveConfig {
    pub mode: BuildMode,

    pub root: PathBuf,
    pub src_dir: PathBuf,
    pub public_dir: PathBuf,
    pub out_dir: PathBuf,
    /// Always ends with `/`.
    pub public_path: String,
    pub cache_dir: PathBuf,
    pub html_template: PathBuf,
    pub entries: IndexMap<String, PathBuf>,

    pub filenames: FilenameTemplates,
    pub source_map: SourceMapStrategy,
    pub style: StyleStrategy,
    pub minify: bool,
    pub optimize_images: bool,
    /// Clear `out_dir` before writing.
    pub clean_output: bool,
    /// Write artifacts to `out_dir`. Development keeps them in memory.
    pub write_to_disk: bool,
    pub copy_public: bool,

    pub hash_length: usize,
    pub asset_inline_limit: u64,
    pub browserslist: Vec<String>,
    pub script_target: String,
    pub defines: IndexMap<String, String>,
    pub resolve_extensions: Vec<String>,
    pub resolve_alias: IndexMap<String, String>,
    pub copy_ignore: Vec<String>,
    pub lint: LintSettings,
    pub preprocessors: PreprocessorCommands,
    pub unhandled_assets: UnhandledAssets,
    pub dev: DevSettings,
}

impl EffectiveConfig {
    pub fn is_production(&self) -> bool {
        self.mode.is_production()
    }

    /// Pretty TOML rendering used by `kiln check`.
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

fn normalize_public_path(path: &str) -> String {
    if path.is_empty() {
        "/".to_string()
    } else if path.ends_with('/') {
        path.to_string()
    } else {
        format!("{path}/")
    }
}

/// Derive the effective configuration for one build.
pub fn resolve(mode: BuildMode, base: &KilnConfig) -> EffectiveConfig {
    let production = mode.is_production();
    let root = base.root.clone();
    let under_root = |p: &Path| if p.is_absolute() { p.to_path_buf() } else { root.join(p) };

    EffectiveConfig {
        mode,
        src_dir: under_root(&base.src_dir),
        public_dir: under_root(&base.public_dir),
        out_dir: under_root(&base.out_dir),
        public_path: normalize_public_path(&base.public_path),
        cache_dir: under_root(&base.cache_dir),
        html_template: under_root(&base.html_template),
        entries: base.entries.clone(),
        filenames: if production {
            FilenameTemplates::hashed(base.hash_length)
        } else {
            FilenameTemplates::stable()
        },
        source_map: if production {
            SourceMapStrategy::Full
        } else {
            SourceMapStrategy::CheapModule
        },
        style: StyleStrategy::for_mode(mode),
        minify: production,
        optimize_images: production,
        clean_output: production,
        write_to_disk: production,
        copy_public: production,
        hash_length: base.hash_length,
        asset_inline_limit: base.asset_inline_limit,
        browserslist: base.browserslist.clone(),
        script_target: base.script_target.clone(),
        defines: base.defines.clone(),
        resolve_extensions: base.resolve_extensions.clone(),
        resolve_alias: base.resolve_alias.clone(),
        copy_ignore: base.copy_ignore.clone(),
        lint: base.lint.clone(),
        preprocessors: base.preprocessors.clone(),
        unhandled_assets: base.unhandled_assets,
        dev: base.dev.clone(),
        root,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_fingerprints_and_optimizes() {
        let effective = resolve(BuildMode::Production, &KilnConfig::default());

        assert_eq!(effective.filenames.entry, "static/js/[name].[contenthash:10].js");
        assert_eq!(effective.filenames.chunk, "static/js/[name].[contenthash:10].chunk.js");
        assert_eq!(effective.filenames.css, "static/css/[name].[contenthash:10].css");
        assert_eq!(effective.filenames.media, "static/media/[hash:10][ext]");
        assert!(effective.filenames.is_fingerprinted());
        assert_eq!(effective.source_map, SourceMapStrategy::Full);
        assert_eq!(effective.style, StyleStrategy::Extract);
        assert!(effective.minify);
        assert!(effective.optimize_images);
        assert!(effective.clean_output);
        assert!(effective.write_to_disk);
        assert!(effective.copy_public);
    }

    #[test]
    fn development_is_stable_and_cheap() {
        let effective = resolve(BuildMode::Development, &KilnConfig::default());

        assert!(!effective.filenames.is_fingerprinted());
        assert_eq!(effective.filenames.entry, "static/js/[name].js");
        assert_eq!(effective.source_map, SourceMapStrategy::CheapModule);
        assert_eq!(effective.style, StyleStrategy::Inject);
        assert!(!effective.minify);
        assert!(!effective.optimize_images);
        assert!(!effective.clean_output);
        assert!(!effective.write_to_disk);
    }

    #[test]
    fn vue_aliases_to_the_compiler_build() {
        let effective = resolve(BuildMode::Development, &KilnConfig::default());
        assert_eq!(
            effective.resolve_alias.get("vue$").map(String::as_str),
            Some("vue/dist/vue.esm-bundler.js")
        );
    }

    #[test]
    fn hash_length_drives_templates() {
        let config = KilnConfig {
            hash_length: 8,
            ..KilnConfig::default()
        };
        let effective = resolve(BuildMode::Production, &config);
        assert_eq!(effective.filenames.entry, "static/js/[name].[contenthash:8].js");
    }

    #[test]
    fn paths_are_anchored_at_root() {
        let config = KilnConfig {
            root: PathBuf::from("/work/app"),
            ..KilnConfig::default()
        };
        let effective = resolve(BuildMode::Production, &config);
        assert_eq!(effective.src_dir, PathBuf::from("/work/app/src"));
        assert_eq!(effective.out_dir, PathBuf::from("/work/app/dist"));
        assert_eq!(
            effective.html_template,
            PathBuf::from("/work/app/public/index.html")
        );
    }

    #[test]
    fn public_path_gets_trailing_slash() {
        let config = KilnConfig {
            public_path: "/app".into(),
            ..KilnConfig::default()
        };
        assert_eq!(resolve(BuildMode::Production, &config).public_path, "/app/");
        assert_eq!(
            resolve(BuildMode::Production, &KilnConfig::default()).public_path,
            "/"
        );
    }

    #[test]
    fn resolve_is_deterministic() {
        let config = KilnConfig::default();
        for mode in BuildMode::ALL {
            assert_eq!(resolve(mode, &config), resolve(mode, &config));
        }
    }

    #[test]
    fn renders_as_toml() {
        let rendered = resolve(BuildMode::Production, &KilnConfig::default())
            .to_toml()
            .unwrap();
        assert!(rendered.contains("mode = \"production\""));
        assert!(rendered.contains("source_map = \"full\""));
    }
}
