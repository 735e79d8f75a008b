//! Base configuration shared by every build mode.
//!
//! [`KilnConfig`] is what `kiln.toml` deserialises into after profile
//! selection. It is mode-agnostic: everything that depends on the build mode
//! is derived later by [`crate::resolve`].

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::defaults::*;
use crate::dev::DevSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KilnConfig {
    /// Project root. Every other path is relative to it.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// First-party source tree. Script downlevelling and linting are
    /// restricted to files below it.
    #[serde(default = "default_src_dir")]
    pub src_dir: PathBuf,

    /// Static files copied verbatim into production output.
    #[serde(default = "default_public_dir")]
    pub public_dir: PathBuf,

    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,

    /// URL prefix under which `out_dir` is served.
    #[serde(default = "default_public_path")]
    pub public_path: String,

    /// Entry name to entry module.
    #[serde(default = "default_entries")]
    pub entries: IndexMap<String, PathBuf>,

    #[serde(default = "default_html_template")]
    pub html_template: PathBuf,

    #[serde(default = "default_resolve_extensions")]
    pub resolve_extensions: Vec<String>,

    /// Specifier aliases. A trailing `$` on a key matches the bare
    /// specifier only, so deep imports into the package still resolve
    /// normally.
    #[serde(default = "default_resolve_alias")]
    pub resolve_alias: IndexMap<String, String>,

    /// Images strictly below this many bytes are inlined as data URIs.
    #[serde(default = "default_asset_inline_limit")]
    pub asset_inline_limit: u64,

    /// Number of hex characters kept from a content fingerprint.
    #[serde(default = "default_hash_length")]
    pub hash_length: usize,

    #[serde(default = "default_browserslist")]
    pub browserslist: Vec<String>,

    #[serde(default = "default_script_target")]
    pub script_target: String,

    /// Identifiers replaced with the given source text at build time.
    #[serde(default = "default_defines")]
    pub defines: IndexMap<String, String>,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    #[serde(default)]
    pub lint: LintSettings,

    /// Globs under `public_dir` that the public-copy step skips.
    #[serde(default = "default_copy_ignore")]
    pub copy_ignore: Vec<String>,

    #[serde(default)]
    pub dev: DevSettings,

    #[serde(default)]
    pub preprocessors: PreprocessorCommands,

    /// What to do with an asset no rule claims.
    #[serde(default)]
    pub unhandled_assets: UnhandledAssets,
}

impl Default for KilnConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            src_dir: default_src_dir(),
            public_dir: default_public_dir(),
            out_dir: default_out_dir(),
            public_path: default_public_path(),
            entries: default_entries(),
            html_template: default_html_template(),
            resolve_extensions: default_resolve_extensions(),
            resolve_alias: default_resolve_alias(),
            asset_inline_limit: default_asset_inline_limit(),
            hash_length: default_hash_length(),
            browserslist: default_browserslist(),
            script_target: default_script_target(),
            defines: default_defines(),
            cache_dir: default_cache_dir(),
            lint: LintSettings::default(),
            copy_ignore: default_copy_ignore(),
            dev: DevSettings::default(),
            preprocessors: PreprocessorCommands::default(),
            unhandled_assets: UnhandledAssets::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Turn lint errors into a failed build instead of warnings.
    #[serde(default)]
    pub fail_on_error: bool,

    /// Persist per-file results keyed by content hash.
    #[serde(default = "default_true")]
    pub cache: bool,
}

impl Default for LintSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            fail_on_error: false,
            cache: true,
        }
    }
}

/// Command lines for the external style preprocessors. Each command reads
/// the source on stdin and writes CSS to stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessorCommands {
    #[serde(default = "default_less_command")]
    pub less: Vec<String>,

    #[serde(default = "default_sass_command")]
    pub sass: Vec<String>,

    #[serde(default = "default_stylus_command")]
    pub stylus: Vec<String>,
}

impl Default for PreprocessorCommands {
    fn default() -> Self {
        Self {
            less: default_less_command(),
            sass: default_sass_command(),
            stylus: default_stylus_command(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnhandledAssets {
    /// Fail the build naming the asset.
    #[default]
    Error,
    /// Emit the asset as a file resource.
    Resource,
}
