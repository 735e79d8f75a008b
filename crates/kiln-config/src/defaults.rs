use std::path::PathBuf;

use indexmap::IndexMap;

// Helper defaults
pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_root() -> PathBuf {
    PathBuf::from(".")
}

pub(crate) fn default_src_dir() -> PathBuf {
    PathBuf::from("src")
}

pub(crate) fn default_public_dir() -> PathBuf {
    PathBuf::from("public")
}

pub(crate) fn default_out_dir() -> PathBuf {
    PathBuf::from("dist")
}

pub(crate) fn default_public_path() -> String {
    "/".to_string()
}

pub(crate) fn default_cache_dir() -> PathBuf {
    PathBuf::from("node_modules/.cache/kiln")
}

pub(crate) fn default_html_template() -> PathBuf {
    PathBuf::from("public/index.html")
}

pub(crate) fn default_entries() -> IndexMap<String, PathBuf> {
    IndexMap::from([("main".to_string(), PathBuf::from("src/main.js"))])
}

pub(crate) fn default_resolve_extensions() -> Vec<String> {
    vec![".vue".into(), ".js".into(), ".json".into()]
}

/// Components ship their templates as strings, so `vue` must resolve to the
/// build that carries the template compiler.
pub(crate) fn default_resolve_alias() -> IndexMap<String, String> {
    IndexMap::from([(
        "vue$".to_string(),
        "vue/dist/vue.esm-bundler.js".to_string(),
    )])
}

pub(crate) fn default_asset_inline_limit() -> u64 {
    10 * 1024
}

pub(crate) fn default_hash_length() -> usize {
    10
}

pub(crate) fn default_browserslist() -> Vec<String> {
    vec!["last 2 versions".into(), "> 1%".into(), "not dead".into()]
}

pub(crate) fn default_script_target() -> String {
    "es2015".to_string()
}

pub(crate) fn default_defines() -> IndexMap<String, String> {
    IndexMap::from([
        ("__VUE_OPTIONS_API__".to_string(), "true".to_string()),
        ("__VUE_PROD_DEVTOOLS__".to_string(), "false".to_string()),
    ])
}

pub(crate) fn default_copy_ignore() -> Vec<String> {
    vec!["**/index.html".into()]
}

pub(crate) fn default_host() -> String {
    "localhost".to_string()
}

pub(crate) fn default_port() -> u16 {
    3003
}

pub(crate) fn default_debounce_ms() -> u64 {
    100
}

pub(crate) fn default_less_command() -> Vec<String> {
    vec!["lessc".into(), "-".into()]
}

pub(crate) fn default_sass_command() -> Vec<String> {
    vec!["sass".into(), "--stdin".into(), "--no-source-map".into()]
}

pub(crate) fn default_stylus_command() -> Vec<String> {
    vec!["stylus".into(), "--print".into()]
}
