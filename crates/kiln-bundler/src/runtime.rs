//! Module registry bootstrap shipped in each `runtime~<entry>` chunk.
//!
//! The bootstrap installs `__kiln_define`, `__kiln_require` and the hot
//! update entry point `__kiln_hot_apply` on the page. It is idempotent, so
//! several entries on one page share a single registry.

use crate::asset::AssetId;
use crate::transform::json_string;

pub const RUNTIME_SOURCE: &str = include_str!("../assets/runtime.js");

/// Statement that starts an entry once every chunk it needs has loaded.
pub fn entry_call(entry: &AssetId) -> String {
    format!("__kiln_require({});\n", json_string(entry.as_str()))
}

/// Chunk name of the runtime for `entry`.
pub fn runtime_chunk_name(entry: &str) -> String {
    format!("runtime~{entry}")
}
