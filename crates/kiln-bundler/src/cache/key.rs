//! Cache key computation using BLAKE3 content-addressed hashing.
//!
//! Keys cover the step and its options plus the input payload, never the
//! path alone, so a moved file still hits and an edited one never does.

use blake3::Hasher;

use crate::asset::AssetId;
use crate::transform::{Content, Payload, TransformStep};

/// Current cache format version. Increment when cache format changes.
const CACHE_FORMAT_VERSION: u32 = 2;

const KILN_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Content-addressed cache key (BLAKE3 hash).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Create a cache key from a hex string.
    pub fn from_hex(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Get the cache key as a hex string.
    pub fn as_hex(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Compute the cache key for running `step` over `input`.
///
/// The key is a BLAKE3 hash of:
/// 1. Cache format version
/// 2. Kiln version
/// 3. Step name and options
/// 4. Input content and the dependencies recorded so far
/// 5. The asset id, for path-sensitive steps only
pub fn compute_cache_key(step: &TransformStep, input: &Payload, asset: &AssetId) -> CacheKey {
    let mut hasher = Hasher::new();

    hasher.update(&CACHE_FORMAT_VERSION.to_le_bytes());
    hasher.update(KILN_VERSION.as_bytes());

    hasher.update(step.name().as_bytes());
    hash_json(&mut hasher, &step.kind);
    hash_json(&mut hasher, &step.options);

    hash_content(&mut hasher, &input.content);
    hash_json(&mut hasher, &input.dependencies);

    if step.kind.is_path_sensitive() {
        hasher.update(b"path:");
        hasher.update(asset.as_str().as_bytes());
    }

    CacheKey(hasher.finalize().to_hex().to_string())
}

/// Hex BLAKE3 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

fn hash_content(hasher: &mut Hasher, content: &Content) {
    hasher.update(content.kind_name().as_bytes());
    match content.as_bytes() {
        Some(bytes) => {
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        None => {
            if let Content::Module(output) = content {
                hash_json(hasher, output);
            }
        }
    }
}

fn hash_json<T: serde::Serialize + ?Sized>(hasher: &mut Hasher, value: &T) {
    // Serialization of these plain data types cannot fail.
    if let Ok(bytes) = serde_json::to_vec(value) {
        hasher.update(&(bytes.len() as u64).to_le_bytes());
        hasher.update(&bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::StepKind;

    #[test]
    fn key_follows_content_not_path() {
        let step = TransformStep::new(StepKind::Downlevel);
        let input = Payload::raw(b"let a = 1;".to_vec());

        let a = compute_cache_key(&step, &input, &AssetId::new("src/a.js"));
        let moved = compute_cache_key(&step, &input, &AssetId::new("src/moved/a.js"));
        let edited = compute_cache_key(
            &step,
            &Payload::raw(b"let a = 2;".to_vec()),
            &AssetId::new("src/a.js"),
        );

        assert_eq!(a, moved);
        assert_ne!(a, edited);
    }

    #[test]
    fn options_and_path_sensitive_steps_change_the_key() {
        let input = Payload::raw(b"a{}".to_vec());
        let id = AssetId::new("src/a.css");
        let base = TransformStep::new(StepKind::Prefix).with_option("browserslist", "defaults");
        let other = TransformStep::new(StepKind::Prefix).with_option("browserslist", "ie 11");
        assert_ne!(
            compute_cache_key(&base, &input, &id),
            compute_cache_key(&other, &input, &id)
        );

        let deps = TransformStep::new(StepKind::CssDeps);
        assert_ne!(
            compute_cache_key(&deps, &input, &id),
            compute_cache_key(&deps, &input, &AssetId::new("src/b.css"))
        );
    }
}
