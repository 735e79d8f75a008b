//! On-disk tier of the transform cache.
//!
//! One bincode file per key under `<dir>/<key>.bin`, written uncompressed
//! through a temp file and a rename so readers never see a torn entry.
//! Temp names are unique per process and write, so concurrent builds
//! sharing a cache directory never rename each other's files.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use super::key::CacheKey;
use crate::transform::Payload;

/// Error types for cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Cache entry not found.
    #[error("cache miss")]
    CacheMiss,

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

#[derive(Debug, Clone)]
pub struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.bin", key.as_hex()))
    }

    pub fn get(&self, key: &CacheKey) -> CacheResult<Payload> {
        let bytes = match fs::read(self.entry_path(key)) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(CacheError::CacheMiss);
            }
            Err(e) => return Err(e.into()),
        };
        bincode::deserialize(&bytes).map_err(|e| CacheError::DeserializationError(e.to_string()))
    }

    pub fn put(&self, key: &CacheKey, payload: &Payload) -> CacheResult<()> {
        let bytes =
            bincode::serialize(payload).map_err(|e| CacheError::SerializationError(e.to_string()))?;
        fs::create_dir_all(&self.dir)?;
        let path = self.entry_path(key);
        let temp = self.dir.join(format!(
            ".{}.{}.{}.tmp",
            key.as_hex(),
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        fs::write(&temp, bytes)?;
        if let Err(e) = fs::rename(&temp, &path) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove every entry whose key fails `keep`. Returns the number removed.
    pub fn retain(&self, keep: impl Fn(&CacheKey) -> bool) -> CacheResult<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry?.path();
            let Some(stem) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_suffix(".bin"))
            else {
                continue;
            };
            if !keep(&CacheKey::from_hex(stem)) {
                fs::remove_file(&path)?;
                removed += 1;
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Content;
    use tempfile::TempDir;

    #[test]
    fn roundtrip_and_retain() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path().join("transform"));
        let key = CacheKey::from_hex("abc");
        let payload = Payload::new(Content::Script("var a = 1;".into()));

        assert!(matches!(store.get(&key), Err(CacheError::CacheMiss)));
        store.put(&key, &payload).unwrap();
        assert_eq!(store.get(&key).unwrap(), payload);

        assert_eq!(store.retain(|_| false).unwrap(), 1);
        assert!(matches!(store.get(&key), Err(CacheError::CacheMiss)));
    }

    #[test]
    fn concurrent_writers_of_one_key_do_not_collide() {
        let temp = TempDir::new().unwrap();
        let store = DiskStore::new(temp.path().join("transform"));
        let key = CacheKey::from_hex("shared");

        std::thread::scope(|scope| {
            for writer in 0..8 {
                let (store, key) = (&store, &key);
                scope.spawn(move || {
                    for round in 0..50 {
                        let code = format!("var w = {writer}, r = {round};");
                        store
                            .put(key, &Payload::new(Content::Script(code)))
                            .unwrap();
                    }
                });
            }
        });

        let Content::Script(code) = store.get(&key).unwrap().content else {
            panic!("script payload expected");
        };
        assert!(code.starts_with("var w = "));
        let leftovers: Vec<_> = fs::read_dir(store.dir())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(leftovers, vec![std::ffi::OsString::from("shared.bin")]);
    }
}
