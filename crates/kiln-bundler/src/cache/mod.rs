//! Process-wide transform cache.
//!
//! Two tiers: an in-memory map shared by every build in the process, and an
//! optional on-disk store for steps whose policy is [`CachePolicy::Disk`].
//! Both are safe to use from the transform worker pool. Entries are keyed by
//! content, so a stale entry is simply never looked up again; `prune`
//! drops entries the latest build no longer reached.

mod key;
mod storage;

pub use key::{CacheKey, compute_cache_key, content_hash};
pub use storage::{CacheError, CacheResult, DiskStore};

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use rustc_hash::FxHashSet;
use tracing::{debug, warn};

use crate::transform::{CachePolicy, Payload};

/// Hit and miss counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub entries: usize,
}

#[derive(Debug, Default)]
pub struct TransformCache {
    memory: DashMap<CacheKey, Payload>,
    disk: Option<DiskStore>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl TransformCache {
    /// A cache with both tiers, storing disk entries under
    /// `<cache_dir>/transform`.
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            disk: Some(DiskStore::new(cache_dir.into().join("transform"))),
            ..Self::default()
        }
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &CacheKey, policy: CachePolicy) -> Option<Payload> {
        if policy == CachePolicy::None {
            return None;
        }
        if let Some(hit) = self.memory.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(hit.clone());
        }
        if let (CachePolicy::Disk, Some(disk)) = (policy, &self.disk) {
            match disk.get(key) {
                Ok(payload) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.memory.insert(key.clone(), payload.clone());
                    return Some(payload);
                }
                Err(CacheError::CacheMiss) => {}
                Err(e) => debug!(key = %key, error = %e, "ignoring unreadable cache entry"),
            }
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn put(&self, key: CacheKey, payload: &Payload, policy: CachePolicy) {
        match policy {
            CachePolicy::None => return,
            CachePolicy::Memory => {}
            CachePolicy::Disk => {
                if let Some(disk) = &self.disk {
                    if let Err(e) = disk.put(&key, payload) {
                        // A failed write only costs a future miss.
                        warn!(key = %key, error = %e, "failed to persist transform cache entry");
                    }
                }
            }
        }
        self.memory.insert(key, payload.clone());
    }

    /// Drop every entry not in `live`, in both tiers.
    pub fn prune(&self, live: &FxHashSet<CacheKey>) {
        let before = self.memory.len();
        self.memory.retain(|key, _| live.contains(key));
        let mut removed = before - self.memory.len();
        if let Some(disk) = &self.disk {
            match disk.retain(|key| live.contains(key)) {
                Ok(n) => removed += n,
                Err(e) => warn!(error = %e, "failed to prune disk cache"),
            }
        }
        if removed > 0 {
            debug!(removed, "pruned transform cache");
        }
    }

    pub fn clear(&self) {
        self.memory.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.memory.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::Content;
    use tempfile::TempDir;

    #[test]
    fn disk_tier_survives_a_new_process_cache() {
        let temp = TempDir::new().unwrap();
        let key = CacheKey::from_hex("deadbeef");
        let payload = Payload::new(Content::Script("var x;".into()));

        TransformCache::new(temp.path()).put(key.clone(), &payload, CachePolicy::Disk);

        let fresh = TransformCache::new(temp.path());
        assert_eq!(fresh.get(&key, CachePolicy::Disk), Some(payload));
        assert_eq!(fresh.stats().hits, 1);
    }

    #[test]
    fn memory_policy_never_touches_disk() {
        let temp = TempDir::new().unwrap();
        let key = CacheKey::from_hex("cafe");
        let payload = Payload::new(Content::Css("a{}".into()));

        TransformCache::new(temp.path()).put(key.clone(), &payload, CachePolicy::Memory);

        assert!(!temp.path().join("transform").exists());
        let fresh = TransformCache::new(temp.path());
        assert_eq!(fresh.get(&key, CachePolicy::Disk), None);
        assert_eq!(fresh.stats().misses, 1);
    }

    #[test]
    fn prune_keeps_only_live_keys() {
        let cache = TransformCache::in_memory();
        let live = CacheKey::from_hex("01");
        let dead = CacheKey::from_hex("02");
        let payload = Payload::new(Content::Css(String::new()));
        cache.put(live.clone(), &payload, CachePolicy::Memory);
        cache.put(dead.clone(), &payload, CachePolicy::Memory);

        cache.prune(&[live.clone()].into_iter().collect());

        assert!(cache.get(&live, CachePolicy::Memory).is_some());
        assert!(cache.get(&dead, CachePolicy::Memory).is_none());
    }
}
