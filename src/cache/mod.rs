//! In-process caching.
//!
//! All pipeline caches are bounded, TTL-expiring moka caches wrapped with
//! hit/miss accounting. Caches are injected as `Arc` dependencies, never
//! globals, and expose invalidate/stats operations for tests and admin.

pub mod dedup;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

pub use dedup::DedupService;

/// Point-in-time view of one cache's counters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CacheStats {
    pub size: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

/// Bounded TTL cache keyed by string.
///
/// Eviction is size-based (TinyLFU via moka) plus per-cache TTL from
/// insertion. Safe for concurrent reads and writes.
pub struct TypedCache<V: Clone + Send + Sync + 'static> {
    name: &'static str,
    inner: moka::sync::Cache<String, V>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl<V: Clone + Send + Sync + 'static> std::fmt::Debug for TypedCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedCache")
            .field("name", &self.name)
            .field("max_capacity", &self.inner.policy().max_capacity())
            .field("entry_count", &self.inner.entry_count())
            .finish()
    }
}

impl<V: Clone + Send + Sync + 'static> TypedCache<V> {
    pub fn new(name: &'static str, max_size: u64, ttl: Duration) -> Self {
        let inner = moka::sync::Cache::builder()
            .max_capacity(max_size)
            .time_to_live(ttl)
            .build();

        debug!(
            cache = name,
            max_size,
            ttl_secs = ttl.as_secs(),
            "cache created"
        );

        Self {
            name,
            inner,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        let value = self.inner.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(cache = self.name, key, "cache HIT");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(cache = self.name, key, "cache MISS");
        }
        value
    }

    pub fn insert(&self, key: String, value: V) {
        self.inner.insert(key, value);
    }

    /// Atomic put-if-absent. Returns true iff the key was not present and
    /// this call inserted it.
    pub fn try_insert(&self, key: &str, value: V) -> bool {
        let entry = self.inner.entry(key.to_string()).or_insert(value);
        entry.is_fresh()
    }

    pub fn invalidate(&self, key: &str) {
        self.inner.invalidate(key);
        debug!(cache = self.name, key, "cache entry invalidated");
    }

    pub fn invalidate_all(&self) {
        self.inner.invalidate_all();
        debug!(cache = self.name, "cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let lookups = hits + misses;
        CacheStats {
            size: self.inner.entry_count(),
            hits,
            misses,
            hit_rate: if lookups > 0 {
                hits as f64 / lookups as f64
            } else {
                0.0
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Flush pending maintenance so entry counts reflect recent writes.
    /// Test-facing; production paths never need it.
    pub fn run_pending_tasks(&self) {
        self.inner.run_pending_tasks();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_counts_hits_and_misses() {
        let cache: TypedCache<String> = TypedCache::new("test", 100, Duration::from_secs(60));
        cache.insert("k1".into(), "v1".into());

        assert_eq!(cache.get("k1"), Some("v1".to_string()));
        assert_eq!(cache.get("absent"), None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn try_insert_is_put_if_absent() {
        let cache: TypedCache<i64> = TypedCache::new("test", 100, Duration::from_secs(60));
        assert!(cache.try_insert("k", 1));
        assert!(!cache.try_insert("k", 2));
        assert_eq!(cache.inner.get("k"), Some(1));
    }

    #[test]
    fn capacity_eviction_keeps_cache_bounded() {
        let cache: TypedCache<u32> = TypedCache::new("tiny", 2, Duration::from_secs(60));
        cache.insert("a".into(), 1);
        cache.insert("b".into(), 2);
        cache.insert("c".into(), 3);
        cache.run_pending_tasks();
        assert!(cache.stats().size <= 2);
    }

    #[test]
    fn ttl_expiry_removes_entries() {
        let cache: TypedCache<u32> = TypedCache::new("ttl", 100, Duration::from_millis(50));
        cache.insert("k".into(), 1);
        assert!(cache.get("k").is_some());

        std::thread::sleep(Duration::from_millis(100));
        cache.run_pending_tasks();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn invalidate_all_resets_contents_not_counters() {
        let cache: TypedCache<u32> = TypedCache::new("inv", 100, Duration::from_secs(60));
        cache.insert("k".into(), 1);
        assert!(cache.get("k").is_some());
        cache.invalidate_all();
        cache.run_pending_tasks();
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().hits, 1);
    }
}
