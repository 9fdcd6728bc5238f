//! Memoizing wrapper around expensive async operations.

use super::traits::{CacheBackend, CacheLimits, CacheStats, EvictionPolicy};
use crate::error::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, warn};

/// Hashed cache key built from the arguments that affect a result.
///
/// Arguments that only change presentation must not be fed in, so that
/// such calls still share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Start a key for the named operation.
    pub fn builder(operation: &str) -> CacheKeyBuilder {
        let mut builder = CacheKeyBuilder {
            hasher: Sha256::new(),
        };
        builder.feed(operation.as_bytes());
        builder
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Accumulates length-prefixed key parts into a SHA-256 digest.
pub struct CacheKeyBuilder {
    hasher: Sha256,
}

impl CacheKeyBuilder {
    fn feed(&mut self, bytes: &[u8]) {
        self.hasher.update((bytes.len() as u64).to_le_bytes());
        self.hasher.update(bytes);
    }

    pub fn text(mut self, field: &str, value: &str) -> Self {
        self.feed(field.as_bytes());
        self.feed(value.as_bytes());
        self
    }

    pub fn number(mut self, field: &str, value: u64) -> Self {
        self.feed(field.as_bytes());
        self.feed(&value.to_le_bytes());
        self
    }

    pub fn list<I, S>(mut self, field: &str, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.feed(field.as_bytes());
        let items: Vec<S> = items.into_iter().collect();
        self.feed(&(items.len() as u64).to_le_bytes());
        for item in &items {
            self.feed(item.as_ref().as_bytes());
        }
        self
    }

    pub fn build(self) -> CacheKey {
        CacheKey(hex::encode(self.hasher.finalize()))
    }
}

/// Compute-or-fetch cache over a [`CacheBackend`] namespace.
///
/// Backend failures never reach the caller: the cache fails open and the
/// wrapped operation runs as on a miss. Failures of the operation itself
/// propagate unchanged and store nothing.
#[derive(Clone)]
pub struct MemoizingCache {
    backend: Option<Arc<dyn CacheBackend>>,
    namespace: String,
    limits: CacheLimits,
}

impl std::fmt::Debug for MemoizingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoizingCache")
            .field("namespace", &self.namespace)
            .field("limits", &self.limits)
            .field("enabled", &self.backend.is_some())
            .finish()
    }
}

impl MemoizingCache {
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        namespace: impl Into<String>,
        policy: EvictionPolicy,
        capacity: usize,
    ) -> Self {
        Self {
            backend: Some(backend),
            namespace: namespace.into(),
            limits: CacheLimits::new(policy, capacity),
        }
    }

    /// Pass-through cache that always computes.
    pub fn disabled(namespace: impl Into<String>) -> Self {
        Self {
            backend: None,
            namespace: namespace.into(),
            limits: CacheLimits::new(EvictionPolicy::Fifo, 0),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn limits(&self) -> CacheLimits {
        self.limits
    }

    /// Return the cached value for `key`, or run `compute` and store its result.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &CacheKey,
        compute: F,
    ) -> std::result::Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        if let Some(value) = self.lookup(key) {
            return Ok(value);
        }

        let value = compute().await?;
        self.store(key, &value);
        Ok(value)
    }

    /// Entry count of this cache's namespace.
    pub fn stats(&self) -> Result<CacheStats> {
        match &self.backend {
            Some(backend) => backend.namespace_stats(&self.namespace),
            None => Ok(CacheStats {
                namespace: self.namespace.clone(),
                ..CacheStats::default()
            }),
        }
    }

    /// Drop every entry of this cache's namespace.
    pub fn clear(&self) -> Result<usize> {
        match &self.backend {
            Some(backend) => backend.clear_namespace(&self.namespace),
            None => Ok(0),
        }
    }

    fn lookup<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        let backend = self.backend.as_ref()?;

        let entry = match backend.get(&self.namespace, key.as_str()) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("Cache miss in '{}' for {}", self.namespace, key.short());
                return None;
            }
            Err(e) => {
                warn!("Cache '{}' unavailable, computing directly: {}", self.namespace, e);
                return None;
            }
        };

        let value = match serde_json::from_slice::<T>(&entry.value) {
            Ok(value) => value,
            Err(e) => {
                warn!(
                    "Discarding unreadable entry {} in '{}': {}",
                    key.short(),
                    self.namespace,
                    e
                );
                if let Err(e) = backend.invalidate(&self.namespace, key.as_str()) {
                    warn!("Failed to drop unreadable entry in '{}': {}", self.namespace, e);
                }
                return None;
            }
        };

        if self.limits.policy == EvictionPolicy::Lru {
            if let Err(e) = backend.touch(&self.namespace, key.as_str()) {
                warn!("Failed to record access in '{}': {}", self.namespace, e);
            }
        }

        debug!(
            "Cache hit in '{}' for {} (cached {})",
            self.namespace,
            key.short(),
            entry.cached_at.to_rfc3339()
        );
        Some(value)
    }

    fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };

        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to serialize value for '{}': {}", self.namespace, e);
                return;
            }
        };

        if let Err(e) = backend.put(&self.namespace, key.as_str(), &bytes, self.limits) {
            warn!("Failed to store entry in '{}': {}", self.namespace, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheEntry, MemoryCache, SqliteCache};
    use crate::error::PulseError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct UnavailableBackend;

    impl CacheBackend for UnavailableBackend {
        fn get(&self, _: &str, _: &str) -> Result<Option<CacheEntry>> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
        fn touch(&self, _: &str, _: &str) -> Result<bool> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
        fn put(&self, _: &str, _: &str, _: &[u8], _: CacheLimits) -> Result<usize> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
        fn invalidate(&self, _: &str, _: &str) -> Result<bool> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
        fn clear_namespace(&self, _: &str) -> Result<usize> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
        fn namespace_stats(&self, _: &str) -> Result<CacheStats> {
            Err(PulseError::CacheUnavailable("offline".to_string()))
        }
    }

    fn key(name: &str) -> CacheKey {
        CacheKey::builder("test").text("name", name).build()
    }

    async fn cached_len(
        cache: &MemoizingCache,
        calls: &AtomicUsize,
        name: &str,
    ) -> std::result::Result<usize, String> {
        cache
            .get_or_compute(&key(name), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(name.len())
            })
            .await
    }

    #[test]
    fn test_key_is_stable_and_unambiguous() {
        let a = CacheKey::builder("op").list("ids", ["ab", "c"]).build();
        let b = CacheKey::builder("op").list("ids", ["a", "bc"]).build();
        let again = CacheKey::builder("op").list("ids", vec!["ab".to_string(), "c".to_string()]).build();
        assert_ne!(a, b);
        assert_eq!(a, again);
        assert_eq!(a.as_str().len(), 64);
    }

    #[tokio::test]
    async fn test_second_call_hits() {
        let backend = Arc::new(MemoryCache::new());
        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 4);
        let calls = AtomicUsize::new(0);

        assert_eq!(cached_len(&cache, &calls, "alpha").await.unwrap(), 5);
        assert_eq!(cached_len(&cache, &calls, "alpha").await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_fifo_evicts_first_inserted_key() {
        let backend = Arc::new(MemoryCache::new());
        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 2);
        let calls = AtomicUsize::new(0);

        cached_len(&cache, &calls, "a").await.unwrap();
        cached_len(&cache, &calls, "bb").await.unwrap();
        cached_len(&cache, &calls, "a").await.unwrap(); // hit, no effect on FIFO order
        cached_len(&cache, &calls, "ccc").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cached_len(&cache, &calls, "a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4, "first inserted key was evicted");
    }

    #[tokio::test]
    async fn test_lru_evicts_least_recently_touched_key() {
        let backend = Arc::new(MemoryCache::new());
        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Lru, 2);
        let calls = AtomicUsize::new(0);

        cached_len(&cache, &calls, "a").await.unwrap();
        cached_len(&cache, &calls, "bb").await.unwrap();
        cached_len(&cache, &calls, "a").await.unwrap();
        cached_len(&cache, &calls, "ccc").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        cached_len(&cache, &calls, "a").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3, "recently used key survives");
        cached_len(&cache, &calls, "bb").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 4, "least recently used key was evicted");
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let backend = Arc::new(MemoryCache::new());
        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 4);
        let k = key("flaky");

        let first: std::result::Result<u32, String> = cache
            .get_or_compute(&k, || async { Err("upstream down".to_string()) })
            .await;
        assert_eq!(first.unwrap_err(), "upstream down");
        assert_eq!(cache.stats().unwrap().entry_count, 0);

        let second: std::result::Result<u32, String> =
            cache.get_or_compute(&k, || async { Ok(7) }).await;
        assert_eq!(second.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails_open() {
        let cache = MemoizingCache::new(Arc::new(UnavailableBackend), "ns", EvictionPolicy::Lru, 4);
        let calls = AtomicUsize::new(0);

        assert_eq!(cached_len(&cache, &calls, "abc").await.unwrap(), 3);
        assert_eq!(cached_len(&cache, &calls, "abc").await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_computes() {
        let cache = MemoizingCache::disabled("ns");
        let calls = AtomicUsize::new(0);

        cached_len(&cache, &calls, "x").await.unwrap();
        cached_len(&cache, &calls, "x").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_durable_entries_survive_new_cache_instance() {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("memo.sqlite");
        let calls = AtomicUsize::new(0);

        {
            let backend = Arc::new(SqliteCache::open(&db_path).unwrap());
            let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 4);
            cached_len(&cache, &calls, "persist").await.unwrap();
        }

        let backend = Arc::new(SqliteCache::open(&db_path).unwrap());
        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 4);
        cached_len(&cache, &calls, "persist").await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_recomputed() {
        let backend = Arc::new(MemoryCache::new());
        let k = key("bad");
        backend
            .put("ns", k.as_str(), b"not json", CacheLimits::new(EvictionPolicy::Fifo, 4))
            .unwrap();

        let cache = MemoizingCache::new(backend, "ns", EvictionPolicy::Fifo, 4);
        let value: std::result::Result<u8, String> =
            cache.get_or_compute(&k, || async { Ok(1) }).await;
        assert_eq!(value.unwrap(), 1);
    }

    /// Serves stored entries but refuses to delete them.
    struct StickyBackend(MemoryCache);

    impl CacheBackend for StickyBackend {
        fn get(&self, ns: &str, key: &str) -> Result<Option<CacheEntry>> {
            self.0.get(ns, key)
        }
        fn touch(&self, ns: &str, key: &str) -> Result<bool> {
            self.0.touch(ns, key)
        }
        fn put(&self, ns: &str, key: &str, value: &[u8], limits: CacheLimits) -> Result<usize> {
            self.0.put(ns, key, value, limits)
        }
        fn invalidate(&self, _: &str, _: &str) -> Result<bool> {
            Err(PulseError::CacheUnavailable("read-only".to_string()))
        }
        fn clear_namespace(&self, ns: &str) -> Result<usize> {
            self.0.clear_namespace(ns)
        }
        fn namespace_stats(&self, ns: &str) -> Result<CacheStats> {
            self.0.namespace_stats(ns)
        }
    }

    #[tokio::test]
    async fn test_corrupt_entry_recomputed_when_invalidate_fails() {
        let inner = MemoryCache::new();
        let k = key("bad");
        inner
            .put("ns", k.as_str(), b"not json", CacheLimits::new(EvictionPolicy::Fifo, 4))
            .unwrap();
        let backend = Arc::new(StickyBackend(inner));

        let cache = MemoizingCache::new(backend.clone(), "ns", EvictionPolicy::Fifo, 4);
        let value: std::result::Result<u8, String> =
            cache.get_or_compute(&k, || async { Ok(7) }).await;
        assert_eq!(value.unwrap(), 7);

        // The fresh value replaces the unreadable one
        let stored = backend.get("ns", k.as_str()).unwrap().unwrap();
        assert_eq!(stored.value, b"7");
    }
}
