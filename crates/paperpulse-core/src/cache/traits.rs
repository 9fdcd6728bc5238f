//! Cache backend trait and types.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which entry leaves first when a namespace grows past its capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    /// Oldest insertion is evicted, regardless of reads.
    Fifo,
    /// Entry with the oldest hit or insertion is evicted.
    Lru,
}

impl EvictionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicy::Fifo => "fifo",
            EvictionPolicy::Lru => "lru",
        }
    }
}

impl std::fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capacity bound applied when inserting into a namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheLimits {
    pub policy: EvictionPolicy,
    /// Maximum number of entries kept in the namespace.
    pub capacity: usize,
}

impl CacheLimits {
    pub fn new(policy: EvictionPolicy, capacity: usize) -> Self {
        Self { policy, capacity }
    }
}

/// A stored entry with its ordering metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized value.
    pub value: Vec<u8>,
    /// Logical time of first insertion (FIFO order).
    pub inserted_seq: u64,
    /// Logical time of the latest hit or insertion (LRU order).
    pub accessed_seq: u64,
    /// Wall-clock time of the latest write.
    pub cached_at: DateTime<Utc>,
}

/// Per-namespace statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub namespace: String,
    pub entry_count: usize,
    pub total_size_bytes: u64,
}

/// Durable key-value store behind a memoizing cache.
///
/// Namespaces isolate independent caches sharing one store. All operations
/// are synchronous to match rusqlite's API.
pub trait CacheBackend: Send + Sync {
    /// Get the entry for `key`, without changing its recency.
    fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>>;

    /// Mark `key` as just accessed. Returns false if the key is absent.
    fn touch(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Insert or overwrite `key`, then evict down to `limits.capacity`.
    ///
    /// Overwriting keeps the entry's original insertion order. Returns the
    /// number of evicted entries.
    fn put(&self, namespace: &str, key: &str, value: &[u8], limits: CacheLimits) -> Result<usize>;

    /// Delete a specific key.
    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool>;

    /// Delete every key in a namespace.
    fn clear_namespace(&self, namespace: &str) -> Result<usize>;

    /// Entry count and size of a namespace.
    fn namespace_stats(&self, namespace: &str) -> Result<CacheStats>;
}
