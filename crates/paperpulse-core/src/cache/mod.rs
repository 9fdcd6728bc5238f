//! Memoizing cache layer.
//!
//! Expensive upstream calls (social search scans, bulk metadata queries,
//! translations) are wrapped in a [`MemoizingCache`], each owning one
//! namespace of a shared [`CacheBackend`]:
//! - [`SqliteCache`] - durable, shareable between processes
//! - [`MemoryCache`] - in-process, for tests and ephemeral runs
//!
//! Each namespace has a fixed capacity and a FIFO or LRU eviction policy.

mod memo;
mod memory;
mod sqlite;
mod traits;

pub use memo::{CacheKey, CacheKeyBuilder, MemoizingCache};
pub use memory::MemoryCache;
pub use sqlite::{default_db_path, SqliteCache};
pub use traits::{CacheBackend, CacheEntry, CacheLimits, CacheStats, EvictionPolicy};
