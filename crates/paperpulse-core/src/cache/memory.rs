//! In-process cache store with the same ordering rules as [`super::SqliteCache`].
//!
//! Not durable. Used for tests and for running without a database file.

use super::traits::{CacheBackend, CacheEntry, CacheLimits, CacheStats, EvictionPolicy};
use crate::error::{PulseError, Result};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Default)]
struct MemoryState {
    clock: u64,
    namespaces: HashMap<String, HashMap<String, CacheEntry>>,
}

impl MemoryState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }
}

/// Mutex-guarded map of namespaces.
#[derive(Default)]
pub struct MemoryCache {
    state: Mutex<MemoryState>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| PulseError::CacheUnavailable(format!("memory cache poisoned: {}", e)))
    }
}

impl CacheBackend for MemoryCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let state = self.lock()?;
        Ok(state
            .namespaces
            .get(namespace)
            .and_then(|entries| entries.get(key))
            .cloned())
    }

    fn touch(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let tick = state.tick();
        match state
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.get_mut(key))
        {
            Some(entry) => {
                entry.accessed_seq = tick;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8], limits: CacheLimits) -> Result<usize> {
        let mut state = self.lock()?;
        let tick = state.tick();
        let entries = state.namespaces.entry(namespace.to_string()).or_default();

        let inserted_seq = entries.get(key).map(|e| e.inserted_seq).unwrap_or(tick);
        entries.insert(
            key.to_string(),
            CacheEntry {
                key: key.to_string(),
                value: value.to_vec(),
                inserted_seq,
                accessed_seq: tick,
                cached_at: Utc::now(),
            },
        );

        let excess = entries.len().saturating_sub(limits.capacity);
        if excess == 0 {
            return Ok(0);
        }

        let mut order: Vec<(u64, String)> = entries
            .values()
            .map(|e| {
                let seq = match limits.policy {
                    EvictionPolicy::Fifo => e.inserted_seq,
                    EvictionPolicy::Lru => e.accessed_seq,
                };
                (seq, e.key.clone())
            })
            .collect();
        order.sort();

        for (_, victim) in order.into_iter().take(excess) {
            entries.remove(&victim);
        }

        Ok(excess)
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut state = self.lock()?;
        Ok(state
            .namespaces
            .get_mut(namespace)
            .and_then(|entries| entries.remove(key))
            .is_some())
    }

    fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let mut state = self.lock()?;
        Ok(state
            .namespaces
            .remove(namespace)
            .map(|entries| entries.len())
            .unwrap_or(0))
    }

    fn namespace_stats(&self, namespace: &str) -> Result<CacheStats> {
        let state = self.lock()?;
        let (entry_count, total_size_bytes) = state
            .namespaces
            .get(namespace)
            .map(|entries| {
                (
                    entries.len(),
                    entries.values().map(|e| e.value.len() as u64).sum(),
                )
            })
            .unwrap_or((0, 0));

        Ok(CacheStats {
            namespace: namespace.to_string(),
            entry_count,
            total_size_bytes,
        })
    }
}
