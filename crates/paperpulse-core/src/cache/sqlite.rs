//! SQLite-backed durable cache store.

use super::traits::{CacheBackend, CacheEntry, CacheLimits, CacheStats, EvictionPolicy};
use crate::error::{PulseError, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How long a writer waits on another process holding the database lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based cache backend.
///
/// One database file holds every namespace and may be shared by several
/// processes. Insertion and access order come from a persistent logical
/// clock, so FIFO/LRU ordering does not depend on timestamp resolution.
pub struct SqliteCache {
    /// Database connection (wrapped for thread safety).
    conn: Arc<Mutex<Connection>>,
}

impl SqliteCache {
    /// Open (or create) a cache database at the specified path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PulseError::Io {
                message: format!("Failed to create cache directory: {}", e),
                path: Some(parent.to_path_buf()),
                source: Some(e),
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| PulseError::Database {
            message: format!("Failed to open cache database: {}", e),
            source: Some(e),
        })?;

        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| PulseError::Database {
                message: format!("Failed to set busy timeout: {}", e),
                source: Some(e),
            })?;

        // WAL lets readers in other processes proceed while one process writes
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .map_err(|e| PulseError::Database {
                message: format!("Failed to set pragmas: {}", e),
                source: Some(e),
            })?;

        let cache = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        cache.init_schema()?;

        Ok(cache)
    }

    /// Open the cache at the platform cache directory.
    pub fn open_default() -> Result<Self> {
        Self::open(default_db_path()?)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| PulseError::Database {
            message: format!("Failed to lock database: {}", e),
            source: None,
        })
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value BLOB NOT NULL,
                inserted_seq INTEGER NOT NULL,
                accessed_seq INTEGER NOT NULL,
                size_bytes INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (namespace, key)
            );

            -- FIFO eviction order
            CREATE INDEX IF NOT EXISTS idx_cache_inserted
                ON cache_entries(namespace, inserted_seq);

            -- LRU eviction order
            CREATE INDEX IF NOT EXISTS idx_cache_accessed
                ON cache_entries(namespace, accessed_seq);

            -- Single-row logical clock shared by all processes
            CREATE TABLE IF NOT EXISTS cache_clock (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                tick INTEGER NOT NULL
            );
            INSERT OR IGNORE INTO cache_clock (id, tick) VALUES (1, 0);
            "#,
        )
        .map_err(|e| PulseError::Database {
            message: format!("Failed to initialize cache schema: {}", e),
            source: Some(e),
        })?;

        Ok(())
    }
}

/// Default database location under the platform cache directory.
pub fn default_db_path() -> Result<std::path::PathBuf> {
    use crate::config::CacheDefaults;

    let base = dirs::cache_dir().ok_or_else(|| PulseError::Config {
        message: "Could not determine cache directory".to_string(),
    })?;
    Ok(base.join(CacheDefaults::DIR_NAME).join(CacheDefaults::DB_FILENAME))
}

/// Advance the logical clock. Must run inside the caller's transaction.
fn next_tick(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row(
        "UPDATE cache_clock SET tick = tick + 1 WHERE id = 1 RETURNING tick",
        [],
        |row| row.get(0),
    )
}

fn eviction_column(policy: EvictionPolicy) -> &'static str {
    match policy {
        EvictionPolicy::Fifo => "inserted_seq",
        EvictionPolicy::Lru => "accessed_seq",
    }
}

impl CacheBackend for SqliteCache {
    fn get(&self, namespace: &str, key: &str) -> Result<Option<CacheEntry>> {
        let conn = self.lock()?;

        let row: Option<(Vec<u8>, i64, i64, String)> = conn
            .query_row(
                r#"
                SELECT value, inserted_seq, accessed_seq, cached_at
                FROM cache_entries
                WHERE namespace = ?1 AND key = ?2
                "#,
                params![namespace, key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()
            .map_err(|e| PulseError::Database {
                message: format!("Failed to query cache entry: {}", e),
                source: Some(e),
            })?;

        Ok(row.map(|(value, inserted_seq, accessed_seq, cached_at_str)| {
            let cached_at = DateTime::parse_from_rfc3339(&cached_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now());
            CacheEntry {
                key: key.to_string(),
                value,
                inserted_seq: inserted_seq as u64,
                accessed_seq: accessed_seq as u64,
                cached_at,
            }
        }))
    }

    fn touch(&self, namespace: &str, key: &str) -> Result<bool> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let tick = next_tick(&tx)?;
        let updated = tx.execute(
            "UPDATE cache_entries SET accessed_seq = ?1 WHERE namespace = ?2 AND key = ?3",
            params![tick, namespace, key],
        )?;

        tx.commit()?;
        Ok(updated > 0)
    }

    fn put(&self, namespace: &str, key: &str, value: &[u8], limits: CacheLimits) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| PulseError::Database {
                message: format!("Failed to begin cache write: {}", e),
                source: Some(e),
            })?;

        let tick = next_tick(&tx)?;
        let now = Utc::now().to_rfc3339();

        // Concurrent writers of the same key: last write wins, first insertion order is kept
        tx.execute(
            r#"
            INSERT INTO cache_entries
                (namespace, key, value, inserted_seq, accessed_seq, size_bytes, cached_at)
            VALUES (?1, ?2, ?3, ?4, ?4, ?5, ?6)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                accessed_seq = excluded.accessed_seq,
                size_bytes = excluded.size_bytes,
                cached_at = excluded.cached_at
            "#,
            params![namespace, key, value, tick, value.len() as i64, now],
        )
        .map_err(|e| PulseError::Database {
            message: format!("Failed to set cache entry: {}", e),
            source: Some(e),
        })?;

        let count: i64 = tx.query_row(
            "SELECT COUNT(*) FROM cache_entries WHERE namespace = ?1",
            params![namespace],
            |row| row.get(0),
        )?;

        let capacity = i64::try_from(limits.capacity).unwrap_or(i64::MAX);
        let excess = count.saturating_sub(capacity);
        let evicted = if excess > 0 {
            let sql = format!(
                r#"
                DELETE FROM cache_entries
                WHERE namespace = ?1 AND key IN (
                    SELECT key FROM cache_entries
                    WHERE namespace = ?1
                    ORDER BY {} ASC
                    LIMIT ?2
                )
                "#,
                eviction_column(limits.policy)
            );
            tx.execute(&sql, params![namespace, excess])
                .map_err(|e| PulseError::Database {
                    message: format!("Failed to evict cache entries: {}", e),
                    source: Some(e),
                })?
        } else {
            0
        };

        tx.commit().map_err(|e| PulseError::Database {
            message: format!("Failed to commit cache write: {}", e),
            source: Some(e),
        })?;

        if evicted > 0 {
            debug!(
                "Evicted {} {} entries from namespace '{}'",
                evicted, limits.policy, namespace
            );
        }

        Ok(evicted)
    }

    fn invalidate(&self, namespace: &str, key: &str) -> Result<bool> {
        let conn = self.lock()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1 AND key = ?2",
                params![namespace, key],
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to invalidate cache entry: {}", e),
                source: Some(e),
            })?;

        Ok(deleted > 0)
    }

    fn clear_namespace(&self, namespace: &str) -> Result<usize> {
        let conn = self.lock()?;

        let deleted = conn
            .execute(
                "DELETE FROM cache_entries WHERE namespace = ?1",
                params![namespace],
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to clear namespace: {}", e),
                source: Some(e),
            })?;

        debug!("Cleared {} entries from namespace '{}'", deleted, namespace);
        Ok(deleted)
    }

    fn namespace_stats(&self, namespace: &str) -> Result<CacheStats> {
        let conn = self.lock()?;

        let (count, size): (i64, i64) = conn
            .query_row(
                r#"
                SELECT COUNT(*), COALESCE(SUM(size_bytes), 0)
                FROM cache_entries
                WHERE namespace = ?1
                "#,
                params![namespace],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| PulseError::Database {
                message: format!("Failed to query namespace stats: {}", e),
                source: Some(e),
            })?;

        Ok(CacheStats {
            namespace: namespace.to_string(),
            entry_count: count as usize,
            total_size_bytes: size as u64,
        })
    }
}
