//! Chunked bulk metadata fetching.

use crate::cache::{CacheKey, MemoizingCache};
use crate::config::CacheDefaults;
use crate::models::MetadataRecord;
use crate::sources::MetadataSource;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Result of one uncached bulk fetch.
#[derive(Debug, Clone, Default)]
pub struct FetchOutcome {
    pub records: Vec<MetadataRecord>,
    pub chunks: usize,
    pub failed_chunks: usize,
}

/// Fetch `ids` in consecutive chunks of at most `chunk_size`, one call per chunk.
///
/// Chunks run sequentially; the source paces its own calls. A failed chunk
/// contributes nothing and the remaining chunks still run.
pub async fn fetch_in_chunks(
    source: &dyn MetadataSource,
    ids: &[String],
    filter_query: &str,
    chunk_size: usize,
) -> FetchOutcome {
    let start = Instant::now();
    let mut outcome = FetchOutcome::default();

    for (index, chunk) in ids.chunks(chunk_size.max(1)).enumerate() {
        outcome.chunks += 1;
        match source.fetch_by_ids(chunk, filter_query).await {
            Ok(records) => {
                debug!("Chunk {} returned {} records", index + 1, records.len());
                outcome.records.extend(records);
            }
            Err(e) if e.is_transient() => {
                warn!(
                    "Metadata chunk {} ({} ids) failed, skipping: {}",
                    index + 1,
                    chunk.len(),
                    e
                );
                outcome.failed_chunks += 1;
            }
            Err(e) => {
                error!(
                    "Metadata chunk {} ({} ids) failed unexpectedly, skipping: {}",
                    index + 1,
                    chunk.len(),
                    e
                );
                outcome.failed_chunks += 1;
            }
        }
    }

    info!(
        "Fetched {} records for {} ids in {} chunks ({} failed) in {:.3?}",
        outcome.records.len(),
        ids.len(),
        outcome.chunks,
        outcome.failed_chunks,
        start.elapsed()
    );
    outcome
}

/// Cached, chunked metadata lookup.
pub struct BulkMetadataFetcher {
    source: Arc<dyn MetadataSource>,
    cache: MemoizingCache,
}

impl BulkMetadataFetcher {
    pub fn new(source: Arc<dyn MetadataSource>, cache: MemoizingCache) -> Self {
        Self { source, cache }
    }

    /// Records for `ids` matching `filter_query`, in discovery order.
    ///
    /// The cache key covers the distinct ids regardless of their order, so a
    /// reordered list hits the entry of the call that populated it. Results
    /// with failed chunks are returned but not cached.
    pub async fn fetch(
        &self,
        ids: &[String],
        filter_query: &str,
        chunk_size: usize,
    ) -> Vec<MetadataRecord> {
        if ids.is_empty() {
            return Vec::new();
        }

        let distinct: BTreeSet<&str> = ids.iter().map(String::as_str).collect();
        let key = CacheKey::builder(CacheDefaults::METADATA_NAMESPACE)
            .list("ids", distinct)
            .text("filter", filter_query)
            .number("chunk_size", chunk_size as u64)
            .build();

        let result = self
            .cache
            .get_or_compute(&key, || async {
                let outcome =
                    fetch_in_chunks(self.source.as_ref(), ids, filter_query, chunk_size).await;
                if outcome.failed_chunks > 0 {
                    Err(outcome.records)
                } else {
                    Ok(outcome.records)
                }
            })
            .await;

        match result {
            Ok(records) => records,
            Err(partial) => partial,
        }
    }
}
