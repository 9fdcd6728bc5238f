//! Frequency counting of paper links across social search results.
//!
//! A scan walks the search source page by page through a [`PostScan`],
//! which stops at the record budget or when the source runs dry, and never
//! iterates past either. Each post contributes at most one count per paper.

use crate::cache::{CacheKey, MemoizingCache};
use crate::config::ScanConfig;
use crate::error::Result;
use crate::identifier::{extract_all_identifiers, PaperId};
use crate::models::Post;
use crate::sources::{SearchRequest, SearchSource};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

/// Upper bound on the work done by one scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanBudget {
    /// Records requested per page.
    pub page_size: u32,
    /// Records consumed before the scan stops.
    pub max_records: usize,
}

impl Default for ScanBudget {
    fn default() -> Self {
        Self {
            page_size: ScanConfig::PAGE_SIZE,
            max_records: ScanConfig::MAX_RECORDS,
        }
    }
}

impl ScanBudget {
    pub fn new(page_size: u32, max_records: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            max_records,
        }
    }
}

/// Paper identifier to number of posts linking it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FrequencyTable(BTreeMap<PaperId, u64>);

impl FrequencyTable {
    /// Count for `id`, 0 if absent.
    pub fn get(&self, id: &PaperId) -> u64 {
        self.0.get(id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PaperId, u64)> {
        self.0.iter().map(|(id, count)| (id, *count))
    }

    /// Identifiers in sorted order.
    pub fn ids(&self) -> impl Iterator<Item = &PaperId> {
        self.0.keys()
    }

    fn record_post(&mut self, post: &Post) {
        for id in extract_all_identifiers(&post.text) {
            *self.0.entry(id).or_insert(0) += 1;
        }
    }
}

impl FromIterator<(PaperId, u64)> for FrequencyTable {
    fn from_iter<I: IntoIterator<Item = (PaperId, u64)>>(iter: I) -> Self {
        FrequencyTable(iter.into_iter().collect())
    }
}

/// Bounded, resumable walk over a paginated search.
pub struct PostScan<'a> {
    source: &'a dyn SearchSource,
    query: String,
    page_size: u32,
    cursor: Option<String>,
    remaining: usize,
    exhausted: bool,
}

impl<'a> PostScan<'a> {
    pub fn new(source: &'a dyn SearchSource, query: &str, budget: ScanBudget) -> Self {
        Self::resume(source, query, budget, None)
    }

    /// Continue a scan from a cursor returned by an earlier one.
    pub fn resume(
        source: &'a dyn SearchSource,
        query: &str,
        budget: ScanBudget,
        cursor: Option<String>,
    ) -> Self {
        Self {
            source,
            query: query.to_string(),
            page_size: budget.page_size.max(1),
            cursor,
            remaining: budget.max_records,
            exhausted: false,
        }
    }

    /// Cursor of the next page, if the source has one.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    /// Records still allowed by the budget.
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    /// Fetch the next page, or `None` once the budget or the source is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<Post>>> {
        if self.exhausted || self.remaining == 0 {
            return Ok(None);
        }

        let request = SearchRequest {
            query: self.query.clone(),
            page_size: self.page_size.min(self.remaining.min(u32::MAX as usize) as u32),
            result_type: ScanConfig::RESULT_TYPE.to_string(),
        };

        let page = self
            .source
            .search_page(&request, self.cursor.as_deref())
            .await?;

        let mut posts = page.posts;
        posts.truncate(self.remaining);
        self.remaining -= posts.len();
        self.cursor = page.next_cursor;

        // An empty page with a cursor would loop forever
        if self.cursor.is_none() || posts.is_empty() {
            self.exhausted = true;
        }

        Ok(Some(posts))
    }
}

/// Result of one uncached scan.
#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub table: FrequencyTable,
    pub records_scanned: usize,
    /// Set when the scan stopped on an upstream failure.
    pub degraded: bool,
}

/// Scan `query` within `budget` and count paper links.
///
/// An upstream failure ends the scan early; counts gathered so far are kept.
pub async fn scan_frequencies(
    source: &dyn SearchSource,
    query: &str,
    budget: ScanBudget,
) -> ScanOutcome {
    let start = Instant::now();
    let mut scan = PostScan::new(source, query, budget);
    let mut table = FrequencyTable::default();
    let mut records_scanned = 0;
    let mut degraded = false;

    loop {
        match scan.next_page().await {
            Ok(Some(posts)) => {
                for post in &posts {
                    table.record_post(post);
                }
                records_scanned += posts.len();
            }
            Ok(None) => break,
            Err(e) => {
                if e.is_transient() {
                    warn!(
                        "Search for '{}' failed after {} records, keeping partial counts: {}",
                        query, records_scanned, e
                    );
                } else {
                    error!(
                        "Search for '{}' failed unexpectedly after {} records, keeping partial counts: {}",
                        query, records_scanned, e
                    );
                }
                degraded = true;
                break;
            }
        }
    }

    info!(
        "Scanned {} records for '{}': {} papers in {:.3?}",
        records_scanned,
        query,
        table.len(),
        start.elapsed()
    );

    ScanOutcome {
        table,
        records_scanned,
        degraded,
    }
}

/// Cached frequency counting over a search source.
pub struct FrequencyCounter {
    source: Arc<dyn SearchSource>,
    cache: MemoizingCache,
}

impl FrequencyCounter {
    pub fn new(source: Arc<dyn SearchSource>, cache: MemoizingCache) -> Self {
        Self { source, cache }
    }

    /// Count posts linking each paper for `query`, scanning at most `budget`.
    ///
    /// Never fails: upstream errors degrade to partial counts. A scan that
    /// failed before collecting anything is returned but not cached.
    pub async fn count(&self, query: &str, budget: ScanBudget) -> FrequencyTable {
        let key = CacheKey::builder("tweeted-id-counts")
            .text("query", query)
            .number("page_size", budget.page_size as u64)
            .number("max_records", budget.max_records as u64)
            .build();

        let result = self
            .cache
            .get_or_compute(&key, || async {
                let outcome = scan_frequencies(self.source.as_ref(), query, budget).await;
                if outcome.degraded && outcome.table.is_empty() {
                    Err(outcome.table)
                } else {
                    Ok(outcome.table)
                }
            })
            .await;

        match result {
            Ok(table) => table,
            Err(unstored) => unstored,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{EvictionPolicy, MemoryCache};
    use crate::error::PulseError;
    use crate::sources::SearchPage;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Source with `total` posts; post `i` links paper `i % papers`.
    struct CountingSource {
        total: usize,
        papers: usize,
        fail_on_page: Option<usize>,
        pages_served: AtomicUsize,
    }

    impl CountingSource {
        fn new(total: usize, papers: usize) -> Self {
            Self {
                total,
                papers,
                fail_on_page: None,
                pages_served: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SearchSource for CountingSource {
        async fn search_page(
            &self,
            request: &SearchRequest,
            cursor: Option<&str>,
        ) -> Result<SearchPage> {
            let page = self.pages_served.fetch_add(1, Ordering::SeqCst);
            if self.fail_on_page == Some(page) {
                return Err(PulseError::RateLimited {
                    service: "mock".to_string(),
                    retry_after_secs: Some(900),
                });
            }

            let offset: usize = cursor.map(|c| c.parse().unwrap()).unwrap_or(0);
            let end = (offset + request.page_size as usize).min(self.total);
            let posts = (offset..end)
                .map(|i| Post {
                    id: i.to_string(),
                    text: format!(
                        "post {} https://arxiv.org/abs/2001.{:05}v1 https://arxiv.org/pdf/2001.{:05}.pdf",
                        i,
                        i % self.papers,
                        i % self.papers
                    ),
                })
                .collect();
            Ok(SearchPage {
                posts,
                next_cursor: (end < self.total).then(|| end.to_string()),
            })
        }
    }

    fn id(n: usize) -> PaperId {
        PaperId::canonicalize(&format!("2001.{:05}", n))
    }

    #[tokio::test]
    async fn test_counts_distinct_posts() {
        let source = CountingSource::new(10, 3);
        let outcome = scan_frequencies(&source, "q", ScanBudget::new(4, 100)).await;

        assert!(!outcome.degraded);
        assert_eq!(outcome.records_scanned, 10);
        assert_eq!(outcome.table.get(&id(0)), 4);
        assert_eq!(outcome.table.get(&id(1)), 3);
        assert_eq!(outcome.table.get(&id(2)), 3);
        assert_eq!(outcome.table.get(&id(9)), 0);
    }

    #[tokio::test]
    async fn test_budget_caps_records_scanned() {
        let source = CountingSource::new(1_000, 5);
        let outcome = scan_frequencies(&source, "q", ScanBudget::new(100, 250)).await;

        assert_eq!(outcome.records_scanned, 250);
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 3);
        let total: u64 = outcome.table.iter().map(|(_, c)| c).sum();
        assert_eq!(total, 250);
    }

    #[tokio::test]
    async fn test_failure_keeps_partial_counts() {
        let mut source = CountingSource::new(100, 2);
        source.fail_on_page = Some(2);
        let outcome = scan_frequencies(&source, "q", ScanBudget::new(10, 100)).await;

        assert!(outcome.degraded);
        assert_eq!(outcome.records_scanned, 20);
        assert_eq!(outcome.table.get(&id(0)), 10);
    }

    #[tokio::test]
    async fn test_scan_is_resumable() {
        let source = CountingSource::new(30, 3);
        let mut first = PostScan::new(&source, "q", ScanBudget::new(10, 10));
        assert_eq!(first.next_page().await.unwrap().unwrap().len(), 10);
        assert!(first.next_page().await.unwrap().is_none());

        let cursor = first.cursor().map(str::to_string);
        let mut second = PostScan::resume(&source, "q", ScanBudget::new(10, 100), cursor);
        let posts = second.next_page().await.unwrap().unwrap();
        assert_eq!(posts[0].id, "10");
    }

    #[tokio::test]
    async fn test_counter_caches_by_query() {
        let source = Arc::new(CountingSource::new(20, 4));
        let cache = MemoizingCache::new(Arc::new(MemoryCache::new()), "counts", EvictionPolicy::Fifo, 8);
        let counter = FrequencyCounter::new(source.clone(), cache);
        let budget = ScanBudget::new(10, 100);

        let first = counter.count("\"arxiv.org\"", budget).await;
        let second = counter.count("\"arxiv.org\"", budget).await;
        assert_eq!(first, second);
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 2);

        counter.count("other", budget).await;
        assert_eq!(source.pages_served.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_empty_degraded_scan_is_not_cached() {
        let mut source = CountingSource::new(20, 4);
        source.fail_on_page = Some(0);
        let source = Arc::new(source);
        let cache = MemoizingCache::new(Arc::new(MemoryCache::new()), "counts", EvictionPolicy::Fifo, 8);
        let counter = FrequencyCounter::new(source.clone(), cache);
        let budget = ScanBudget::new(10, 100);

        assert!(counter.count("q", budget).await.is_empty());
        let retried = counter.count("q", budget).await;
        assert_eq!(retried.len(), 4);
    }
}
