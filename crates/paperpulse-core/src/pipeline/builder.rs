//! Builder for configuring a [`Pipeline`].

use super::Pipeline;
use crate::cache::{CacheBackend, EvictionPolicy, MemoizingCache};
use crate::config::{CacheDefaults, DigestConfig, FetchConfig};
use crate::counter::{FrequencyCounter, ScanBudget};
use crate::digest::DigestBuilder;
use crate::error::{PulseError, Result};
use crate::fetcher::BulkMetadataFetcher;
use crate::sources::{MetadataSource, SearchSource, Translator};
use std::sync::Arc;
use tracing::info;

/// Builder for configuring a [`Pipeline`].
///
/// # Example
///
/// ```rust,ignore
/// use paperpulse_core::{ArxivClient, Pipeline, SqliteCache, TwitterSearch};
///
/// let pipeline = Pipeline::builder(Arc::new(search), Arc::new(ArxivClient::new()?))
///     .with_cache_backend(Arc::new(SqliteCache::open_default()?))
///     .top_n(5)
///     .build()?;
/// ```
pub struct PipelineBuilder {
    search: Arc<dyn SearchSource>,
    metadata: Arc<dyn MetadataSource>,
    translator: Option<Arc<dyn Translator>>,
    backend: Option<Arc<dyn CacheBackend>>,
    cache_capacity: usize,
    budget: ScanBudget,
    chunk_size: usize,
    top_n: usize,
    target_lang: String,
    default_filter: String,
}

impl PipelineBuilder {
    pub fn new(search: Arc<dyn SearchSource>, metadata: Arc<dyn MetadataSource>) -> Self {
        Self {
            search,
            metadata,
            translator: None,
            backend: None,
            cache_capacity: CacheDefaults::CAPACITY,
            budget: ScanBudget::default(),
            chunk_size: FetchConfig::MAX_CHUNK_IDS,
            top_n: DigestConfig::TOP_N,
            target_lang: DigestConfig::TARGET_LANG.to_string(),
            default_filter: DigestConfig::DEFAULT_FILTER.to_string(),
        }
    }

    /// Translate digest summaries with `translator`.
    ///
    /// Default: no translation
    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = Some(translator);
        self
    }

    /// Memoize counts, fetches and translations in `backend`.
    ///
    /// Default: no caching
    pub fn with_cache_backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Maximum entries per cache namespace.
    ///
    /// Default: 128
    pub fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn scan_budget(mut self, budget: ScanBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Identifiers per metadata request.
    ///
    /// Default: 200
    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Number of papers in a top digest.
    ///
    /// Default: 5
    pub fn top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn target_lang(mut self, target_lang: impl Into<String>) -> Self {
        self.target_lang = target_lang.into();
        self
    }

    /// Filter applied to top digests requested without one.
    pub fn default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }

    fn cache(&self, namespace: &str, policy: EvictionPolicy) -> MemoizingCache {
        match &self.backend {
            Some(backend) => {
                MemoizingCache::new(Arc::clone(backend), namespace, policy, self.cache_capacity)
            }
            None => MemoizingCache::disabled(namespace),
        }
    }

    /// Build the pipeline.
    pub fn build(self) -> Result<Pipeline> {
        if self.top_n == 0 {
            return Err(PulseError::Config {
                message: "top_n must be at least 1".to_string(),
            });
        }
        if self.chunk_size == 0 {
            return Err(PulseError::Config {
                message: "chunk_size must be at least 1".to_string(),
            });
        }

        let counter = FrequencyCounter::new(
            Arc::clone(&self.search),
            self.cache(CacheDefaults::COUNTS_NAMESPACE, CacheDefaults::COUNTS_POLICY),
        );
        let fetcher = BulkMetadataFetcher::new(
            Arc::clone(&self.metadata),
            self.cache(CacheDefaults::METADATA_NAMESPACE, CacheDefaults::METADATA_POLICY),
        );
        let digest = DigestBuilder::new(
            self.translator.clone(),
            self.cache(
                CacheDefaults::TRANSLATION_NAMESPACE,
                CacheDefaults::TRANSLATION_POLICY,
            ),
        )
        .with_target_lang(self.target_lang);

        info!(
            "Pipeline ready: caching {}, translation {}, top {}",
            if self.backend.is_some() { "on" } else { "off" },
            if self.translator.is_some() { "on" } else { "off" },
            self.top_n
        );

        Ok(Pipeline {
            counter,
            fetcher,
            digest,
            budget: self.budget,
            chunk_size: self.chunk_size,
            top_n: self.top_n,
            default_filter: self.default_filter,
        })
    }
}
