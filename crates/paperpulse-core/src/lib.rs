//! PaperPulse Core - popularity aggregation and digests for arXiv papers.
//!
//! This crate scans social search results for paper links, counts how many
//! posts mention each paper, fetches paper metadata in bulk and renders a
//! ranked digest. Expensive upstream calls are memoized in a durable cache.
//! It can be used without any HTTP layer; see `paperpulse-rpc` for the
//! chat events endpoint.
//!
//! # Example
//!
//! ```rust,ignore
//! use paperpulse_core::{ArxivClient, Pipeline, SqliteCache, TwitterCredentials, TwitterSearch};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> paperpulse_core::Result<()> {
//!     let search = TwitterSearch::new(TwitterCredentials::Bearer("token".into()))?;
//!     let pipeline = Pipeline::builder(Arc::new(search), Arc::new(ArxivClient::new()?))
//!         .with_cache_backend(Arc::new(SqliteCache::open_default()?))
//!         .build()?;
//!
//!     for digest in pipeline.top_papers(Some("cat:cs.CL"), None).await? {
//!         println!("{}\n", digest);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod counter;
pub mod digest;
pub mod error;
pub mod fetcher;
pub mod identifier;
pub mod models;
pub mod pipeline;
pub mod ranker;
pub mod sources;

// Re-export commonly used types
pub use cache::{
    CacheBackend, CacheKey, CacheLimits, CacheStats, EvictionPolicy, MemoizingCache, MemoryCache,
    SqliteCache,
};
pub use counter::{FrequencyCounter, FrequencyTable, PostScan, ScanBudget};
pub use digest::{format_digest, DigestBuilder};
pub use error::{PulseError, Result};
pub use fetcher::BulkMetadataFetcher;
pub use identifier::{
    canonicalize, extract_all_identifiers, extract_identifier, IdentifierSet, PaperId,
};
pub use models::{MetadataRecord, Post};
pub use pipeline::{
    validate_filter, Command, Dispatch, MessageEvent, Pipeline, PipelineBuilder, Reply, Responder,
};
pub use ranker::rank_top;
pub use sources::{
    ArxivClient, DeeplCredentials, DeeplTranslator, MetadataSource, SearchSource, Translator,
    TwitterCredentials, TwitterSearch,
};
