//! Centralized configuration for PaperPulse.
//!
//! Constant groups for network access, scanning budgets, chunking, cache
//! namespaces and digest rendering. Credentials come from the environment.

use crate::cache::EvictionPolicy;
use std::time::Duration;

/// Network-related configuration.
pub struct NetworkConfig;

impl NetworkConfig {
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const USER_AGENT: &'static str = "paperpulse/0.3";
    pub const TWITTER_API_BASE: &'static str = "https://api.twitter.com";
    pub const ARXIV_API_BASE: &'static str = "http://export.arxiv.org/api/query";
    pub const DEEPL_API_URL: &'static str = "https://api.deepl.com/v2/translate";
}

/// Budget for paginated social search scans.
pub struct ScanConfig;

impl ScanConfig {
    /// Records requested per search page (API maximum).
    pub const PAGE_SIZE: u32 = 100;
    /// Maximum pages consumed per scan.
    pub const MAX_PAGES: usize = 400;
    /// Maximum records consumed per scan.
    pub const MAX_RECORDS: usize = Self::PAGE_SIZE as usize * Self::MAX_PAGES;
    pub const RESULT_TYPE: &'static str = "recent";
}

/// Chunking and pacing for bulk metadata fetches.
pub struct FetchConfig;

impl FetchConfig {
    /// Identifiers per request; keeps the query URI under the server's length limit.
    pub const MAX_CHUNK_IDS: usize = 200;
    /// Minimum spacing between two metadata API calls.
    pub const MIN_REQUEST_INTERVAL: Duration = Duration::from_secs(3);
}

/// Defaults for the memoizing caches.
pub struct CacheDefaults;

impl CacheDefaults {
    pub const CAPACITY: usize = 128;
    pub const DB_FILENAME: &'static str = "paperpulse-cache.sqlite";
    pub const DIR_NAME: &'static str = "paperpulse";

    pub const COUNTS_NAMESPACE: &'static str = "tweeted-id-counts";
    pub const COUNTS_POLICY: EvictionPolicy = EvictionPolicy::Fifo;

    pub const METADATA_NAMESPACE: &'static str = "arxiv-query";
    pub const METADATA_POLICY: EvictionPolicy = EvictionPolicy::Fifo;

    pub const TRANSLATION_NAMESPACE: &'static str = "translate-text";
    pub const TRANSLATION_POLICY: EvictionPolicy = EvictionPolicy::Lru;
}

/// Digest rendering and ranking defaults.
pub struct DigestConfig;

impl DigestConfig {
    pub const TARGET_LANG: &'static str = "JA";
    pub const TOP_N: usize = 5;
    pub const TOP_COMMAND: &'static str = "top5";
    pub const DEFAULT_FILTER: &'static str =
        "cat:cs.CV OR cat:cs.AI OR cat:cs.LG OR cat:cs.CL OR cat:cs.NE OR cat:stat.ML";
    /// Search query matching any post that links to the preprint server.
    pub const ALL_PAPERS_QUERY: &'static str = "\"arxiv.org\"";
    pub const VANITY_URL_BASE: &'static str = "https://www.arxiv-vanity.com/papers";
    pub const TWEETS_SEARCH_BASE: &'static str = "https://twitter.com/search";
}

/// Environment variable names for upstream credentials.
pub struct EnvKeys;

impl EnvKeys {
    pub const TWITTER_BEARER_TOKEN: &'static str = "TWITTER_BEARER_TOKEN";
    pub const TWITTER_API_KEY: &'static str = "TWITTER_API_KEY";
    pub const TWITTER_API_SECRET_KEY: &'static str = "TWITTER_API_SECRET_KEY";
    pub const DEEPL_AUTH_KEY: &'static str = "DEEPL_AUTH_KEY";
    /// Prefix for per-user keys, e.g. `DEEPL_AUTH_KEY_U024BE7LH`.
    pub const DEEPL_AUTH_KEY_USER_PREFIX: &'static str = "DEEPL_AUTH_KEY_";
}

/// Read a non-empty, trimmed environment variable.
pub fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
