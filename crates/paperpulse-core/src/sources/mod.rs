//! External collaborators consumed by the pipeline.
//!
//! Each upstream is reached through a narrow trait so the counting,
//! fetching and rendering logic can run against mocks:
//! - [`SearchSource`] - paginated social post search ([`TwitterSearch`])
//! - [`MetadataSource`] - bulk paper metadata lookup ([`ArxivClient`])
//! - [`Translator`] - summary translation ([`DeeplTranslator`])

mod arxiv;
mod deepl;
mod twitter;

pub use arxiv::{parse_feed, ArxivClient};
pub use deepl::{is_valid_user_id, DeeplCredentials, DeeplTranslator};
pub use twitter::{TwitterCredentials, TwitterSearch};

use crate::error::Result;
use crate::models::{MetadataRecord, Post};
use async_trait::async_trait;

/// Parameters of one paginated search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    pub page_size: u32,
    pub result_type: String,
}

/// One page of search results plus the cursor for the next page.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub posts: Vec<Post>,
    /// `None` once the source has no more results.
    pub next_cursor: Option<String>,
}

/// Paginated social search.
#[async_trait]
pub trait SearchSource: Send + Sync {
    /// Fetch the page starting at `cursor` (`None` for the first page).
    async fn search_page(&self, request: &SearchRequest, cursor: Option<&str>)
        -> Result<SearchPage>;
}

/// Bulk paper metadata lookup.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    /// Fetch records for `ids` that also match `filter_query` (empty for no filter).
    ///
    /// Implementations pace their own requests to respect upstream limits.
    async fn fetch_by_ids(&self, ids: &[String], filter_query: &str)
        -> Result<Vec<MetadataRecord>>;
}

/// Text to translate, plus the user the request is made for.
///
/// `user` selects credentials only; it never changes the translation.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    pub text: &'a str,
    pub target_lang: &'a str,
    pub user: Option<&'a str>,
}

/// Machine translation.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, request: &TranslationRequest<'_>) -> Result<String>;
}
