//! Rendering of one paper into a chat-ready text block.
//!
//! Layout, one item per line:
//!
//! ```text
//! http://arxiv.org/abs/1234.5678v2
//! Title
//! Author One, Author Two
//! 2020/01/02, 2020/03/04, <vanity link>, <N tweets link>, cs.CL | cs.LG, comment
//! Summary (translated when possible)
//! ```

use crate::cache::{CacheKey, MemoizingCache};
use crate::config::{CacheDefaults, DigestConfig};
use crate::error::PulseError;
use crate::models::MetadataRecord;
use crate::sources::{TranslationRequest, Translator};
use std::sync::Arc;
use tracing::warn;

/// Renders records, translating summaries on a best-effort basis.
pub struct DigestBuilder {
    translator: Option<Arc<dyn Translator>>,
    cache: MemoizingCache,
    target_lang: String,
}

impl DigestBuilder {
    pub fn new(translator: Option<Arc<dyn Translator>>, cache: MemoizingCache) -> Self {
        Self {
            translator,
            cache,
            target_lang: DigestConfig::TARGET_LANG.to_string(),
        }
    }

    /// Builder without translation; summaries are rendered as fetched.
    pub fn untranslated() -> Self {
        Self::new(None, MemoizingCache::disabled(CacheDefaults::TRANSLATION_NAMESPACE))
    }

    pub fn with_target_lang(mut self, target_lang: impl Into<String>) -> Self {
        self.target_lang = target_lang.into();
        self
    }

    /// Render `record`, translating its summary with `user`'s credentials.
    pub async fn render(&self, record: &MetadataRecord, user: Option<&str>) -> String {
        let summary = single_line(&record.summary);
        let translated = self.translate(&summary, user).await;
        format_digest(record, translated.as_deref().unwrap_or(&summary))
    }

    /// Cached translation of `text`, or `None` when unavailable.
    ///
    /// The user only picks credentials and is not part of the cache key.
    async fn translate(&self, text: &str, user: Option<&str>) -> Option<String> {
        let translator = self.translator.as_ref()?;
        if text.trim().is_empty() {
            return None;
        }

        let key = CacheKey::builder(CacheDefaults::TRANSLATION_NAMESPACE)
            .text("text", text)
            .text("target_lang", &self.target_lang)
            .build();

        let request = TranslationRequest {
            text,
            target_lang: &self.target_lang,
            user,
        };

        let result = self
            .cache
            .get_or_compute(&key, || async {
                let translated = translator.translate(&request).await?;
                if translated.trim().is_empty() {
                    return Err(PulseError::Other("empty translation".to_string()));
                }
                Ok::<_, PulseError>(translated)
            })
            .await;

        match result {
            Ok(translated) => Some(translated),
            Err(e) => {
                warn!("Translation failed, using original summary: {}", e);
                None
            }
        }
    }
}

fn single_line(text: &str) -> String {
    text.replace('\n', " ")
}

/// Format a record with an already chosen summary text.
pub fn format_digest(record: &MetadataRecord, summary: &str) -> String {
    let paper_id = record
        .paper_id
        .clone()
        .or_else(|| record.canonical_id())
        .map(|id| id.into_string())
        .unwrap_or_else(|| record.id.clone());

    let dates = format!(
        "{}, {}",
        record.published.format("%Y/%m/%d"),
        record.updated.format("%Y/%m/%d")
    );
    let vanity = format!("<{}|vanity>", vanity_url(&paper_id));
    let tweets = format!(
        "<{}|{} tweets>",
        tweets_url(&paper_id),
        record
            .tweet_count
            .map_or_else(|| "?".to_string(), |n| n.to_string())
    );
    let tags = record.tags.join(" | ");
    let comment = record.comment.as_deref().unwrap_or("");

    [
        record.id.clone(),
        single_line(&record.title),
        record.authors.join(", "),
        [dates.as_str(), vanity.as_str(), tweets.as_str(), tags.as_str(), comment].join(", "),
        summary.to_string(),
    ]
    .join("\n")
}

fn vanity_url(paper_id: &str) -> String {
    format!("{}/{}/", DigestConfig::VANITY_URL_BASE, paper_id)
}

/// Live search for posts linking either form of the paper URL.
fn tweets_url(paper_id: &str) -> String {
    format!(
        "{}?q=arxiv.org%2Fabs%2F{id}%20OR%20arxiv.org%2Fpdf%2F{id}.pdf%20&f=live",
        DigestConfig::TWEETS_SEARCH_BASE,
        id = paper_id
    )
}
