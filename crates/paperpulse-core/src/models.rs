//! Core data records shared across the pipeline.

use crate::identifier::{extract_identifier, PaperId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metadata for one paper, as returned by a bulk fetch.
///
/// `paper_id` and `tweet_count` are filled in by ranking; a freshly
/// fetched record has neither.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Identifier-bearing abstract URL, e.g. `http://arxiv.org/abs/1234.5678v2`.
    pub id: String,
    pub title: String,
    pub authors: Vec<String>,
    pub summary: String,
    /// Category terms in feed order.
    pub tags: Vec<String>,
    pub published: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub comment: Option<String>,
    #[serde(default)]
    pub pdf_url: Option<String>,
    #[serde(default)]
    pub paper_id: Option<PaperId>,
    #[serde(default)]
    pub tweet_count: Option<u64>,
}

impl MetadataRecord {
    /// Canonical identifier parsed from the record URL.
    pub fn canonical_id(&self) -> Option<PaperId> {
        extract_identifier(&self.id)
    }
}

/// One social post returned by a search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: String,
    /// Raw text content to scan for paper links.
    pub text: String,
}


#[cfg(test)]
mod tests {
    use super::fixtures::record;

    #[test]
    fn test_canonical_id_from_url() {
        let r = record("1234.5678v2", "Paper");
        assert_eq!(r.canonical_id().unwrap().as_str(), "1234.5678");
    }

    #[test]
    fn test_enrichment_fields_default_on_deserialize() {
        let r = record("1234.5678", "Paper");
        let mut json = serde_json::to_value(&r).unwrap();
        let obj = json.as_object_mut().unwrap();
        obj.remove("paper_id");
        obj.remove("tweet_count");
        let back: super::MetadataRecord = serde_json::from_value(json).unwrap();
        assert!(back.paper_id.is_none());
        assert!(back.tweet_count.is_none());
    }
}
