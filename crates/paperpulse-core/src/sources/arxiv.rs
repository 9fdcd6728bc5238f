//! arXiv export API client.
//!
//! Queries go to the Atom endpoint with an `id_list` and optional
//! `search_query` filter. The server asks for one request every three
//! seconds, so calls wait on a shared rate limiter before being sent.

use super::MetadataSource;
use crate::config::{FetchConfig, NetworkConfig};
use crate::error::{PulseError, Result};
use crate::models::MetadataRecord;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Client for the arXiv query API.
pub struct ArxivClient {
    client: Client,
    api_url: String,
    limiter: DefaultDirectRateLimiter,
}

impl std::fmt::Debug for ArxivClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArxivClient")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl ArxivClient {
    pub fn new() -> Result<Self> {
        Self::with_config(NetworkConfig::ARXIV_API_BASE, FetchConfig::MIN_REQUEST_INTERVAL)
    }

    /// Create a client for a custom endpoint and request spacing.
    pub fn with_config(api_url: impl Into<String>, min_interval: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PulseError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        let quota = Quota::with_period(min_interval).ok_or_else(|| PulseError::Config {
            message: "arXiv request interval must be non-zero".to_string(),
        })?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            limiter: RateLimiter::direct(quota),
        })
    }

    fn query_url(&self, ids: &[String], filter_query: &str) -> String {
        let mut url = format!(
            "{}?id_list={}&start=0&max_results={}",
            self.api_url,
            urlencoding::encode(&ids.join(",")),
            ids.len()
        );
        if !filter_query.is_empty() {
            url.push_str(&format!("&search_query={}", urlencoding::encode(filter_query)));
        }
        url
    }
}

#[async_trait]
impl MetadataSource for ArxivClient {
    async fn fetch_by_ids(
        &self,
        ids: &[String],
        filter_query: &str,
    ) -> Result<Vec<MetadataRecord>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        self.limiter.until_ready().await;

        let start = Instant::now();
        let url = self.query_url(ids, filter_query);
        debug!("arXiv query: {} ids, url length {}", ids.len(), url.len());

        let response = self.client.get(&url).send().await.map_err(|e| PulseError::Network {
            message: format!("arXiv API request failed: {}", e),
            cause: Some(e.to_string()),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Api {
                service: "arXiv".to_string(),
                message: format!("query returned {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| PulseError::Network {
            message: format!("Failed to read arXiv response: {}", e),
            cause: Some(e.to_string()),
        })?;

        let records = parse_feed(&body)?;
        info!(
            "arXiv query returned {} records for {} ids in {:.3?}",
            records.len(),
            ids.len(),
            start.elapsed()
        );
        Ok(records)
    }
}

/// Fields collected while inside one `<entry>`.
#[derive(Default)]
struct EntryBuilder {
    id: Option<String>,
    title: String,
    summary: String,
    authors: Vec<String>,
    tags: Vec<String>,
    published: Option<DateTime<Utc>>,
    updated: Option<DateTime<Utc>>,
    comment: Option<String>,
    pdf_url: Option<String>,
}

impl EntryBuilder {
    fn apply_attributes(&mut self, name: &str, element: &BytesStart<'_>) -> Result<()> {
        match name {
            "category" => {
                if let Some(term) = attribute(element, "term")? {
                    self.tags.push(term);
                }
            }
            "link" => {
                let title = attribute(element, "title")?;
                if title.as_deref() == Some("pdf") {
                    self.pdf_url = attribute(element, "href")?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    fn apply_text(&mut self, name: &str, text: &str) {
        match name {
            "id" => self.id = Some(text.to_string()),
            "title" => self.title = text.to_string(),
            "summary" => self.summary = text.to_string(),
            "name" => self.authors.push(text.to_string()),
            "published" => self.published = parse_timestamp(text),
            "updated" => self.updated = parse_timestamp(text),
            "comment" if !text.is_empty() => self.comment = Some(text.to_string()),
            _ => {}
        }
    }

    fn build(self) -> Option<MetadataRecord> {
        let id = self.id?;
        // The API reports bad ids as a pseudo-entry pointing at its error docs
        if id.contains("/api/errors") {
            warn!("arXiv reported a query error: {}", self.summary);
            return None;
        }
        let (Some(published), Some(updated)) = (self.published, self.updated) else {
            warn!("Skipping arXiv entry {} without timestamps", id);
            return None;
        };

        Some(MetadataRecord {
            id,
            title: self.title,
            authors: self.authors,
            summary: self.summary,
            tags: self.tags,
            published,
            updated,
            comment: self.comment,
            pdf_url: self.pdf_url,
            paper_id: None,
            tweet_count: None,
        })
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

fn local_name(element: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(element.local_name().as_ref()).into_owned()
}

fn attribute(element: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    for attr in element.attributes().flatten() {
        if attr.key.local_name().as_ref() == key.as_bytes() {
            return Ok(Some(attr.unescape_value()?.into_owned()));
        }
    }
    Ok(None)
}

/// Parse an Atom feed from the query API into records, in feed order.
pub fn parse_feed(xml: &str) -> Result<Vec<MetadataRecord>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut records = Vec::new();
    let mut entry: Option<EntryBuilder> = None;
    let mut text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(ref e) => {
                let name = local_name(e);
                if name == "entry" {
                    entry = Some(EntryBuilder::default());
                } else if let Some(builder) = entry.as_mut() {
                    builder.apply_attributes(&name, e)?;
                }
                text.clear();
            }
            Event::Empty(ref e) => {
                if let Some(builder) = entry.as_mut() {
                    builder.apply_attributes(&local_name(e), e)?;
                }
            }
            Event::Text(e) => text.push_str(&e.unescape()?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(&e.into_inner())),
            Event::End(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    if let Some(record) = entry.take().and_then(EntryBuilder::build) {
                        records.push(record);
                    }
                } else if let Some(builder) = entry.as_mut() {
                    builder.apply_text(&name, text.trim());
                }
                text.clear();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom" xmlns:arxiv="http://arxiv.org/schemas/atom">
  <title type="html">ArXiv Query: id_list=1234.5678</title>
  <id>http://arxiv.org/api/abc</id>
  <entry>
    <id>http://arxiv.org/abs/1234.5678v2</id>
    <updated>2020-03-04T10:00:00Z</updated>
    <published>2020-01-02T09:30:00Z</published>
    <title>Attention Is All
  You Need</title>
    <summary>  We propose a new &amp; simple
network architecture.</summary>
    <author><name>Ashish Vaswani</name></author>
    <author><name>Noam Shazeer</name></author>
    <arxiv:comment xmlns:arxiv="http://arxiv.org/schemas/atom">15 pages, 5 figures</arxiv:comment>
    <link href="http://arxiv.org/abs/1234.5678v2" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/1234.5678v2" rel="related" type="application/pdf"/>
    <arxiv:primary_category xmlns:arxiv="http://arxiv.org/schemas/atom" term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.CL" scheme="http://arxiv.org/schemas/atom"/>
    <category term="cs.LG" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2001.00001v1</id>
    <updated>2020-01-01T00:00:00Z</updated>
    <published>2020-01-01T00:00:00Z</published>
    <title>Second</title>
    <summary>Second summary.</summary>
    <author><name>Grace Hopper</name></author>
    <category term="stat.ML" scheme="http://arxiv.org/schemas/atom"/>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_entries_in_order() {
        let records = parse_feed(FEED).unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id, "http://arxiv.org/abs/1234.5678v2");
        assert_eq!(first.authors, vec!["Ashish Vaswani", "Noam Shazeer"]);
        assert_eq!(first.tags, vec!["cs.CL", "cs.LG"]);
        assert_eq!(first.comment.as_deref(), Some("15 pages, 5 figures"));
        assert_eq!(first.pdf_url.as_deref(), Some("http://arxiv.org/pdf/1234.5678v2"));
        assert!(first.title.starts_with("Attention Is All"));
        assert!(first.summary.contains("new & simple"));
        assert_eq!(first.published.to_rfc3339(), "2020-01-02T09:30:00+00:00");

        assert_eq!(records[1].title, "Second");
        assert!(records[1].comment.is_none());
        assert!(records[1].pdf_url.is_none());
    }

    #[test]
    fn test_error_entry_is_skipped() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom">
  <entry>
    <id>http://arxiv.org/api/errors#incorrect_id_format_for_bogus</id>
    <title>Error</title>
    <summary>incorrect id format for bogus</summary>
    <updated>2020-01-01T00:00:00Z</updated>
    <published>2020-01-01T00:00:00Z</published>
  </entry>
</feed>"#;
        assert!(parse_feed(feed).unwrap().is_empty());
    }

    #[test]
    fn test_empty_feed() {
        let feed = r#"<feed xmlns="http://www.w3.org/2005/Atom"><title>none</title></feed>"#;
        assert!(parse_feed(feed).unwrap().is_empty());
    }

    #[test]
    fn test_query_url_encodes_filter() {
        let client = ArxivClient::with_config("http://localhost/api/query", Duration::from_millis(1))
            .unwrap();
        let ids = vec!["1234.5678".to_string(), "2001.00001".to_string()];
        let url = client.query_url(&ids, "cat:cs.CV OR cat:cs.AI");
        assert!(url.contains("id_list=1234.5678%2C2001.00001"));
        assert!(url.contains("max_results=2"));
        assert!(url.contains("search_query=cat%3Acs.CV%20OR%20cat%3Acs.AI"));

        let url = client.query_url(&ids, "");
        assert!(!url.contains("search_query"));
    }
}
