//! Twitter v1.1 standard search client.
//!
//! Pages are walked with `max_id`: the cursor for the next page is one
//! below the smallest status id seen on the current page.

use super::{SearchPage, SearchRequest, SearchSource};
use crate::config::{env_value, EnvKeys, NetworkConfig};
use crate::error::{PulseError, Result};
use crate::models::Post;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Credentials for app-only access.
#[derive(Clone)]
pub enum TwitterCredentials {
    /// Pre-issued bearer token.
    Bearer(String),
    /// Consumer key pair, exchanged for a bearer token on first use.
    App { api_key: String, api_secret: String },
}

impl std::fmt::Debug for TwitterCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TwitterCredentials::Bearer(_) => f.write_str("Bearer(<redacted>)"),
            TwitterCredentials::App { .. } => f.write_str("App(<redacted>)"),
        }
    }
}

impl TwitterCredentials {
    /// Resolve credentials from the environment.
    ///
    /// A bearer token takes precedence over a key pair.
    pub fn from_env() -> Option<Self> {
        if let Some(token) = env_value(EnvKeys::TWITTER_BEARER_TOKEN) {
            return Some(TwitterCredentials::Bearer(token));
        }
        match (
            env_value(EnvKeys::TWITTER_API_KEY),
            env_value(EnvKeys::TWITTER_API_SECRET_KEY),
        ) {
            (Some(api_key), Some(api_secret)) => Some(TwitterCredentials::App {
                api_key,
                api_secret,
            }),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    statuses: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Search client for recent posts.
pub struct TwitterSearch {
    client: Client,
    api_base: String,
    credentials: TwitterCredentials,
    /// Bearer token, resolved lazily for app credentials.
    bearer: RwLock<Option<String>>,
}

impl std::fmt::Debug for TwitterSearch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterSearch")
            .field("api_base", &self.api_base)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl TwitterSearch {
    pub fn new(credentials: TwitterCredentials) -> Result<Self> {
        Self::with_base_url(credentials, NetworkConfig::TWITTER_API_BASE)
    }

    pub fn with_base_url(credentials: TwitterCredentials, api_base: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PulseError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        let bearer = match &credentials {
            TwitterCredentials::Bearer(token) => Some(token.clone()),
            TwitterCredentials::App { .. } => None,
        };

        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            credentials,
            bearer: RwLock::new(bearer),
        })
    }

    async fn bearer_token(&self) -> Result<String> {
        if let Some(token) = self.bearer.read().await.as_ref() {
            return Ok(token.clone());
        }

        let TwitterCredentials::App {
            api_key,
            api_secret,
        } = &self.credentials
        else {
            return Err(PulseError::Config {
                message: "Twitter bearer token missing".to_string(),
            });
        };

        let response = self
            .client
            .post(format!("{}/oauth2/token", self.api_base))
            .basic_auth(api_key, Some(api_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| PulseError::Network {
                message: format!("Twitter token request failed: {}", e),
                cause: Some(e.to_string()),
            })?;

        if !response.status().is_success() {
            return Err(PulseError::Api {
                service: "Twitter".to_string(),
                message: format!("token endpoint returned {}", response.status()),
                status_code: Some(response.status().as_u16()),
            });
        }

        let token: TokenResponse = response.json().await.map_err(|e| PulseError::Json {
            message: format!("Failed to parse Twitter token response: {}", e),
            source: None,
        })?;

        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(PulseError::Api {
                service: "Twitter".to_string(),
                message: format!("unexpected token type '{}'", token.token_type),
                status_code: None,
            });
        }

        info!("Obtained Twitter app bearer token");
        *self.bearer.write().await = Some(token.access_token.clone());
        Ok(token.access_token)
    }
}

/// Convert raw statuses into posts and compute the next `max_id` cursor.
fn page_from_statuses(statuses: Vec<Value>) -> SearchPage {
    let min_id = statuses
        .iter()
        .filter_map(|s| s.get("id").and_then(Value::as_u64))
        .min();

    let posts = statuses
        .into_iter()
        .map(|status| {
            let id = status
                .get("id_str")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_default();
            // Whole status JSON, so expanded URLs in entities are scanned too
            Post {
                id,
                text: status.to_string(),
            }
        })
        .collect();

    SearchPage {
        posts,
        next_cursor: min_id.and_then(|id| id.checked_sub(1)).map(|id| id.to_string()),
    }
}

#[async_trait]
impl SearchSource for TwitterSearch {
    async fn search_page(
        &self,
        request: &SearchRequest,
        cursor: Option<&str>,
    ) -> Result<SearchPage> {
        let token = self.bearer_token().await?;

        let mut url = format!(
            "{}/1.1/search/tweets.json?q={}&count={}&result_type={}&tweet_mode=extended",
            self.api_base,
            urlencoding::encode(&request.query),
            request.page_size,
            urlencoding::encode(&request.result_type)
        );
        if let Some(max_id) = cursor {
            url.push_str(&format!("&max_id={}", urlencoding::encode(max_id)));
        }

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| PulseError::Network {
                message: format!("Twitter search request failed: {}", e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            let reset = response
                .headers()
                .get("x-rate-limit-reset")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<i64>().ok())
                .map(|reset| (reset - chrono::Utc::now().timestamp()).max(0) as u64);
            return Err(PulseError::RateLimited {
                service: "Twitter".to_string(),
                retry_after_secs: reset,
            });
        }

        if !status.is_success() {
            return Err(PulseError::Api {
                service: "Twitter".to_string(),
                message: format!("search returned {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body: SearchResponse = response.json().await.map_err(|e| PulseError::Json {
            message: format!("Failed to parse Twitter search response: {}", e),
            source: None,
        })?;

        let page = page_from_statuses(body.statuses);
        debug!(
            "Twitter search page: {} posts, next cursor {:?}",
            page.posts.len(),
            page.next_cursor
        );
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_page_cursor_is_below_smallest_id() {
        let statuses = vec![
            json!({"id": 105, "id_str": "105", "full_text": "a"}),
            json!({"id": 101, "id_str": "101", "full_text": "b"}),
            json!({"id": 103, "id_str": "103", "full_text": "c"}),
        ];
        let page = page_from_statuses(statuses);
        assert_eq!(page.posts.len(), 3);
        assert_eq!(page.posts[0].id, "105");
        assert_eq!(page.next_cursor.as_deref(), Some("100"));
    }

    #[test]
    fn test_empty_page_has_no_cursor() {
        let page = page_from_statuses(Vec::new());
        assert!(page.posts.is_empty());
        assert!(page.next_cursor.is_none());
    }

    #[test]
    fn test_post_text_includes_expanded_urls() {
        let statuses = vec![json!({
            "id": 7,
            "id_str": "7",
            "full_text": "nice paper https://t.co/abc",
            "entities": {"urls": [{"expanded_url": "https://arxiv.org/abs/2101.00001v2"}]}
        })];
        let page = page_from_statuses(statuses);
        let ids = crate::identifier::extract_all_identifiers(&page.posts[0].text);
        assert_eq!(ids.len(), 1);
        assert_eq!(ids.iter().next().unwrap().as_str(), "2101.00001");
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = TwitterCredentials::Bearer("secret-token".to_string());
        assert!(!format!("{:?}", creds).contains("secret-token"));
    }
}
