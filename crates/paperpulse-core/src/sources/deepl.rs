//! DeepL translation client and per-user credential lookup.

use super::{TranslationRequest, Translator};
use crate::config::{env_value, EnvKeys, NetworkConfig};
use crate::error::{PulseError, Result};
use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Instant;
use tracing::{debug, info};

/// Chat user ids: `U` or `W` followed by 2-10 uppercase alphanumerics.
static USER_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[UW][A-Z0-9]{2,10}$").expect("user id regex must compile"));

/// Check whether `user_id` is shaped like a chat user id.
pub fn is_valid_user_id(user_id: &str) -> bool {
    USER_ID.is_match(user_id)
}

/// Default and per-user DeepL auth keys.
#[derive(Clone, Default)]
pub struct DeeplCredentials {
    default_key: Option<String>,
    user_keys: HashMap<String, String>,
}

impl std::fmt::Debug for DeeplCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeeplCredentials")
            .field("has_default_key", &self.default_key.is_some())
            .field("user_key_count", &self.user_keys.len())
            .finish()
    }
}

impl DeeplCredentials {
    pub fn new(default_key: Option<String>) -> Self {
        Self {
            default_key,
            user_keys: HashMap::new(),
        }
    }

    /// Register a key for one user. Invalid user ids are ignored.
    pub fn with_user_key(mut self, user_id: impl Into<String>, key: impl Into<String>) -> Self {
        let user_id = user_id.into();
        if is_valid_user_id(&user_id) {
            self.user_keys.insert(user_id, key.into());
        }
        self
    }

    /// Load `DEEPL_AUTH_KEY` and every `DEEPL_AUTH_KEY_<USER_ID>` from the environment.
    pub fn from_env() -> Self {
        let mut credentials = Self::new(env_value(EnvKeys::DEEPL_AUTH_KEY));
        for (name, _) in std::env::vars() {
            if let Some(user_id) = name.strip_prefix(EnvKeys::DEEPL_AUTH_KEY_USER_PREFIX) {
                if let Some(key) = env_value(&name) {
                    credentials = credentials.with_user_key(user_id, key);
                }
            }
        }
        credentials
    }

    /// Key to use for `user`: the user's own key if registered, else the default.
    pub fn key_for(&self, user: Option<&str>) -> Option<&str> {
        user.filter(|id| is_valid_user_id(id))
            .and_then(|id| self.user_keys.get(id))
            .or(self.default_key.as_ref())
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.default_key.is_none() && self.user_keys.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TranslateResponse {
    #[serde(default)]
    translations: Vec<Translation>,
}

#[derive(Debug, Deserialize)]
struct Translation {
    text: String,
}

/// Translator backed by the DeepL v2 API.
pub struct DeeplTranslator {
    client: Client,
    api_url: String,
    credentials: DeeplCredentials,
}

impl std::fmt::Debug for DeeplTranslator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeeplTranslator")
            .field("api_url", &self.api_url)
            .field("credentials", &self.credentials)
            .finish()
    }
}

impl DeeplTranslator {
    pub fn new(credentials: DeeplCredentials) -> Result<Self> {
        Self::with_api_url(credentials, NetworkConfig::DEEPL_API_URL)
    }

    pub fn with_api_url(credentials: DeeplCredentials, api_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(NetworkConfig::REQUEST_TIMEOUT)
            .user_agent(NetworkConfig::USER_AGENT)
            .build()
            .map_err(|e| PulseError::Network {
                message: format!("Failed to create HTTP client: {}", e),
                cause: None,
            })?;

        Ok(Self {
            client,
            api_url: api_url.into(),
            credentials,
        })
    }
}

#[async_trait]
impl Translator for DeeplTranslator {
    async fn translate(&self, request: &TranslationRequest<'_>) -> Result<String> {
        let auth_key = self
            .credentials
            .key_for(request.user)
            .ok_or_else(|| PulseError::Config {
                message: "No DeepL auth key configured".to_string(),
            })?;

        let start = Instant::now();
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("DeepL-Auth-Key {}", auth_key))
            .form(&[("text", request.text), ("target_lang", request.target_lang)])
            .send()
            .await
            .map_err(|e| PulseError::Network {
                message: format!("DeepL request failed: {}", e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!("DeepL error body: {}", body);
            return Err(PulseError::Api {
                service: "DeepL".to_string(),
                message: format!("translate returned {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body: TranslateResponse = response.json().await.map_err(|e| PulseError::Json {
            message: format!("Failed to parse DeepL response: {}", e),
            source: None,
        })?;

        let text = body
            .translations
            .into_iter()
            .next()
            .map(|t| t.text)
            .ok_or_else(|| PulseError::Api {
                service: "DeepL".to_string(),
                message: "response contained no translations".to_string(),
                status_code: None,
            })?;

        info!("DeepL translation took {:.3?}", start.elapsed());
        Ok(text)
    }
}
