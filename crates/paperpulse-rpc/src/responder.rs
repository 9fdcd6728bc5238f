//! Delivery of follow-up replies.

use async_trait::async_trait;
use paperpulse_core::{PulseError, Reply, Responder};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};

const REPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each reply as JSON `{text, thread_ts}` to a fixed URL.
pub struct WebhookResponder {
    client: Client,
    url: String,
}

impl WebhookResponder {
    pub fn new(url: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(REPLY_TIMEOUT).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Responder for WebhookResponder {
    async fn say(&self, reply: Reply) -> paperpulse_core::Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&reply)
            .send()
            .await
            .map_err(|e| PulseError::Network {
                message: format!("Reply webhook request failed: {}", e),
                cause: Some(e.to_string()),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(PulseError::Api {
                service: "reply webhook".to_string(),
                message: format!("returned {}", status),
                status_code: Some(status.as_u16()),
            });
        }
        debug!("Delivered reply to thread {}", reply.thread_ts);
        Ok(())
    }
}

/// Writes replies to the log; used when no webhook is configured.
pub struct LogResponder;

#[async_trait]
impl Responder for LogResponder {
    async fn say(&self, reply: Reply) -> paperpulse_core::Result<()> {
        info!("Reply in thread {}:\n{}", reply.thread_ts, reply.text);
        Ok(())
    }
}
