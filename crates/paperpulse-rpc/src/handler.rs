//! HTTP request handlers.

use crate::server::AppState;
use axum::{extract::State, http::HeaderMap, response::IntoResponse, Json};
use paperpulse_core::MessageEvent;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};

const RETRY_NUM_HEADER: &str = "x-slack-retry-num";
const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";

/// Body of an events callback.
#[derive(Debug, Deserialize)]
pub struct EventEnvelope {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Set on endpoint verification requests.
    #[serde(default)]
    pub challenge: Option<String>,
    #[serde(default)]
    pub event: Option<MessageEvent>,
}

/// Root endpoint.
pub async fn handle_root() -> &'static str {
    "hello"
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Log redelivery of an event whose first delivery was not acknowledged in time.
fn log_retry(headers: &HeaderMap) {
    let Some(num) = headers.get(RETRY_NUM_HEADER).and_then(|v| v.to_str().ok()) else {
        return;
    };
    let reason = headers
        .get(RETRY_REASON_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown");
    if reason == "http_timeout" {
        warn!("Retry #{} after ack timeout; previous delivery may still be running", num);
    } else {
        info!("Retry #{} of event delivery ({})", num, reason);
    }
}

/// Events endpoint: acknowledge immediately, answer in the background.
pub async fn handle_events(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(envelope): Json<EventEnvelope>,
) -> impl IntoResponse {
    log_retry(&headers);

    if envelope.kind.as_deref() == Some("url_verification") {
        return Json(json!({ "challenge": envelope.challenge.unwrap_or_default() }));
    }

    let Some(event) = envelope.event else {
        debug!("Event callback without an event body");
        return Json(json!({}));
    };

    match state.pipeline.handle(event, Arc::clone(&state.responder)) {
        Some(dispatch) => {
            tokio::spawn(dispatch.job);
            Json(json!(dispatch.ack))
        }
        None => Json(json!({})),
    }
}
