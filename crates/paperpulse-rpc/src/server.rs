//! HTTP server implementation using Axum.

use crate::handler::{handle_events, handle_health, handle_root};
use axum::{
    routing::{get, post},
    Router,
};
use paperpulse_core::{Pipeline, Responder};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Application state shared across handlers.
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    /// Where follow-up replies go
    pub responder: Arc<dyn Responder>,
}

/// Build the router with all routes.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(handle_root))
        .route("/health", get(handle_health))
        .route("/events", post(handle_events))
        .route("/slack/events", post(handle_events))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server.
///
/// Returns the actual address the server is bound to (useful when port=0).
pub async fn start_server(state: AppState, host: &str, port: u16) -> anyhow::Result<SocketAddr> {
    let app = router(Arc::new(state));

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!("Server listening on {}", actual_addr);

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Server error: {}", e);
        }
    });

    Ok(actual_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use paperpulse_core::sources::{SearchPage, SearchRequest};
    use paperpulse_core::{
        MemoryCache, MetadataRecord, MetadataSource, Reply, Result, SearchSource,
    };
    use serde_json::{json, Value};
    use std::sync::Mutex;
    use std::time::Duration;
    use tower::ServiceExt;

    struct NoPosts;

    #[async_trait]
    impl SearchSource for NoPosts {
        async fn search_page(&self, _: &SearchRequest, _: Option<&str>) -> Result<SearchPage> {
            Ok(SearchPage::default())
        }
    }

    struct NoRecords;

    #[async_trait]
    impl MetadataSource for NoRecords {
        async fn fetch_by_ids(&self, _: &[String], _: &str) -> Result<Vec<MetadataRecord>> {
            Ok(Vec::new())
        }
    }

    #[derive(Default)]
    struct Collect(Mutex<Vec<Reply>>);

    #[async_trait]
    impl Responder for Collect {
        async fn say(&self, reply: Reply) -> Result<()> {
            self.0.lock().unwrap().push(reply);
            Ok(())
        }
    }

    fn test_pipeline() -> Arc<Pipeline> {
        let pipeline = Pipeline::builder(Arc::new(NoPosts), Arc::new(NoRecords))
            .with_cache_backend(Arc::new(MemoryCache::new()))
            .build()
            .unwrap();
        Arc::new(pipeline)
    }

    fn test_state(responder: Arc<Collect>) -> Arc<AppState> {
        Arc::new(AppState {
            pipeline: test_pipeline(),
            responder,
        })
    }

    async fn post_event(app: Router, body: Value, retry: bool) -> (StatusCode, Value) {
        post_event_to(app, "/events", body, retry).await
    }

    async fn post_event_to(
        app: Router,
        path: &str,
        body: Value,
        retry: bool,
    ) -> (StatusCode, Value) {
        let mut request = Request::post(path).header("content-type", "application/json");
        if retry {
            request = request
                .header("x-slack-retry-num", "1")
                .header("x-slack-retry-reason", "http_timeout");
        }
        let response = app
            .oneshot(request.body(Body::from(body.to_string())).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn wait_for_replies(responder: &Collect, count: usize) -> Vec<Reply> {
        for _ in 0..100 {
            let replies = responder.0.lock().unwrap().clone();
            if replies.len() >= count {
                return replies;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        responder.0.lock().unwrap().clone()
    }

    #[tokio::test]
    async fn test_root_and_health() {
        let app = router(test_state(Arc::new(Collect::default())));

        let response = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"hello");

        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_url_verification_echoes_challenge() {
        let app = router(test_state(Arc::new(Collect::default())));
        let (status, body) = post_event(
            app,
            json!({"type": "url_verification", "challenge": "abc123"}),
            false,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["challenge"], "abc123");
    }

    #[tokio::test]
    async fn test_event_acked_then_answered() {
        let responder = Arc::new(Collect::default());
        let app = router(test_state(responder.clone()));
        let event = json!({
            "type": "event_callback",
            "event": {"user": "U024BE7LH", "text": "top5", "ts": "42.0001"}
        });

        let (status, ack) = post_event(app, event, true).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["text"], "Processing top5 message.");
        assert_eq!(ack["thread_ts"], "42.0001");

        let replies = wait_for_replies(&responder, 1).await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].text, "No twitter result found");
        assert_eq!(replies[0].thread_ts, "42.0001");
    }

    #[tokio::test]
    async fn test_slack_events_path_is_served() {
        let responder = Arc::new(Collect::default());
        let app = router(test_state(responder.clone()));
        let event = json!({
            "event": {"user": "U024BE7LH", "text": "top5", "ts": "7.0"}
        });

        let (status, ack) = post_event_to(app, "/slack/events", event, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack["text"], "Processing top5 message.");

        let replies = wait_for_replies(&responder, 1).await;
        assert_eq!(replies[0].thread_ts, "7.0");
    }

    #[tokio::test]
    async fn test_bot_event_gets_empty_ack() {
        let responder = Arc::new(Collect::default());
        let app = router(test_state(responder.clone()));
        let event = json!({
            "event": {"user": "U024BE7LH", "bot_id": "B1", "text": "top5", "ts": "1.0"}
        });

        let (status, ack) = post_event(app, event, false).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(ack, json!({}));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(responder.0.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_starts() {
        let state = AppState {
            pipeline: test_pipeline(),
            responder: Arc::new(Collect::default()),
        };
        let addr = start_server(state, "127.0.0.1", 0).await.unwrap();
        assert!(addr.port() > 0);
    }
}
