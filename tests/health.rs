//! Integration tests for the /health endpoint.
//!
//! Verifies that GET /health is answered locally (the upstream is never
//! contacted) and reports the configured target.

use axum::body::Body;
use http::Request;
use tower::ServiceExt;

use streamrelay::config::Config;
use streamrelay::proxy::{create_router, AppState};

fn setup_app(upstream: &str) -> axum::Router {
    let mut config = Config::default();
    config.upstream.url = upstream.to_string();
    create_router(AppState::new(config).expect("build http clients"))
}

async fn parse_body(response: axum::response::Response) -> (http::StatusCode, serde_json::Value) {
    let status = response.status();
    let body_bytes = axum::body::to_bytes(response.into_body(), 1_048_576)
        .await
        .expect("read body");
    let json: serde_json::Value = serde_json::from_slice(&body_bytes).unwrap_or_default();
    (status, json)
}

#[tokio::test]
async fn test_health_reports_target() {
    // Nothing listens here; /health must not depend on the upstream.
    let app = setup_app("http://127.0.0.1:9");

    let request = Request::get("/health").body(Body::empty()).unwrap();
    let response = app.oneshot(request).await.unwrap();
    let (status, json) = parse_body(response).await;

    assert_eq!(status, http::StatusCode::OK);
    assert_eq!(json["status"], "running");
    assert_eq!(json["target"], "http://127.0.0.1:9");

    let timestamp = json["timestamp"].as_str().expect("timestamp string");
    assert!(
        chrono::DateTime::parse_from_rfc3339(timestamp).is_ok(),
        "timestamp should be RFC 3339: {}",
        timestamp
    );
}

#[tokio::test]
async fn test_unsupported_method_rejected() {
    let app = setup_app("http://127.0.0.1:9");

    let request = Request::builder()
        .method("OPTIONS")
        .uri("/v1/models")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), http::StatusCode::METHOD_NOT_ALLOWED);
}
