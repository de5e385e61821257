//! HTTP request handlers.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
    Json,
};

use super::classify::is_streaming_request;
use super::forward::forward_buffered;
use super::server::AppState;
use super::stream::forward_streaming;
use super::upstream::ForwardRequest;

/// Handle any proxied method on any path other than `/health`.
pub async fn proxy(
    State(state): State<AppState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let streaming = is_streaming_request(&headers, &uri, &body);
    let request = ForwardRequest::new(state.config.upstream_base(), method, uri, &headers, body);

    tracing::info!(
        method = %request.method,
        uri = %request.uri,
        upstream = %request.target,
        streaming,
        "Proxying request"
    );

    if streaming {
        forward_streaming(&state, request).await
    } else {
        forward_buffered(&state, request).await
    }
}

/// Handle GET /health
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "running",
        "target": state.config.upstream.url,
        "timestamp": chrono::Local::now().to_rfc3339(),
    }))
}
