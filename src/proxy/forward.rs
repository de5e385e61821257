//! Buffered forwarding: one upstream round trip, relayed as a complete response.

use axum::{body::Body, response::IntoResponse, response::Response};

use super::server::AppState;
use super::upstream::{relay_headers, ForwardRequest};
use crate::error::{Error, Result};

/// Forward `request` upstream and relay the complete response.
///
/// Upstream failures become JSON error responses (502, 504 or 500); they are
/// never retried.
pub async fn forward_buffered(state: &AppState, request: ForwardRequest) -> Response {
    match round_trip(state, &request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(
                error = %e,
                kind = e.kind(),
                method = %request.method,
                upstream = %request.target,
                "Upstream request failed"
            );
            e.into_response()
        }
    }
}

async fn round_trip(state: &AppState, request: &ForwardRequest) -> Result<Response> {
    let base = state.config.upstream_base();

    let upstream = request
        .build(&state.buffered_client)
        .send()
        .await
        .map_err(|e| Error::from_upstream(e, base))?;

    let status = upstream.status();
    tracing::info!(
        status = status.as_u16(),
        method = %request.method,
        uri = %request.uri,
        "Response"
    );

    let headers = relay_headers(upstream.headers());
    let body = upstream
        .bytes()
        .await
        .map_err(|e| Error::from_upstream(e, base))?;

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}
