//! Streaming detection for inbound requests.
//!
//! A request is proxied in streaming mode when the caller asks for an event
//! stream in `Accept`, passes a truthy `stream` query parameter, or sends a
//! JSON object body whose `stream` member is truthy. None of these checks can
//! fail the request: anything unparseable counts as "not present".

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use serde_json::{Map, Value};

/// `Accept` media types that imply an incrementally delivered response.
const STREAMING_MEDIA_TYPES: [&str; 2] = ["text/event-stream", "application/x-ndjson"];

/// Query parameter values (lowercased) that request streaming.
const TRUTHY_QUERY_VALUES: [&str; 3] = ["true", "1", "yes"];

/// Decide whether a request should be proxied as a stream.
pub fn is_streaming_request(headers: &HeaderMap, uri: &Uri, body: &[u8]) -> bool {
    accepts_stream(headers) || query_requests_stream(uri) || body_requests_stream(body)
}

/// Whether any `Accept` header names a streaming media type.
fn accepts_stream(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::ACCEPT)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|accept| STREAMING_MEDIA_TYPES.iter().any(|t| accept.contains(t)))
}

/// Whether the first `stream` query parameter is `true`, `1` or `yes`.
fn query_requests_stream(uri: &Uri) -> bool {
    if uri.query().is_none() {
        return false;
    }

    let Ok(Query(pairs)) = Query::<Vec<(String, String)>>::try_from_uri(uri) else {
        return false;
    };

    pairs
        .into_iter()
        .find(|(key, _)| key == "stream")
        .map(|(_, value)| TRUTHY_QUERY_VALUES.contains(&value.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Whether the body is a JSON object with a truthy `stream` member.
fn body_requests_stream(body: &[u8]) -> bool {
    if body.is_empty() {
        return false;
    }

    match serde_json::from_slice::<Map<String, Value>>(body) {
        Ok(object) => object.get("stream").is_some_and(is_truthy),
        Err(e) => {
            tracing::trace!(error = %e, "Body is not a JSON object; ignoring for stream detection");
            false
        }
    }
}

/// Loose truthiness: empty, zero, `false` and `null` values are false.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
