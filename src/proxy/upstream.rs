//! Upstream URL construction and hop-by-hop header filtering.

use axum::http::{header, HeaderMap, HeaderName, Method, Uri};
use bytes::Bytes;
use std::fmt;

/// Request headers that only describe the caller-to-proxy leg.
static REQUEST_HOP_HEADERS: [HeaderName; 3] =
    [header::HOST, header::CONNECTION, header::TRANSFER_ENCODING];

/// Response headers dropped because the proxy re-frames the body itself.
static RESPONSE_HOP_HEADERS: [HeaderName; 4] = [
    header::CONTENT_ENCODING,
    header::CONTENT_LENGTH,
    header::TRANSFER_ENCODING,
    header::CONNECTION,
];

/// Fully resolved upstream URL for one request.
///
/// The query string is appended exactly as received so that percent-encoding
/// and parameter order survive the hop unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamTarget(String);

impl UpstreamTarget {
    /// Join `base`, the request path and the raw query string.
    pub fn new(base: &str, uri: &Uri) -> Self {
        let base = base.trim_end_matches('/');
        let path = uri.path();
        let path = path.strip_prefix('/').unwrap_or(path);

        let mut url = format!("{}/{}", base, path);
        if let Some(query) = uri.query().filter(|q| !q.is_empty()) {
            url.push('?');
            url.push_str(query);
        }
        Self(url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UpstreamTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One inbound request, prepared for the upstream hop.
#[derive(Debug, Clone)]
pub struct ForwardRequest {
    pub method: Method,
    /// Path and query as received, kept for logging.
    pub uri: Uri,
    pub target: UpstreamTarget,
    /// Inbound headers with hop-by-hop headers removed.
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ForwardRequest {
    pub fn new(base: &str, method: Method, uri: Uri, headers: &HeaderMap, body: Bytes) -> Self {
        let target = UpstreamTarget::new(base, &uri);
        Self {
            method,
            uri,
            target,
            headers: forward_headers(headers),
            body,
        }
    }

    /// Build the upstream call on `client`, preserving method, headers and body.
    pub fn build(&self, client: &reqwest::Client) -> reqwest::RequestBuilder {
        client
            .request(self.method.clone(), self.target.as_str())
            .headers(self.headers.clone())
            .body(self.body.clone())
    }
}

/// Copy inbound headers for the upstream call, minus hop-by-hop headers.
pub fn forward_headers(inbound: &HeaderMap) -> HeaderMap {
    strip_headers(inbound, &REQUEST_HOP_HEADERS)
}

/// Copy upstream response headers for the caller, minus framing headers.
pub fn relay_headers(upstream: &HeaderMap) -> HeaderMap {
    strip_headers(upstream, &RESPONSE_HOP_HEADERS)
}

fn strip_headers(source: &HeaderMap, excluded: &[HeaderName]) -> HeaderMap {
    let mut headers = HeaderMap::with_capacity(source.len());
    for (name, value) in source {
        if !excluded.contains(name) {
            headers.append(name.clone(), value.clone());
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn target(base: &str, uri: &str) -> String {
        UpstreamTarget::new(base, &uri.parse().unwrap())
            .as_str()
            .to_string()
    }

    #[test]
    fn test_target_joins_path() {
        assert_eq!(
            target("http://localhost:9997", "/v1/chat/completions"),
            "http://localhost:9997/v1/chat/completions"
        );
    }

    #[test]
    fn test_target_root_path() {
        assert_eq!(target("http://localhost:9997", "/"), "http://localhost:9997/");
    }

    #[test]
    fn test_target_trims_base_slash() {
        assert_eq!(
            target("http://localhost:9997/", "/health/deep"),
            "http://localhost:9997/health/deep"
        );
    }

    #[test]
    fn test_target_keeps_base_path_prefix() {
        assert_eq!(
            target("http://gpu-box:8000/llm", "/completion"),
            "http://gpu-box:8000/llm/completion"
        );
    }

    #[test]
    fn test_target_query_verbatim() {
        assert_eq!(
            target("http://localhost:9997", "/search?q=a%20b&q=c+d&stream=1"),
            "http://localhost:9997/search?q=a%20b&q=c+d&stream=1"
        );
    }

    #[test]
    fn test_target_empty_query_dropped() {
        assert_eq!(
            target("http://localhost:9997", "/props?"),
            "http://localhost:9997/props"
        );
    }

    #[test]
    fn test_forward_headers_strip_hop_by_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local:8080"));
        inbound.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        inbound.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        inbound.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        inbound.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));

        let forwarded = forward_headers(&inbound);
        assert!(forwarded.get(header::HOST).is_none());
        assert!(forwarded.get(header::CONNECTION).is_none());
        assert!(forwarded.get(header::TRANSFER_ENCODING).is_none());
        assert_eq!(forwarded.get(header::CONTENT_TYPE).unwrap(), "application/json");
        assert_eq!(forwarded.get(header::AUTHORIZATION).unwrap(), "Bearer abc");
    }

    #[test]
    fn test_forward_headers_keep_repeated_values() {
        let mut inbound = HeaderMap::new();
        inbound.append("x-tag", HeaderValue::from_static("a"));
        inbound.append("x-tag", HeaderValue::from_static("b"));

        let forwarded = forward_headers(&inbound);
        let values: Vec<_> = forwarded.get_all("x-tag").iter().collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn test_forward_request_prepares_hop() {
        let mut inbound = HeaderMap::new();
        inbound.insert(header::HOST, HeaderValue::from_static("proxy.local"));
        inbound.insert("x-custom", HeaderValue::from_static("kept"));

        let request = ForwardRequest::new(
            "http://localhost:9997",
            Method::POST,
            "/completion?n=1".parse().unwrap(),
            &inbound,
            Bytes::from_static(b"{}"),
        );
        assert_eq!(request.target.as_str(), "http://localhost:9997/completion?n=1");
        assert!(request.headers.get(header::HOST).is_none());
        assert_eq!(request.headers.get("x-custom").unwrap(), "kept");

        let built = request.build(&reqwest::Client::new()).build().unwrap();
        assert_eq!(built.method(), Method::POST);
        assert_eq!(built.url().as_str(), "http://localhost:9997/completion?n=1");
        assert_eq!(built.body().and_then(|b| b.as_bytes()), Some(&b"{}"[..]));
    }

    #[test]
    fn test_relay_headers_strip_framing() {
        let mut upstream = HeaderMap::new();
        upstream.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
        upstream.insert(header::CONTENT_LENGTH, HeaderValue::from_static("5"));
        upstream.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        upstream.insert(header::CONNECTION, HeaderValue::from_static("close"));
        upstream.insert("x-test", HeaderValue::from_static("1"));
        upstream.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let relayed = relay_headers(&upstream);
        assert_eq!(relayed.len(), 2);
        assert_eq!(relayed.get("x-test").unwrap(), "1");
        assert_eq!(relayed.get(header::CONTENT_TYPE).unwrap(), "text/plain");
    }
}
