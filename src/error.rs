//! Error types for streamrelay.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Result type alias for streamrelay operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for streamrelay.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Unable to connect to upstream server at {target}")]
    Connection { target: String },

    #[error("Request to upstream server at {target} timed out")]
    Timeout { target: String },

    #[error("{0}")]
    Proxy(String),

    #[error("{0}")]
    Stream(String),
}

impl Error {
    /// Classify a failed upstream call.
    ///
    /// Connection failures win over timeouts: a connect timeout reports both
    /// and is an unreachable upstream, not a slow one.
    pub fn from_upstream(err: reqwest::Error, target: &str) -> Self {
        if err.is_connect() {
            Error::Connection {
                target: target.to_string(),
            }
        } else if err.is_timeout() {
            Error::Timeout {
                target: target.to_string(),
            }
        } else {
            Error::Proxy(err.to_string())
        }
    }

    /// Short machine-readable kind reported in the `error` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "Configuration error",
            Error::Connection { .. } => "Connection error",
            Error::Timeout { .. } => "Timeout error",
            Error::Proxy(_) => "Proxy error",
            Error::Stream(_) => "Streaming error",
        }
    }

    /// HTTP status used when the error is reported as a whole response.
    pub fn status(&self) -> StatusCode {
        match self {
            Error::Connection { .. } => StatusCode::BAD_GATEWAY,
            Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
            Error::Config(_) | Error::Proxy(_) | Error::Stream(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The `{"error", "message"}` body shared by both reporting styles.
    pub fn body(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.kind(),
            "message": self.to_string(),
        })
    }

    /// Render as a single server-sent event for a stream that is already open.
    pub fn to_sse_event(&self) -> Bytes {
        Bytes::from(format!("data: {}\n\n", self.body()))
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (self.status(), axum::Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let conn = Error::Connection {
            target: "http://localhost:9997".to_string(),
        };
        assert_eq!(conn.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(conn.kind(), "Connection error");

        let timeout = Error::Timeout {
            target: "http://localhost:9997".to_string(),
        };
        assert_eq!(timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(timeout.kind(), "Timeout error");

        let other = Error::Proxy("boom".to_string());
        assert_eq!(other.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(other.kind(), "Proxy error");
    }

    #[test]
    fn test_body_names_target() {
        let err = Error::Connection {
            target: "http://gpu-box:9997".to_string(),
        };
        let body = err.body();
        assert_eq!(body["error"], "Connection error");
        assert_eq!(
            body["message"],
            "Unable to connect to upstream server at http://gpu-box:9997"
        );
    }

    #[test]
    fn test_sse_event_format() {
        let event = Error::Stream("connection reset".to_string()).to_sse_event();
        let text = std::str::from_utf8(&event).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));

        let payload: serde_json::Value =
            serde_json::from_str(text.trim_start_matches("data: ").trim_end()).unwrap();
        assert_eq!(payload["error"], "Streaming error");
        assert_eq!(payload["message"], "connection reset");
    }

    #[tokio::test]
    async fn test_into_response_is_json() {
        let response = Error::Timeout {
            target: "http://localhost:9997".to_string(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(json["error"], "Timeout error");
    }
}
