//! Streaming forwarding.
//!
//! The upstream response head is relayed as soon as it arrives; the body is
//! relayed through [`RelayStream`], which hands each upstream read to the
//! server in bounded chunks without accumulating the body. The relay is
//! pull-driven, so when the caller goes away hyper drops it together with the
//! upstream response and the upstream connection closes.

use std::pin::Pin;
use std::task::{ready, Context, Poll};

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
};
use bytes::Bytes;
use futures::Stream;

use super::server::AppState;
use super::upstream::{relay_headers, ForwardRequest};
use crate::error::Error;

/// Where a relayed stream is in its lifecycle.
///
/// A stream starts in `HeadersSent` because it only exists once the upstream
/// response head has been relayed. Setup failures never create one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    HeadersSent,
    Streaming,
    Completed,
    ErrorClosed,
}

impl StreamPhase {
    fn is_terminal(self) -> bool {
        matches!(self, StreamPhase::Completed | StreamPhase::ErrorClosed)
    }
}

/// Relays an upstream byte stream as chunks of at most `chunk_size` bytes.
///
/// An optional prefix is emitted first. An upstream read error is logged and
/// turned into one final server-sent error event, after which the stream ends.
pub struct RelayStream<S> {
    upstream: S,
    prefix: Option<Bytes>,
    pending: Bytes,
    chunk_size: usize,
    phase: StreamPhase,
    target: String,
    relayed_bytes: u64,
}

impl<S> RelayStream<S> {
    pub fn new(upstream: S, chunk_size: usize, prefix: Option<Bytes>, target: String) -> Self {
        Self {
            upstream,
            prefix,
            pending: Bytes::new(),
            chunk_size: chunk_size.max(1),
            phase: StreamPhase::HeadersSent,
            target,
            relayed_bytes: 0,
        }
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }
}

impl<S, E> Stream for RelayStream<S>
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = Result<Bytes, std::io::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;

        if let Some(prefix) = this.prefix.take() {
            this.phase = StreamPhase::Streaming;
            return Poll::Ready(Some(Ok(prefix)));
        }

        loop {
            if !this.pending.is_empty() {
                let len = this.pending.len().min(this.chunk_size);
                this.relayed_bytes += len as u64;
                return Poll::Ready(Some(Ok(this.pending.split_to(len))));
            }

            if this.phase.is_terminal() {
                return Poll::Ready(None);
            }

            match ready!(Pin::new(&mut this.upstream).poll_next(cx)) {
                Some(Ok(bytes)) => {
                    this.phase = StreamPhase::Streaming;
                    this.pending = bytes;
                }
                Some(Err(e)) => {
                    tracing::error!(
                        error = %e,
                        upstream = %this.target,
                        relayed_bytes = this.relayed_bytes,
                        "Streaming proxy error"
                    );
                    this.phase = StreamPhase::ErrorClosed;
                    let event = Error::Stream(e.to_string()).to_sse_event();
                    return Poll::Ready(Some(Ok(event)));
                }
                None => {
                    tracing::debug!(
                        upstream = %this.target,
                        relayed_bytes = this.relayed_bytes,
                        "Upstream stream completed"
                    );
                    this.phase = StreamPhase::Completed;
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<S> Drop for RelayStream<S> {
    fn drop(&mut self) {
        if !self.phase.is_terminal() {
            tracing::info!(
                upstream = %self.target,
                relayed_bytes = self.relayed_bytes,
                "Client disconnected mid-stream, closing upstream connection"
            );
        }
    }
}

/// Forward `request` upstream and relay the response as it arrives.
pub async fn forward_streaming(state: &AppState, request: ForwardRequest) -> Response {
    let upstream = match request.build(&state.streaming_client).send().await {
        Ok(upstream) => upstream,
        Err(e) => {
            let error = Error::from_upstream(e, state.config.upstream_base());
            tracing::error!(
                error = %error,
                kind = error.kind(),
                method = %request.method,
                upstream = %request.target,
                "Streaming connection error"
            );
            return setup_failure(&error);
        }
    };

    let status = upstream.status();
    tracing::info!(
        status = status.as_u16(),
        method = %request.method,
        uri = %request.uri,
        "Streaming response"
    );

    let mut headers = relay_headers(upstream.headers());
    apply_stream_headers(&mut headers);
    if !headers.contains_key(header::CONTENT_TYPE) {
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
    }

    let prefix = (status != StatusCode::OK).then(|| status_marker(status));
    let relay = RelayStream::new(
        Box::pin(upstream.bytes_stream()),
        state.config.upstream.chunk_size,
        prefix,
        request.target.to_string(),
    );

    let mut response = Response::new(Body::from_stream(relay));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

/// The status line injected ahead of a non-200 streamed body.
fn status_marker(status: StatusCode) -> Bytes {
    Bytes::from(format!(
        "HTTP/1.1 {} {}\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or("")
    ))
}

/// Headers every streamed response carries, whatever the upstream sent.
fn apply_stream_headers(headers: &mut HeaderMap) {
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
}

/// Response for a stream whose upstream call never produced a response.
///
/// The caller asked for a stream, so the failure is delivered as a single
/// event in an otherwise normal event-stream response.
fn setup_failure(error: &Error) -> Response {
    let mut response = Response::new(Body::from(error.to_sse_event()));
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream"),
    );
    apply_stream_headers(headers);
    response
}
