//! HTTP proxy server module.
//!
//! Every request except `/health` is forwarded to the configured upstream,
//! either as one buffered round trip or as a live stream, depending on what
//! [`classify::is_streaming_request`] decides.

pub mod classify;
mod forward;
mod handlers;
mod server;
pub mod stream;
pub mod upstream;

pub use classify::is_streaming_request;
pub use server::{create_router, run_server, AppState};
pub use stream::{RelayStream, StreamPhase};
pub use upstream::{forward_headers, relay_headers, ForwardRequest, UpstreamTarget};
