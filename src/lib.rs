//! streamrelay - transparent streaming-aware reverse proxy
//!
//! This library provides the core functionality for the streamrelay proxy:
//! configuration, stream detection, and buffered and streamed forwarding to a
//! single upstream server.

pub mod config;
pub mod error;
pub mod proxy;

pub use config::Config;
pub use error::{Error, Result};
