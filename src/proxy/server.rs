//! HTTP server setup and configuration.

use axum::{
    body::Body,
    extract::DefaultBodyLimit,
    http::Request,
    routing::{get, on, MethodFilter},
    Router,
};
use reqwest::{redirect, Client};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use super::handlers;
use crate::config::Config;

/// Methods forwarded to the upstream.
const PROXIED_METHODS: MethodFilter = MethodFilter::GET
    .or(MethodFilter::POST)
    .or(MethodFilter::PUT)
    .or(MethodFilter::DELETE)
    .or(MethodFilter::PATCH);

/// Shared application state.
///
/// Read-only after startup; cloned into every request.
#[derive(Clone)]
pub struct AppState {
    /// Client for buffered round trips: overall timeout, no redirects.
    pub buffered_client: Client,
    /// Client for streamed responses: connect timeout only, no redirects.
    pub streaming_client: Client,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, reqwest::Error> {
        let buffered_client = Client::builder()
            .redirect(redirect::Policy::none())
            .timeout(config.upstream.timeout())
            .build()?;

        let streaming_client = Client::builder()
            .redirect(redirect::Policy::none())
            .connect_timeout(config.upstream.connect_timeout())
            .build()?;

        Ok(Self {
            buffered_client,
            streaming_client,
            config: Arc::new(config),
        })
    }
}

/// Create the axum router with all endpoints.
pub fn create_router(state: AppState) -> Router {
    let max_body_bytes = state.config.server.max_body_bytes;

    Router::new()
        .route("/health", get(handlers::health))
        // Everything else goes upstream
        .route("/", on(PROXIED_METHODS, handlers::proxy))
        .route("/*path", on(PROXIED_METHODS, handlers::proxy))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http().make_span_with(
                    |request: &Request<Body>| {
                        tracing::info_span!(
                            "request",
                            id = %uuid::Uuid::new_v4(),
                            method = %request.method(),
                            uri = %request.uri(),
                        )
                    },
                ))
                .layer(DefaultBodyLimit::max(max_body_bytes)),
        )
}

/// Run the HTTP server until Ctrl-C or SIGTERM.
pub async fn run_server(config: Config) -> anyhow::Result<()> {
    let listen_addr = config.listen_addr()?;
    let state = AppState::new(config)?;

    tracing::info!(upstream = %state.config.upstream.url, "Forwarding requests");
    tracing::info!(health = %format!("http://{}/health", listen_addr), "Health check");
    tracing::info!("Streaming support enabled");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!(address = %listen_addr, "Starting streamrelay proxy server");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
