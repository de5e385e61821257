//! streamrelay - transparent streaming-aware reverse proxy
//!
//! Fronts a single upstream (typically a local inference server) under a
//! stable address, relaying buffered and streamed responses unchanged.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamrelay::config::Config;

#[derive(Parser)]
#[command(name = "streamrelay")]
#[command(about = "Transparent streaming-aware reverse proxy for local inference servers")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Serve {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Override listen address
        #[arg(short, long)]
        listen: Option<String>,
    },

    /// Validate configuration and print the effective settings
    Check {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn init_tracing(level: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("streamrelay={level},tower_http={level}").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config, listen } => {
            let mut config = Config::load(config.as_deref())?;
            init_tracing(&config.logging.level);

            if let Some(addr) = listen {
                tracing::info!(listen = %addr, "Override listen address");
                config.override_listen(addr)?;
            }

            tracing::info!("Starting streaming proxy server");
            streamrelay::proxy::run_server(config).await
        }

        Commands::Check { config } => {
            let config = Config::load(config.as_deref())?;
            println!("Configuration OK");
            println!("  listen:          {}", config.server.listen);
            println!("  upstream:        {}", config.upstream.url);
            println!("  timeout:         {}s", config.upstream.timeout_secs);
            println!("  connect timeout: {}s", config.upstream.connect_timeout_secs);
            println!("  chunk size:      {} bytes", config.upstream.chunk_size);
            println!("  max body:        {} bytes", config.server.max_body_bytes);
            Ok(())
        }
    }
}
