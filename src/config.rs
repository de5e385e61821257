//! Configuration parsing and validation for streamrelay.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment overrides (`UPSTREAM_SERVER`, `PORT`), then CLI flags.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

/// Environment variable holding the upstream base URL.
pub const UPSTREAM_ENV: &str = "UPSTREAM_SERVER";
/// Older name for [`UPSTREAM_ENV`], still honoured when the new one is unset.
pub const LEGACY_UPSTREAM_ENV: &str = "LLAMA_SERVER";
/// Environment variable overriding the listen port.
pub const PORT_ENV: &str = "PORT";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to listen on (e.g., "0.0.0.0:8080")
    pub listen: String,
    /// Largest inbound request body accepted, in bytes
    pub max_body_bytes: usize,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_max_body_bytes() -> usize {
    64 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upstream server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL of the upstream server (e.g., "http://localhost:9997").
    /// May contain `${VAR}` references.
    pub url: String,
    /// End-to-end timeout for buffered requests, in seconds
    pub timeout_secs: u64,
    /// Connect timeout for streaming requests, in seconds
    pub connect_timeout_secs: u64,
    /// Largest body chunk relayed in one piece on streaming responses
    pub chunk_size: usize,
}

fn default_upstream_url() -> String {
    "http://localhost:9997".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: default_upstream_url(),
            timeout_secs: 300,
            connect_timeout_secs: 10,
            chunk_size: 1024,
        }
    }
}

impl UpstreamConfig {
    /// Overall timeout applied to buffered round trips.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Connect timeout applied to streaming requests.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level used when `RUST_LOG` is not set
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;

        Self::parse_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_str(content: &str) -> Result<Self, ConfigError> {
        Self::parse_str_with(content, |name| std::env::var(name).ok())
    }

    /// Parse configuration from a TOML string, resolving `${VAR}` references
    /// through `lookup`.
    pub fn parse_str_with<F>(content: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config: Config = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.upstream.url = expand_env_vars_with(&config.upstream.url, "upstream.url", lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the effective configuration: the file at `path` (or defaults when
    /// no path is given) with environment overrides applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides_with(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `UPSTREAM_SERVER` / `LLAMA_SERVER` and `PORT` overrides.
    pub fn apply_env_overrides_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let upstream = lookup(UPSTREAM_ENV)
            .filter(|v| !v.is_empty())
            .or_else(|| lookup(LEGACY_UPSTREAM_ENV).filter(|v| !v.is_empty()));
        if let Some(url) = upstream {
            self.upstream.url = url;
        }

        if let Some(port) = lookup(PORT_ENV).filter(|v| !v.is_empty()) {
            let port: u16 = port.trim().parse().map_err(|_| {
                ConfigError::Validation(format!("{} must be a port number, got '{}'", PORT_ENV, port))
            })?;
            let mut addr = self.listen_addr()?;
            addr.set_port(port);
            self.server.listen = addr.to_string();
        }

        Ok(())
    }

    /// Replace the listen address (CLI `--listen`).
    pub fn override_listen(&mut self, listen: impl Into<String>) -> Result<(), ConfigError> {
        self.server.listen = listen.into();
        self.listen_addr().map(|_| ())
    }

    /// The parsed listen address.
    pub fn listen_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server.listen.parse().map_err(|_| {
            ConfigError::Validation(format!(
                "Invalid listen address '{}'",
                self.server.listen
            ))
        })
    }

    /// Upstream base URL without a trailing slash.
    pub fn upstream_base(&self) -> &str {
        self.upstream.url.trim_end_matches('/')
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr()?;

        let url = reqwest::Url::parse(&self.upstream.url).map_err(|e| {
            ConfigError::Validation(format!(
                "Invalid upstream URL '{}': {}",
                self.upstream.url, e
            ))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Validation(format!(
                "Upstream URL must use http or https, got '{}'",
                url.scheme()
            )));
        }
        if url.query().is_some() {
            tracing::warn!(
                url = %self.upstream.url,
                "Upstream URL carries a query string; forwarded paths are appended after it"
            );
        }

        if self.upstream.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.connect_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "upstream.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.upstream.chunk_size == 0 {
            return Err(ConfigError::Validation(
                "upstream.chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.server.max_body_bytes == 0 {
            return Err(ConfigError::Validation(
                "server.max_body_bytes must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Configuration validation error: {0}")]
    Validation(String),

    #[error("Environment variable '{var}' not set for '{field}': {message}")]
    EnvVar {
        var: String,
        field: String,
        message: String,
    },
}

/// Expand all `${VAR}` references in a string using a custom lookup function.
///
/// Supports multiple `${VAR}` in one string (e.g., `${SCHEME}://${HOST}:9997`).
/// Fails on first missing variable, unclosed `${`, or empty variable name.
fn expand_env_vars_with<F>(input: &str, field: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if !input.contains("${") {
        return Ok(input.to_string());
    }

    let mut result = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let end = after.find('}').ok_or_else(|| ConfigError::EnvVar {
            var: "<unclosed>".to_string(),
            field: field.to_string(),
            message: format!("Unclosed '${{' in config value: {}", input),
        })?;

        let var_name = &after[..end];
        if var_name.is_empty() {
            return Err(ConfigError::EnvVar {
                var: "".to_string(),
                field: field.to_string(),
                message: "Empty variable name in '${}' reference".to_string(),
            });
        }

        let value = lookup(var_name).ok_or_else(|| ConfigError::EnvVar {
            var: var_name.to_string(),
            field: field.to_string(),
            message: format!(
                "Environment variable '{}' is not set (referenced in '{}')",
                var_name, field
            ),
        })?;

        result.push_str(&value);
        rest = &after[end + 1..];
    }

    result.push_str(rest);
    Ok(result)
}
