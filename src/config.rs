use envconfig::Envconfig;
use std::net::SocketAddr;

use crate::error::{Error, Result};

const DEFAULT_CACHE_PORT: u16 = 6379;

#[derive(Debug, Envconfig, Clone)]
pub struct Config {
    /// Server bind address
    #[envconfig(from = "BIND_ADDR", default = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Aspire-style cache connection string (`host:port`). When unset the
    /// service falls back to in-process counters.
    #[envconfig(from = "CONNECTIONSTRINGS__CACHE")]
    pub cache_connection: Option<String>,

    /// Admitted requests per identity per window
    #[envconfig(from = "RATE_LIMIT", default = "10")]
    pub rate_limit: u32,

    /// Sliding window duration in seconds
    #[envconfig(from = "WINDOW_SECONDS", default = "60")]
    pub window_seconds: u64,

    /// Per-operation deadline for counter store calls, in milliseconds
    #[envconfig(from = "STORE_TIMEOUT_MS", default = "250")]
    pub store_timeout_ms: u64,

    /// Log level for the default tracing filter
    #[envconfig(from = "LOG_LEVEL", default = "info")]
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> std::result::Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    /// Resolve the configured cache connection string to a redis URL.
    /// `None` means no cache is configured (local in-process mode).
    pub fn cache_url(&self) -> Result<Option<String>> {
        match self.cache_connection.as_deref() {
            Some(raw) => {
                let (host, port) = parse_connection_string(raw)?;
                Ok(Some(format!("redis://{}:{}", host, port)))
            }
            None => Ok(None),
        }
    }
}

/// Parse an Aspire connection string of the form `host` or `host:port`.
/// The port defaults to 6379 when omitted.
pub fn parse_connection_string(raw: &str) -> Result<(String, u16)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(Error::Config("cache connection string is empty".into()));
    }

    let (host, port) = match raw.split_once(':') {
        Some((host, port)) => (host, port),
        None => (raw, ""),
    };

    if host.is_empty() {
        return Err(Error::Config(format!(
            "cache connection string has no host: {:?}",
            raw
        )));
    }

    let port = if port.is_empty() {
        DEFAULT_CACHE_PORT
    } else {
        port.parse::<u16>()
            .map_err(|_| Error::Config(format!("invalid cache port: {:?}", port)))?
    };

    Ok((host.to_string(), port))
}
