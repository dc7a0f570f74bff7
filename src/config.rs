//! Configuration parsing for the s3-metrics exporter.
//!
//! Supports:
//! - CLI arguments via clap
//! - Environment variable overrides
//! - Defaults matching the scrape port dashboards already point at

use clap::Parser;
use std::net::{AddrParseError, SocketAddr};

/// Default scrape port.
pub const DEFAULT_METRICS_PORT: u16 = 2112;

/// s3-metrics: Prometheus exporter for S3 FUSE client instrumentation.
#[derive(Parser, Debug, Clone)]
#[command(name = "s3-metrics")]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// Host address the metrics endpoint binds to
    #[arg(long, env = "S3_METRICS_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the metrics endpoint listens on
    #[arg(short, long, env = "S3_METRICS_PORT", default_value_t = DEFAULT_METRICS_PORT)]
    pub metrics_port: u16,

    /// Serve the /metrics endpoint
    #[arg(long, env = "S3_METRICS_ENABLED", default_value_t = true, action = clap::ArgAction::Set)]
    pub metrics_enabled: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,
}

impl Config {
    /// Parse configuration from CLI arguments and environment.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Socket address of the metrics endpoint.
    pub fn metrics_addr(&self) -> Result<SocketAddr, AddrParseError> {
        format!("{}:{}", self.host, self.metrics_port).parse()
    }

    /// Create a configuration for tests bound to an ephemeral loopback port.
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self {
            host: "127.0.0.1".into(),
            metrics_port: 0,
            metrics_enabled: true,
            log_level: "debug".into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            metrics_port: DEFAULT_METRICS_PORT,
            metrics_enabled: true,
            log_level: "info".into(),
        }
    }
}
