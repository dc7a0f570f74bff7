//! s3-metrics: Prometheus exporter for S3 FUSE client instrumentation.
//!
//! The standalone binary registers the outgoing HTTP and FUSE series and
//! serves them, but performs no traffic of its own: it exposes the schema
//! with zero values. Processes that make S3 calls link the library and
//! record into the same series.
//!
//! # Usage
//!
//! ```bash
//! s3-metrics --metrics-port 2112 --log-level info
//! ```
//!
//! Environment variables can also be used:
//! - `S3_METRICS_HOST`: Address the endpoint binds to
//! - `S3_METRICS_PORT`: Port to listen on
//! - `RUST_LOG`: Log level (trace, debug, info, warn, error)

use anyhow::Context;
use prometheus::Registry;
use s3_metrics::config::Config;
use s3_metrics::observability::endpoint::spawn_metrics_server;
use s3_metrics::observability::tracing::init_tracing;
use s3_metrics::{instrument_client, OperationCounter};
use tokio::sync::watch;

/// Print startup banner with version and configuration.
fn print_banner(config: &Config) {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        r#"
  s3-metrics v{}

  Configuration:
    Endpoint:   http://{}:{}/metrics
    Enabled:    {}
    Log Level:  {}

  Press Ctrl+C to shutdown gracefully.
"#,
        version, config.host, config.metrics_port, config.metrics_enabled, config.log_level
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse configuration from CLI arguments and environment
    let config = Config::parse_args();

    // Initialize tracing/logging
    init_tracing(&config.log_level);

    // Register the schema only; nothing in this binary records into it
    let registry = Registry::new();
    instrument_client(reqwest::Client::new(), &registry)
        .context("registering outgoing HTTP metrics")?;
    OperationCounter::register(&registry).context("registering FUSE operation metrics")?;

    print_banner(&config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = if config.metrics_enabled {
        let addr = config
            .metrics_addr()
            .context("invalid metrics listen address")?;
        Some(spawn_metrics_server(addr, registry, shutdown_rx))
    } else {
        tracing::info!("Metrics endpoint disabled");
        None
    };

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;
    tracing::info!("Received Ctrl+C, initiating shutdown...");
    let _ = shutdown_tx.send(true);

    if let Some(server) = server {
        server.await.context("metrics server task panicked")?;
    }

    tracing::info!("s3-metrics shutdown complete");
    Ok(())
}
