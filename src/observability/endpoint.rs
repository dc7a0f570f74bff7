//! Prometheus HTTP endpoint for metrics scraping.
//!
//! Serves `GET /metrics` in the text exposition format. The listener runs as
//! its own task and never blocks the caller that started it.

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Router,
};
use prometheus::{Encoder, Registry, TextEncoder};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::error::{MetricsError, Result};

/// Endpoint state.
#[derive(Clone)]
pub struct MetricsState {
    registry: Registry,
}

impl MetricsState {
    /// Create a new endpoint state serving the given registry.
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }
}

/// Render every series in `registry` in the Prometheus text format.
pub fn encode_registry(registry: &Registry) -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(MetricsError::Encode)?;
    Ok(String::from_utf8(buffer)?)
}

/// Create the metrics HTTP router.
pub fn create_router(state: MetricsState) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle GET /metrics.
async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    match encode_registry(&state.registry) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                e.to_string(),
            )
        }
    }
}

/// Serve the metrics router on an already-bound listener until shutdown.
pub async fn serve(
    listener: TcpListener,
    registry: Registry,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let app = create_router(MetricsState::new(registry));

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
            tracing::info!("Metrics server shutting down");
        })
        .await
        .map_err(MetricsError::Serve)
}

/// Bind `addr` and run the metrics server.
///
/// # Arguments
///
/// * `addr` - Address to bind to
/// * `registry` - Registry to serve
/// * `shutdown_rx` - Receiver for shutdown signal
pub async fn run_metrics_server(
    addr: SocketAddr,
    registry: Registry,
    shutdown_rx: watch::Receiver<bool>,
) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| MetricsError::Bind { addr, source })?;
    tracing::info!(address = %addr, "Starting metrics server");

    serve(listener, registry, shutdown_rx).await
}

/// Start the metrics server in the background.
///
/// Bind and serve failures are logged; the caller is never blocked.
pub fn spawn_metrics_server(
    addr: SocketAddr,
    registry: Registry,
    shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = run_metrics_server(addr, registry, shutdown_rx).await {
            tracing::error!(error = %e, "Metrics server error");
        }
    })
}
