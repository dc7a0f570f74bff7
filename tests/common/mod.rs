//! Test utilities for s3-metrics integration tests.
//!
//! Provides:
//! - A scripted mock transport
//! - An in-process metrics endpoint
//! - Helpers for reading values out of a text exposition

#![allow(dead_code)]

use futures::future::BoxFuture;
use prometheus::Registry;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Error returned by [`scripted_transport`] for paths starting with `/fail`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

/// A transport whose behavior is chosen by the request path:
///
/// - `/fail...` fails immediately without a response
/// - `/status/<code>` responds with that status
/// - anything else responds 200
///
/// Successful calls sleep briefly so concurrent calls overlap.
pub fn scripted_transport() -> impl tower::Service<
    http::Request<()>,
    Response = http::Response<()>,
    Error = TransportError,
    Future = BoxFuture<'static, Result<http::Response<()>, TransportError>>,
> + Clone {
    tower::service_fn(|req: http::Request<()>| -> BoxFuture<'static, _> {
        let path = req.uri().path().to_owned();
        Box::pin(async move {
            if path.starts_with("/fail") {
                return Err(TransportError(path));
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
            let status = path
                .strip_prefix("/status/")
                .and_then(|code| code.parse::<u16>().ok())
                .unwrap_or(200);
            Ok(http::Response::builder()
                .status(status)
                .body(())
                .expect("valid status"))
        })
    })
}

/// Metrics endpoint running on an ephemeral loopback port.
pub struct TestEndpoint {
    pub addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl TestEndpoint {
    /// Start serving `registry`.
    pub async fn start(registry: Registry) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind");
        let addr = listener.local_addr().expect("no local addr");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            s3_metrics::observability::endpoint::serve(listener, registry, shutdown_rx)
                .await
                .expect("metrics server failed");
        });

        Self {
            addr,
            shutdown_tx,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Fetch `/metrics` and return the body.
    pub async fn scrape(&self) -> String {
        direct_client()
            .get(self.url("/metrics"))
            .send()
            .await
            .expect("scrape failed")
            .text()
            .await
            .expect("scrape body")
    }

    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.handle.await;
    }
}

/// A reqwest client that ignores proxy settings from the environment.
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .expect("failed to build client")
}

/// Value of the sample whose name-and-labels part equals `series`.
///
/// `series` is written exactly as it appears in the exposition, for example
/// `s3_http_outgoing_requests_total{code="200",method="get"}`.
pub fn sample_value(exposition: &str, series: &str) -> Option<f64> {
    exposition.lines().find_map(|line| {
        let (name, value) = line.rsplit_once(' ')?;
        (name == series).then(|| value.parse().ok()).flatten()
    })
}

/// Sum of every sample of the metric `name`, across all label sets.
pub fn sum_samples(exposition: &str, name: &str) -> f64 {
    exposition
        .lines()
        .filter(|line| !line.starts_with('#'))
        .filter_map(|line| {
            let (series, value) = line.rsplit_once(' ')?;
            let metric = series.split('{').next()?;
            (metric == name).then(|| value.parse::<f64>().ok()).flatten()
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_helpers() {
        let text = "# TYPE x counter\nx{a=\"1\"} 2\nx{a=\"2\"} 3\ny 7\n";
        assert_eq!(sample_value(text, "x{a=\"2\"}"), Some(3.0));
        assert_eq!(sample_value(text, "y"), Some(7.0));
        assert_eq!(sample_value(text, "z"), None);
        assert_eq!(sum_samples(text, "x"), 5.0);
    }
}
