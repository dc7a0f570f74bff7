//! Error type shared by the instrumentation constructors and the endpoint.

use std::net::SocketAddr;
use thiserror::Error;

/// Error type for metrics operations.
#[derive(Debug, Error)]
pub enum MetricsError {
    /// A series with the same identity is already registered, or a descriptor
    /// was rejected by the registry.
    #[error("Failed to register metrics: {0}")]
    Registration(#[source] prometheus::Error),

    #[error("Failed to encode metrics: {0}")]
    Encode(#[source] prometheus::Error),

    #[error("Metrics exposition is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Failed to bind metrics listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Metrics server error: {0}")]
    Serve(#[source] std::io::Error),
}

impl MetricsError {
    /// True when the registry already held a collector with the same descriptors.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Registration(prometheus::Error::AlreadyReg))
    }
}

/// Result alias for metrics operations.
pub type Result<T> = std::result::Result<T, MetricsError>;
