//! s3-metrics: Prometheus instrumentation for an S3-backed FUSE client.
//!
//! Wraps outgoing HTTP transports with request, latency, first-byte and
//! in-flight series, accumulates byte/time totals for filesystem operations,
//! and serves everything on a `/metrics` scrape endpoint.
//!
//! # Architecture
//!
//! - **Explicit registry**: every constructor takes a [`prometheus::Registry`];
//!   nothing registers into a process-global default.
//! - **Tower layers**: outgoing instrumentation is a stack of `tower` layers, so
//!   any `Service` speaking HTTP requests/responses can be wrapped.
//! - **Transparent**: transport errors pass through untouched.
//!
//! # Modules
//!
//! - [`config`]: CLI and environment configuration
//! - [`error`]: Crate error type
//! - [`observability`]: Tracing setup and the scrape endpoint
//! - [`ops`]: Byte/time accumulation per filesystem operation
//! - [`outgoing`]: Outgoing HTTP call instrumentation

// Lint configuration
#![warn(clippy::all)]
#![allow(
    clippy::module_name_repetitions, // outgoing::OutgoingLayer is fine
    clippy::must_use_candidate,      // Not all functions need #[must_use]
    clippy::missing_errors_doc,      // Error docs can be verbose
    clippy::missing_panics_doc       // Panic docs can be verbose
)]

pub mod config;
pub mod error;
pub mod observability;
pub mod ops;
pub mod outgoing;

pub use error::{MetricsError, Result};
pub use ops::OperationCounter;
pub use outgoing::{instrument_client, instrument_transport, OutgoingInstrumentation};

/// Namespace prefixed to every series this crate registers.
pub const NAMESPACE: &str = "s3";

/// Subsystem for outgoing HTTP series.
pub const SUBSYSTEM_HTTP_OUTGOING: &str = "http_outgoing";

/// Subsystem for FUSE operation series.
pub const SUBSYSTEM_FUSE_OPS: &str = "fuse";
