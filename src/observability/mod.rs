//! Observability infrastructure.
//!
//! Provides:
//! - Structured logging via tracing-subscriber
//! - HTTP endpoint for Prometheus scraping

pub mod endpoint;
pub mod tracing;
