//! Byte and time accumulation per FUSE operation.
//!
//! Key metrics:
//! - s3_fuse_bytes_total: bytes moved, by operation
//! - s3_fuse_time_taken: summed elapsed time, by operation

use prometheus::core::{Collector, Desc};
use prometheus::proto::{Metric, MetricFamily};
use prometheus::{GaugeVec, IntCounterVec, Opts, Registry};

use crate::error::{MetricsError, Result};
use crate::{NAMESPACE, SUBSYSTEM_FUSE_OPS};

const OPERATION_LABEL: &str = "operation";

fn fuse_opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM_FUSE_OPS)
}

/// The sample of `families` labeled `operation`, if one has been recorded.
fn find_operation<'a>(families: &'a [MetricFamily], operation: &str) -> Option<&'a Metric> {
    families.iter().flat_map(|mf| mf.get_metric()).find(|m| {
        m.get_label()
            .iter()
            .any(|lp| lp.get_name() == OPERATION_LABEL && lp.get_value() == operation)
    })
}

/// Accumulates bytes and elapsed time per named operation.
///
/// Both series are registered as one collector.
#[derive(Clone)]
pub struct OperationCounter {
    bytes: IntCounterVec,
    // Elapsed time is a signed input, so it is accumulated in a gauge, which
    // accepts negative deltas.
    time_taken: GaugeVec,
}

impl OperationCounter {
    /// Build both series and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Registration`] if either series is already
    /// registered. Nothing is registered in that case.
    pub fn register(registry: &Registry) -> Result<Self> {
        let bytes = IntCounterVec::new(
            fuse_opts("bytes_total", "Bytes Read/Write to Fuse"),
            &[OPERATION_LABEL],
        )
        .map_err(MetricsError::Registration)?;
        let time_taken = GaugeVec::new(
            fuse_opts("time_taken", "Duration to Read/Write to Fuse"),
            &[OPERATION_LABEL],
        )
        .map_err(MetricsError::Registration)?;

        let counter = Self { bytes, time_taken };
        registry
            .register(Box::new(counter.clone()))
            .map_err(|e| {
                tracing::warn!(error = %e, "FUSE operation metrics already registered");
                MetricsError::Registration(e)
            })?;
        Ok(counter)
    }

    /// Add `bytes` and `elapsed` to the totals for `operation`.
    ///
    /// `elapsed` is added as given, including negative values.
    pub fn record(&self, operation: &str, bytes: u64, elapsed: i64) {
        self.bytes.with_label_values(&[operation]).inc_by(bytes);
        self.time_taken
            .with_label_values(&[operation])
            .add(elapsed as f64);
    }

    /// Total bytes recorded for `operation`; 0 if none were.
    ///
    /// Reading never creates a series.
    pub fn bytes(&self, operation: &str) -> u64 {
        find_operation(&self.bytes.collect(), operation)
            .map_or(0, |m| m.get_counter().get_value() as u64)
    }

    /// Total elapsed time recorded for `operation`; 0 if none was.
    pub fn elapsed(&self, operation: &str) -> f64 {
        find_operation(&self.time_taken.collect(), operation)
            .map_or(0.0, |m| m.get_gauge().get_value())
    }
}

impl Collector for OperationCounter {
    fn desc(&self) -> Vec<&Desc> {
        self.bytes
            .desc()
            .into_iter()
            .chain(self.time_taken.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.bytes
            .collect()
            .into_iter()
            .chain(self.time_taken.collect())
            .collect()
    }
}
