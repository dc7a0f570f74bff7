//! Outgoing HTTP call instrumentation.
//!
//! Series (all under `s3_http_outgoing_`):
//! - `requests_total{code, method}`: completed calls
//! - `request_duration_histogram_seconds{method}`: transport latency
//! - `firstbyte_duration_histogram_seconds{event}`: time to first response byte
//! - `in_flight_requests`: calls currently inside the transport
//!
//! The four series are registered as one collector, so a registry either
//! accepts all of them or none.

pub mod labels;
pub mod layers;

use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry};
use tower::{Layer, ServiceExt};

use crate::error::{MetricsError, Result};
use crate::{NAMESPACE, SUBSYSTEM_HTTP_OUTGOING};

pub use labels::{HttpRequest, HttpResponse, ERROR_CODE, FIRST_RESPONSE_BYTE_EVENT};
pub use layers::{
    Counter, CounterLayer, Duration, DurationLayer, InFlight, InFlightLayer, Trace, TraceHooks,
    TraceLayer,
};

/// A transport wrapped by [`OutgoingLayer`].
pub type Instrumented<S> = InFlight<Counter<Trace<Duration<S>>>>;

fn outgoing_opts(name: &str, help: &str) -> Opts {
    Opts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM_HTTP_OUTGOING)
}

fn outgoing_histogram_opts(name: &str, help: &str) -> HistogramOpts {
    HistogramOpts::new(name, help)
        .namespace(NAMESPACE)
        .subsystem(SUBSYSTEM_HTTP_OUTGOING)
        .buckets(prometheus::DEFAULT_BUCKETS.to_vec())
}

/// Series observed around an outgoing transport.
#[derive(Clone)]
pub struct OutgoingInstrumentation {
    requests: IntCounterVec,
    duration: HistogramVec,
    first_byte_duration: HistogramVec,
    in_flight: IntGauge,
}

impl OutgoingInstrumentation {
    /// Build the series without registering them anywhere.
    pub fn new() -> Result<Self> {
        let requests = IntCounterVec::new(
            outgoing_opts(
                "requests_total",
                "A counter for outgoing requests from the wrapped client.",
            ),
            &["code", "method"],
        )
        .map_err(MetricsError::Registration)?;

        let duration = HistogramVec::new(
            outgoing_histogram_opts(
                "request_duration_histogram_seconds",
                "A histogram of outgoing request latencies.",
            ),
            &["method"],
        )
        .map_err(MetricsError::Registration)?;

        let first_byte_duration = HistogramVec::new(
            outgoing_histogram_opts(
                "firstbyte_duration_histogram_seconds",
                "Time taken to get first byte latency histogram.",
            ),
            &["event"],
        )
        .map_err(MetricsError::Registration)?;

        let in_flight = IntGauge::with_opts(outgoing_opts(
            "in_flight_requests",
            "A gauge of in-flight outgoing requests for the wrapped client.",
        ))
        .map_err(MetricsError::Registration)?;

        Ok(Self {
            requests,
            duration,
            first_byte_duration,
            in_flight,
        })
    }

    /// Build the series and register them with `registry`.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::Registration`] if the registry already holds
    /// series with the same identity. Nothing is registered in that case.
    pub fn register(registry: &Registry) -> Result<Self> {
        let instrumentation = Self::new()?;
        registry
            .register(Box::new(instrumentation.clone()))
            .map_err(|e| {
                tracing::warn!(error = %e, "Outgoing HTTP metrics already registered");
                MetricsError::Registration(e)
            })?;
        Ok(instrumentation)
    }

    /// Layer that applies all four decorators in order.
    pub fn layer(&self) -> OutgoingLayer {
        let first_byte = self
            .first_byte_duration
            .with_label_values(&[FIRST_RESPONSE_BYTE_EVENT]);
        let hooks = TraceHooks::new().on_first_response_byte(move |seconds| {
            first_byte.observe(seconds);
        });

        OutgoingLayer {
            in_flight: InFlightLayer::new(self.in_flight.clone()),
            counter: CounterLayer::new(self.requests.clone()),
            trace: TraceLayer::new(hooks),
            duration: DurationLayer::new(self.duration.clone()),
        }
    }

    pub fn requests(&self) -> &IntCounterVec {
        &self.requests
    }

    pub fn duration(&self) -> &HistogramVec {
        &self.duration
    }

    pub fn first_byte_duration(&self) -> &HistogramVec {
        &self.first_byte_duration
    }

    pub fn in_flight(&self) -> &IntGauge {
        &self.in_flight
    }
}

impl Collector for OutgoingInstrumentation {
    fn desc(&self) -> Vec<&Desc> {
        self.duration
            .desc()
            .into_iter()
            .chain(self.requests.desc())
            .chain(self.in_flight.desc())
            .chain(self.first_byte_duration.desc())
            .collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.duration
            .collect()
            .into_iter()
            .chain(self.requests.collect())
            .chain(self.in_flight.collect())
            .chain(self.first_byte_duration.collect())
            .collect()
    }
}

/// Tower layer wrapping a transport in-flight → counter → trace → duration.
///
/// The in-flight gauge spans the whole call including the other decorators;
/// the duration histogram sits next to the transport and times only it.
#[derive(Clone)]
pub struct OutgoingLayer {
    in_flight: InFlightLayer,
    counter: CounterLayer,
    trace: TraceLayer,
    duration: DurationLayer,
}

impl<S> Layer<S> for OutgoingLayer {
    type Service = Instrumented<S>;

    fn layer(&self, inner: S) -> Self::Service {
        self.in_flight.layer(self.counter.layer(self.trace.layer(self.duration.layer(inner))))
    }
}

/// Register fresh outgoing series with `registry` and wrap `transport`.
///
/// # Errors
///
/// Fails with [`MetricsError::Registration`] if outgoing series are already
/// registered; `transport` is dropped unwrapped in that case.
pub fn instrument_transport<S>(transport: S, registry: &Registry) -> Result<Instrumented<S>> {
    let instrumentation = OutgoingInstrumentation::register(registry)?;
    Ok(instrumentation.layer().layer(transport))
}

/// Register fresh outgoing series with `registry` and wrap a reqwest client.
///
/// Redirect policy, cookie store and timeouts stay those of `client`.
pub fn instrument_client(
    client: reqwest::Client,
    registry: &Registry,
) -> Result<InstrumentedClient> {
    let service = instrument_transport(client.clone(), registry)?;
    Ok(InstrumentedClient { client, service })
}

/// A reqwest client whose requests pass through the outgoing instrumentation.
#[derive(Clone)]
pub struct InstrumentedClient {
    client: reqwest::Client,
    service: Instrumented<reqwest::Client>,
}

impl InstrumentedClient {
    /// Start building a request. Send it with [`send`](Self::send).
    pub fn request(&self, method: http::Method, url: &str) -> reqwest::RequestBuilder {
        self.client.request(method, url)
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.request(http::Method::GET, url)
    }

    /// Build and execute a request through the instrumentation.
    pub async fn send(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> reqwest::Result<reqwest::Response> {
        self.execute(builder.build()?).await
    }

    /// Execute a request through the instrumentation.
    pub async fn execute(&self, request: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        self.service.clone().oneshot(request).await
    }
}
