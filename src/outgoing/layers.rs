//! The four decorators applied around an outgoing transport.
//!
//! Each layer forwards the request untouched and returns the inner result
//! untouched; only metric side effects are added. They are meant to be stacked
//! in-flight (outermost), counter, trace, duration (innermost), which is what
//! [`OutgoingLayer`](super::OutgoingLayer) does.

use futures::future::BoxFuture;
use prometheus::{HistogramVec, IntCounterVec, IntGauge};
use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};

use super::labels::{code_label, method_label, HttpRequest, HttpResponse, ERROR_CODE};

// ─────────────────────────────────────────────────────────────────────────────
// In-flight
// ─────────────────────────────────────────────────────────────────────────────

/// Holds one unit of the in-flight gauge; released on drop.
struct InFlightGuard {
    gauge: IntGauge,
}

impl InFlightGuard {
    fn acquire(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

/// Tracks the number of calls currently inside the wrapped service.
#[derive(Clone)]
pub struct InFlightLayer {
    gauge: IntGauge,
}

impl InFlightLayer {
    pub fn new(gauge: IntGauge) -> Self {
        Self { gauge }
    }
}

impl<S> Layer<S> for InFlightLayer {
    type Service = InFlight<S>;

    fn layer(&self, inner: S) -> Self::Service {
        InFlight {
            inner,
            gauge: self.gauge.clone(),
        }
    }
}

#[derive(Clone)]
pub struct InFlight<S> {
    inner: S,
    gauge: IntGauge,
}

impl<S, Req> Service<Req> for InFlight<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        // Acquired before dispatch so the inner call is always covered, and
        // released even if the returned future is dropped unfinished.
        let guard = InFlightGuard::acquire(&self.gauge);
        let fut = self.inner.call(req);
        Box::pin(async move {
            let _guard = guard;
            fut.await
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Request counter
// ─────────────────────────────────────────────────────────────────────────────

/// Counts completed calls by `{code, method}`.
///
/// Failed calls are counted with `code="error"`.
#[derive(Clone)]
pub struct CounterLayer {
    requests: IntCounterVec,
}

impl CounterLayer {
    pub fn new(requests: IntCounterVec) -> Self {
        Self { requests }
    }
}

impl<S> Layer<S> for CounterLayer {
    type Service = Counter<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Counter {
            inner,
            requests: self.requests.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Counter<S> {
    inner: S,
    requests: IntCounterVec,
}

impl<S, Req> Service<Req> for Counter<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    S::Response: HttpResponse,
    Req: HttpRequest,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let method = method_label(req.http_method());
        let requests = self.requests.clone();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            let code = match &result {
                Ok(resp) => code_label(resp.http_status()),
                Err(_) => {
                    tracing::debug!(method = %method, "Outgoing request failed");
                    ERROR_CODE.to_owned()
                }
            };
            requests.with_label_values(&[code.as_str(), method.as_str()]).inc();
            result
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Trace
// ─────────────────────────────────────────────────────────────────────────────

type SecondsHook = Arc<dyn Fn(f64) + Send + Sync>;

/// Callbacks fired on transport trace events, each with seconds since dispatch.
#[derive(Clone, Default)]
pub struct TraceHooks {
    first_response_byte: Option<SecondsHook>,
}

impl TraceHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called once per call when the response head has been received.
    #[must_use]
    pub fn on_first_response_byte<F>(mut self, hook: F) -> Self
    where
        F: Fn(f64) + Send + Sync + 'static,
    {
        self.first_response_byte = Some(Arc::new(hook));
        self
    }

    fn got_first_response_byte(&self, seconds: f64) {
        if let Some(hook) = &self.first_response_byte {
            hook(seconds);
        }
    }
}

impl fmt::Debug for TraceHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHooks")
            .field("first_response_byte", &self.first_response_byte.is_some())
            .finish()
    }
}

/// Reports transport trace events to a [`TraceHooks`] set.
///
/// A wrapped service resolving to a response means the first response bytes
/// (the status line) have arrived. A call that fails before that never fires
/// the first-byte hook.
#[derive(Clone, Debug)]
pub struct TraceLayer {
    hooks: TraceHooks,
}

impl TraceLayer {
    pub fn new(hooks: TraceHooks) -> Self {
        Self { hooks }
    }
}

impl<S> Layer<S> for TraceLayer {
    type Service = Trace<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Trace {
            inner,
            hooks: self.hooks.clone(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Trace<S> {
    inner: S,
    hooks: TraceHooks,
}

impl<S, Req> Service<Req> for Trace<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let hooks = self.hooks.clone();
        let start = Instant::now();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            if result.is_ok() {
                hooks.got_first_response_byte(start.elapsed().as_secs_f64());
            }
            result
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Duration
// ─────────────────────────────────────────────────────────────────────────────

/// Observes call latency by `{method}`, for successful and failed calls alike.
#[derive(Clone)]
pub struct DurationLayer {
    duration: HistogramVec,
}

impl DurationLayer {
    pub fn new(duration: HistogramVec) -> Self {
        Self { duration }
    }
}

impl<S> Layer<S> for DurationLayer {
    type Service = Duration<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Duration {
            inner,
            duration: self.duration.clone(),
        }
    }
}

#[derive(Clone)]
pub struct Duration<S> {
    inner: S,
    duration: HistogramVec,
}

impl<S, Req> Service<Req> for Duration<S>
where
    S: Service<Req>,
    S::Future: Send + 'static,
    Req: HttpRequest,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<S::Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Req) -> Self::Future {
        let histogram = self
            .duration
            .with_label_values(&[method_label(req.http_method()).as_str()]);
        let start = Instant::now();
        let fut = self.inner.call(req);
        Box::pin(async move {
            let result = fut.await;
            histogram.observe(start.elapsed().as_secs_f64());
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future;
    use prometheus::{HistogramOpts, Opts};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio_test::{assert_pending, task};
    use tower::{service_fn, ServiceBuilder, ServiceExt};

    #[derive(Debug, PartialEq)]
    struct Refused;

    type Reply = future::Ready<Result<http::Response<()>, Refused>>;

    fn ok_transport() -> impl Service<
        http::Request<()>,
        Response = http::Response<()>,
        Error = Refused,
        Future = Reply,
    > + Clone {
        service_fn(|_req: http::Request<()>| future::ready(Ok(http::Response::new(()))))
    }

    fn requests_vec() -> IntCounterVec {
        IntCounterVec::new(Opts::new("requests_total", "requests"), &["code", "method"]).unwrap()
    }

    fn duration_vec() -> HistogramVec {
        HistogramVec::new(HistogramOpts::new("duration_seconds", "duration"), &["method"]).unwrap()
    }

    #[tokio::test]
    async fn test_in_flight_returns_to_zero() {
        let gauge = IntGauge::new("in_flight", "in flight").unwrap();
        let svc = InFlightLayer::new(gauge.clone()).layer(ok_transport());

        svc.oneshot(http::Request::new(())).await.unwrap();
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn test_in_flight_held_while_pending_and_released_on_drop() {
        let gauge = IntGauge::new("in_flight", "in flight").unwrap();
        let mut svc = InFlightLayer::new(gauge.clone()).layer(service_fn(
            |_req: http::Request<()>| future::pending::<Result<http::Response<()>, Refused>>(),
        ));

        let mut call = task::spawn(svc.call(http::Request::new(())));
        assert_pending!(call.poll());
        assert_eq!(gauge.get(), 1);

        drop(call);
        assert_eq!(gauge.get(), 0);
    }

    #[tokio::test]
    async fn test_counter_labels_success_and_failure() {
        let requests = requests_vec();
        let ok = CounterLayer::new(requests.clone()).layer(ok_transport());
        ok.oneshot(http::Request::get("/").body(()).unwrap())
            .await
            .unwrap();

        let failing = CounterLayer::new(requests.clone()).layer(service_fn(
            |_req: http::Request<()>| future::ready(Err::<http::Response<()>, _>(Refused)),
        ));
        let err = failing
            .oneshot(http::Request::post("/").body(()).unwrap())
            .await
            .unwrap_err();

        assert_eq!(err, Refused);
        assert_eq!(requests.with_label_values(&["200", "get"]).get(), 1);
        assert_eq!(requests.with_label_values(&["error", "post"]).get(), 1);
    }

    #[tokio::test]
    async fn test_trace_fires_only_on_response() {
        let fired = Arc::new(AtomicUsize::new(0));
        let hooks = {
            let fired = Arc::clone(&fired);
            TraceHooks::new().on_first_response_byte(move |secs| {
                assert!(secs >= 0.0);
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };

        let ok = TraceLayer::new(hooks.clone()).layer(ok_transport());
        ok.oneshot(http::Request::new(())).await.unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        let failing = TraceLayer::new(hooks).layer(service_fn(|_req: http::Request<()>| {
            future::ready(Err::<http::Response<()>, _>(Refused))
        }));
        let _ = failing.oneshot(http::Request::new(())).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_duration_observed_on_failure() {
        let duration = duration_vec();
        let failing = DurationLayer::new(duration.clone()).layer(service_fn(
            |_req: http::Request<()>| future::ready(Err::<http::Response<()>, _>(Refused)),
        ));
        let _ = failing
            .oneshot(http::Request::delete("/").body(()).unwrap())
            .await;

        assert_eq!(duration.with_label_values(&["delete"]).get_sample_count(), 1);
    }

    #[tokio::test]
    async fn test_layers_compose_with_service_builder() {
        let gauge = IntGauge::new("in_flight", "in flight").unwrap();
        let requests = requests_vec();
        let duration = duration_vec();

        let svc = ServiceBuilder::new()
            .layer(InFlightLayer::new(gauge.clone()))
            .layer(CounterLayer::new(requests.clone()))
            .layer(TraceLayer::new(TraceHooks::new()))
            .layer(DurationLayer::new(duration.clone()))
            .service(ok_transport());

        let resp = svc
            .oneshot(http::Request::head("/").body(()).unwrap())
            .await
            .unwrap();

        assert_eq!(resp.status(), http::StatusCode::OK);
        assert_eq!(gauge.get(), 0);
        assert_eq!(requests.with_label_values(&["200", "head"]).get(), 1);
        assert_eq!(duration.with_label_values(&["head"]).get_sample_count(), 1);
    }
}
