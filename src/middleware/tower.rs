use std::task::{Context, Poll};

use http::Request;
use tower::Service;
use tower_layer::Layer;
use tracing::{instrument::Instrumented, Instrument, Span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

use crate::http_injector;

/// Opens a server span named `<METHOD> <route>` for every request and runs
/// the route handler inside it, parented to the trace context found in the
/// request headers.
///
/// Register it last on the router so it wraps every other layer; spans and
/// logs of inner layers then belong to the request's trace.
///
/// The response status is left empty here.
/// [`track_requests`](super::track::track_requests) records it from inside
/// the span.
///
/// ```ignore
/// let app = Router::new()
///     .route("/foo", get(|| async {}))
///     .route("/bar", get(|| async {}))
///     .layer(TraceLayer);
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct TraceLayer;

impl<S> Layer<S> for TraceLayer {
    type Service = TraceService<S>;

    fn layer(&self, service: S) -> Self::Service {
        TraceService { service }
    }
}

#[derive(Debug, Clone)]
pub struct TraceService<S> {
    service: S,
}

/// Server span for `request`, not yet parented.
fn request_span<B>(request: &Request<B>) -> Span {
    let method = request.method();
    let route = http_injector::route_of(request);
    let name = format!("{method} {route}");

    tracing::info_span!(
        "request",
        otel.name = %name,
        otel.kind = "server",
        otel.status_code = tracing::field::Empty,
        http.request.method = %method,
        http.route = route,
        url.path = request.uri().path(),
        http.response.status_code = tracing::field::Empty,
    )
}

impl<S, Body> Service<Request<Body>> for TraceService<S>
where
    S: Service<Request<Body>>,
{
    type Error = S::Error;
    type Future = Instrumented<S::Future>;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let span = request_span(&request);
        span.set_parent(http_injector::extract_context(&request));

        self.service.call(request).instrument(span)
    }
}
