use std::time::Instant;

use axum::{
    body::HttpBody,
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Span;

use crate::{
    http_injector,
    http_metrics::{HttpMetrics, RequestRecord},
};

/// Records the outcome of every request: latency, sizes and status go to
/// the metrics registry, the status also onto the surrounding request span.
///
/// Runs inside [`TraceLayer`](super::tower::TraceLayer), so
/// [`Span::current`] is the request span here.
pub async fn track_requests(
    State(metrics): State<HttpMetrics>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let handler = http_injector::route_of(&request).to_owned();
    let request_size = body_size(request.headers(), request.body().size_hint().exact());

    let response = next.run(request).await;

    let status = response.status();
    let span = Span::current();
    span.record("http.response.status_code", u64::from(status.as_u16()));
    if status.is_server_error() {
        span.record("otel.status_code", "ERROR");
    }

    metrics.record_request(RequestRecord {
        handler: &handler,
        method: method.as_str(),
        status: status.as_u16(),
        elapsed: start.elapsed(),
        request_size,
        response_size: body_size(response.headers(), response.body().size_hint().exact()),
    });

    response
}

/// `Content-Length` if present, else the exact body length when it is known
/// up front, else zero.
fn body_size(headers: &HeaderMap, exact: Option<u64>) -> u64 {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
        .or(exact)
        .unwrap_or(0)
}
