use axum::extract::MatchedPath;
use http::{HeaderMap, HeaderName, Request};
use opentelemetry::{global, propagation::Extractor, Context};

/// Route label for requests that did not match any route.
pub const UNMATCHED_ROUTE: &str = "none";

/// Route template the request was matched against, e.g. `/random`.
pub fn route_of<T>(request: &Request<T>) -> &str {
    request
        .extensions()
        .get::<MatchedPath>()
        .map_or(UNMATCHED_ROUTE, MatchedPath::as_str)
}

/// Constructs the remote [`Context`] carried by the request headers, using
/// the globally registered propagator.
///
/// Without trace headers the returned context has no active span, and spans
/// parented to it start a new trace.
pub fn extract_context<T>(request: &Request<T>) -> Context {
    global::get_text_map_propagator(|propagator| {
        propagator.extract(&HeaderExtractor(request.headers()))
    })
}

// "traceparent" => https://www.w3.org/TR/trace-context/#trace-context-http-headers-format
// "uber-trace-id" => https://www.jaegertracing.io/docs/1.21/client-libraries/#propagation-format

/// Read-only view of the request headers for the propagator. Header names
/// are case-insensitive, so lookups by lowercase key always match.
struct HeaderExtractor<'a>(&'a HeaderMap);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|value| value.to_str().ok())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(HeaderName::as_str).collect()
    }
}
