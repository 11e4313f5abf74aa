//! # demo-app
//! A small HTTP service showing end-to-end observability: every request is
//! traced, every log line is correlated with its trace, and request metrics
//! can be scraped by Prometheus.
//!
//! ## Setup
//! Tracing, logs and metrics are set up using [`setup::setup`]. This should
//! be the first call of the server binary, followed by
//! [`server::run_server`] and finally [`setup::Telemetry::shutdown`].
//!
//! ## Http Trace Propagation
//! [`http_injector`] extracts the remote trace context from incoming
//! [`http::Request`]s. The middleware [`middleware::TraceLayer`] applies it
//! to every route, so spans of this service join traces started upstream.
//!
//! ## Log Correlation
//! [`trace_id`] ties `tracing` events to the OpenTelemetry span they were
//! emitted in, both for the OTLP log export and for the console output.

pub mod config;
pub mod http_injector;
pub mod http_metrics;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod setup;
pub mod trace_id;

pub use config::Config;
pub use http_metrics::HttpMetrics;
pub use server::{create_router, run_server};
