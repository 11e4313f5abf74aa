//! Prometheus metrics for the HTTP surface.
//!
//! The recorder is owned by [`HttpMetrics`] rather than installed as the
//! process-wide `metrics` recorder, so every router (and every test) gets its
//! own registry.
//!
//! # Metrics
//! - `http_requests_total{handler, method, status}`: counter, status grouped
//!   as `2xx`, `4xx`, `5xx`
//! - `http_request_size_bytes{handler}`: summary of request content lengths
//! - `http_response_size_bytes{handler}`: summary of response content lengths
//! - `http_request_duration_highr_seconds`: histogram over all requests with
//!   fine-grained buckets
//! - `http_request_duration_seconds{handler, method}`: histogram with few
//!   buckets

use std::{sync::Arc, time::Duration};

use metrics::{Key, KeyName, Label, Level, Metadata, Recorder, SharedString, Unit};
use metrics_exporter_prometheus::{
    BuildError, Matcher, PrometheusBuilder, PrometheusHandle, PrometheusRecorder,
};
use tokio::task::JoinHandle;

pub const REQUESTS_TOTAL: &str = "http_requests_total";
pub const REQUEST_SIZE: &str = "http_request_size_bytes";
pub const RESPONSE_SIZE: &str = "http_response_size_bytes";
pub const REQUEST_DURATION_HIGHR: &str = "http_request_duration_highr_seconds";
pub const REQUEST_DURATION: &str = "http_request_duration_seconds";

const LATENCY_BUCKETS: &[f64] = &[0.1, 0.5, 1.0];
const HIGHR_LATENCY_BUCKETS: &[f64] = &[
    0.01, 0.025, 0.05, 0.075, 0.1, 0.25, 0.5, 0.75, 1.0, 1.5, 2.0, 2.5, 3.0, 3.5, 4.0, 4.5, 5.0,
    7.5, 10.0, 30.0, 60.0,
];

/// Everything recorded about one finished request.
#[derive(Debug, Clone, Copy)]
pub struct RequestRecord<'a> {
    /// Route template, or [`UNMATCHED_ROUTE`](crate::http_injector::UNMATCHED_ROUTE).
    pub handler: &'a str,
    pub method: &'a str,
    pub status: u16,
    pub elapsed: Duration,
    pub request_size: u64,
    pub response_size: u64,
}

/// Status class label: `200` and `204` both count as `2xx`.
pub fn status_group(status: u16) -> String {
    format!("{}xx", status / 100)
}

/// Shared handle to the request metrics registry.
#[derive(Clone)]
pub struct HttpMetrics {
    recorder: Arc<PrometheusRecorder>,
    handle: PrometheusHandle,
}

impl HttpMetrics {
    pub fn new() -> Result<Self, BuildError> {
        let recorder = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION.to_string()),
                LATENCY_BUCKETS,
            )?
            .set_buckets_for_metric(
                Matcher::Full(REQUEST_DURATION_HIGHR.to_string()),
                HIGHR_LATENCY_BUCKETS,
            )?
            .build_recorder();
        let handle = recorder.handle();

        recorder.describe_counter(
            KeyName::from_const_str(REQUESTS_TOTAL),
            None,
            SharedString::const_str("Total number of requests by method, status and handler."),
        );
        recorder.describe_histogram(
            KeyName::from_const_str(REQUEST_SIZE),
            Some(Unit::Bytes),
            SharedString::const_str("Content length of incoming requests by handler."),
        );
        recorder.describe_histogram(
            KeyName::from_const_str(RESPONSE_SIZE),
            Some(Unit::Bytes),
            SharedString::const_str("Content length of outgoing responses by handler."),
        );
        recorder.describe_histogram(
            KeyName::from_const_str(REQUEST_DURATION_HIGHR),
            Some(Unit::Seconds),
            SharedString::const_str("Latency with many buckets but no labels."),
        );
        recorder.describe_histogram(
            KeyName::from_const_str(REQUEST_DURATION),
            Some(Unit::Seconds),
            SharedString::const_str("Latency with only few buckets by handler and method."),
        );

        Ok(Self {
            recorder: Arc::new(recorder),
            handle,
        })
    }

    /// Counts one finished request and records its sizes and latency.
    pub fn record_request(&self, record: RequestRecord<'_>) {
        let metadata = Metadata::new(module_path!(), Level::INFO, Some(module_path!()));
        let handler = || Label::new("handler", record.handler.to_owned());
        let method = || Label::new("method", record.method.to_owned());

        let requests = Key::from_parts(
            REQUESTS_TOTAL,
            vec![
                handler(),
                method(),
                Label::new("status", status_group(record.status)),
            ],
        );
        self.recorder
            .register_counter(&requests, &metadata)
            .increment(1);

        let request_size = Key::from_parts(REQUEST_SIZE, vec![handler()]);
        self.recorder
            .register_histogram(&request_size, &metadata)
            .record(record.request_size as f64);

        let response_size = Key::from_parts(RESPONSE_SIZE, vec![handler()]);
        self.recorder
            .register_histogram(&response_size, &metadata)
            .record(record.response_size as f64);

        let elapsed = record.elapsed.as_secs_f64();
        self.recorder
            .register_histogram(&Key::from_name(REQUEST_DURATION_HIGHR), &metadata)
            .record(elapsed);

        let duration = Key::from_parts(REQUEST_DURATION, vec![handler(), method()]);
        self.recorder
            .register_histogram(&duration, &metadata)
            .record(elapsed);
    }

    /// Text exposition snapshot of every metric recorded so far.
    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Periodically drains histogram buffers so they stay bounded between
    /// scrapes.
    pub fn spawn_upkeep(&self, period: Duration) -> JoinHandle<()> {
        let handle = self.handle.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                handle.run_upkeep();
            }
        })
    }
}
