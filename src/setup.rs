use opentelemetry::{
    global,
    logs::LogError,
    propagation::{TextMapCompositePropagator, TextMapPropagator},
    trace::TraceError,
    KeyValue,
};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    logs::Config, propagation::TraceContextPropagator, runtime, trace::Tracer, Resource,
};
use thiserror::Error;
use tracing_core::LevelFilter;
use tracing_subscriber::{
    filter::ParseError,
    fmt,
    layer::SubscriberExt,
    util::{SubscriberInitExt, TryInitError},
    EnvFilter, Registry,
};

use crate::{
    config::Config as AppConfig,
    http_metrics::HttpMetrics,
    trace_id::{OpenTelemetryTracingBridge, TraceContextFormat},
};

/// Transport crates used by the exporters. Their own logs would otherwise be
/// exported again through the log pipeline.
const QUIET_TARGETS: &str = "h2=warn,hyper=warn,hyper_util=warn,tonic=warn,tower=warn,reqwest=warn";

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to install the trace pipeline: {0}")]
    Trace(#[from] TraceError),
    #[error("failed to install the log pipeline: {0}")]
    Logs(#[from] LogError),
    #[error("failed to build the metrics registry: {0}")]
    Metrics(#[from] metrics_exporter_prometheus::BuildError),
    #[error("invalid log filter: {0}")]
    Filter(#[from] ParseError),
    #[error("failed to install the tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

/// Handle to the telemetry set up by [`setup`].
pub struct Telemetry {
    metrics: HttpMetrics,
}

impl Telemetry {
    /// Registry backing the `/metrics` endpoint.
    pub fn metrics(&self) -> &HttpMetrics {
        &self.metrics
    }

    /// Flushes pending spans and log records and stops the exporters.
    ///
    /// Blocks until the batch processors have drained, so call it from a
    /// blocking context.
    pub fn shutdown(self) {
        teardown();
    }
}

/// Sets up tracing, logging and metrics.
///
/// Spans are exported via OTLP/gRPC to `config.traces_endpoint`, logs via
/// OTLP/HTTP to `config.logs_endpoint`, both tagged with `config.service_name`.
/// Metrics are kept in a Prometheus registry for scraping. Log filtering
/// follows `RUST_LOG`, defaulting to `info`.
///
/// This should generally be the first statement of the server binary's main
/// function, and must run inside a Tokio runtime.
pub fn setup(config: &AppConfig) -> Result<Telemetry, SetupError> {
    let resource = resource(&config.service_name);
    let metrics = HttpMetrics::new()?;

    // needs to run before init_tracer
    init_logs(resource.clone(), &config.logs_endpoint)?;
    let tracer = init_tracer(resource, &config.traces_endpoint)?;

    Registry::default()
        .with(env_filter()?)
        .with(tracing_opentelemetry::layer().with_tracer(tracer))
        .with(OpenTelemetryTracingBridge::new(&global::logger_provider()))
        .with(fmt::layer().event_format(TraceContextFormat::default()))
        .try_init()?;

    tracing::info!(
        service = %config.service_name,
        traces = %config.traces_endpoint,
        logs = %config.logs_endpoint,
        "telemetry initialized"
    );
    Ok(Telemetry { metrics })
}

/// Accepts W3C `traceparent` as well as Jaeger `uber-trace-id` headers.
pub fn propagator() -> TextMapCompositePropagator {
    let propagators: Vec<Box<dyn TextMapPropagator + Send + Sync>> = vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(opentelemetry_jaeger_propagator::Propagator::new()),
    ];
    TextMapCompositePropagator::new(propagators)
}

fn resource(service: &str) -> Resource {
    Resource::new(vec![
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_NAME,
            service.to_owned(),
        ),
        KeyValue::new(
            opentelemetry_semantic_conventions::resource::SERVICE_VERSION,
            env!("CARGO_PKG_VERSION"),
        ),
    ])
}

fn env_filter() -> Result<EnvFilter, ParseError> {
    env_filter_from(&std::env::var(EnvFilter::DEFAULT_ENV).unwrap_or_default())
}

/// Filter from `RUST_LOG`-style `directives`, defaulting to `info`. The
/// exporter transports stay at `warn` whatever `directives` say. A malformed
/// filter is an error instead of being ignored.
fn env_filter_from(directives: &str) -> Result<EnvFilter, ParseError> {
    let mut filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .parse(directives)?;
    for directive in QUIET_TARGETS.split(',') {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

fn init_tracer(resource: Resource, endpoint: &str) -> Result<Tracer, TraceError> {
    global::set_text_map_propagator(propagator());
    opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .tonic()
                .with_endpoint(endpoint),
        )
        .with_trace_config(opentelemetry_sdk::trace::config().with_resource(resource))
        .install_batch(runtime::Tokio)
}

fn init_logs(resource: Resource, endpoint: &str) -> Result<(), LogError> {
    opentelemetry_otlp::new_pipeline()
        .logging()
        .with_log_config(Config::default().with_resource(resource))
        .with_exporter(
            opentelemetry_otlp::new_exporter()
                .http()
                .with_endpoint(endpoint),
        )
        .install_batch(runtime::Tokio)?;

    Ok(())
}

pub fn teardown() {
    global::shutdown_logger_provider();
    global::shutdown_tracer_provider();
}
