//! Correlation of `tracing` events with OpenTelemetry trace context.
//!
//! [`tracing_opentelemetry`] keeps the OpenTelemetry identity of every span in
//! the span's extensions. Both the OTLP log bridge and the console formatter
//! read it from there, so a log line and its exported record always name the
//! span they were emitted in.

use std::{borrow::Cow, fmt, time::SystemTime};

use opentelemetry::{
    logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity, TraceContext},
    trace::{SamplingDecision, SpanContext, TraceContextExt, TraceFlags, TraceState},
    Key,
};
use tracing::{
    field::{Field, Visit},
    Event, Level, Subscriber,
};
use tracing_opentelemetry::OtelData;
use tracing_subscriber::{
    fmt::{
        format::Writer,
        time::{FormatTime, SystemTime as ConsoleTime},
        FmtContext, FormatEvent, FormatFields,
    },
    layer::Context,
    registry::{LookupSpan, SpanRef},
    Layer,
};

const INSTRUMENTATION_NAME: &str = env!("CARGO_PKG_NAME");

/// Printed in place of both ids when an event happens outside any span.
pub const MISSING_ID: &str = "N/A";

/// Span context the given span is (or will be) exported with.
///
/// A span parented to a valid remote context belongs to the remote trace and
/// inherits its flags and trace state. Otherwise its trace id is the one
/// generated when the span was opened, and it is sampled unless a sampling
/// decision already made for it says otherwise.
pub fn span_context<S>(span: &SpanRef<'_, S>) -> Option<SpanContext>
where
    S: for<'a> LookupSpan<'a>,
{
    let extensions = span.extensions();
    let data = extensions.get::<OtelData>()?;
    let span_id = data.builder.span_id?;

    let parent = data.parent_cx.span();
    let parent = parent.span_context();
    if parent.is_valid() {
        return Some(SpanContext::new(
            parent.trace_id(),
            span_id,
            parent.trace_flags(),
            false,
            parent.trace_state().clone(),
        ));
    }

    let trace_flags = match &data.builder.sampling_result {
        Some(result) if result.decision != SamplingDecision::RecordAndSample => {
            TraceFlags::default()
        }
        _ => TraceFlags::SAMPLED,
    };
    Some(SpanContext::new(
        data.builder.trace_id?,
        span_id,
        trace_flags,
        false,
        TraceState::default(),
    ))
}

/// Forwards `tracing` events to an OpenTelemetry [`Logger`], attaching the
/// trace context of the span the event was emitted in.
pub struct OpenTelemetryTracingBridge<L> {
    logger: L,
}

impl<L> OpenTelemetryTracingBridge<L>
where
    L: Logger + Send + Sync,
{
    pub fn new<P>(provider: &P) -> Self
    where
        P: LoggerProvider<Logger = L>,
    {
        OpenTelemetryTracingBridge {
            logger: provider.logger(INSTRUMENTATION_NAME),
        }
    }
}

impl<S, L> Layer<S> for OpenTelemetryTracingBridge<L>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    L: Logger + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let meta = event.metadata();

        let mut visitor = EventVisitor::default();
        event.record(&mut visitor);
        visitor
            .attributes
            .push((Key::new("target"), AnyValue::from(meta.target().to_owned())));

        let mut record = LogRecord::default();
        record.timestamp = Some(SystemTime::now());
        record.severity_number = Some(severity_of_level(meta.level()));
        record.severity_text = Some(Cow::Borrowed(meta.level().as_str()));
        record.body = visitor.body;
        record.attributes = Some(visitor.attributes);

        if let Some(span_context) = ctx.event_span(event).as_ref().and_then(span_context) {
            record.trace_context = Some(TraceContext::from(&span_context));
        }

        self.logger.emit(record);
    }
}

fn severity_of_level(level: &Level) -> Severity {
    match *level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        Level::ERROR => Severity::Error,
    }
}

/// Splits event fields into the record body (`message`) and attributes.
#[derive(Default)]
struct EventVisitor {
    body: Option<AnyValue>,
    attributes: Vec<(Key, AnyValue)>,
}

impl EventVisitor {
    fn push(&mut self, field: &Field, value: AnyValue) {
        match field.name() {
            "message" => self.body = Some(value),
            // bookkeeping fields added by tracing-log
            name if name.starts_with("log.") => {}
            name => self.attributes.push((Key::new(name), value)),
        }
    }
}

impl Visit for EventVisitor {
    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value.into());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(value) => self.push(field, value.into()),
            Err(_) => self.push(field, value.to_string().into()),
        }
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value.into());
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.push(field, value.to_owned().into());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.push(field, format!("{value:?}").into());
    }
}

/// Console formatter writing
/// `<timestamp> [<LEVEL>] trace_id=<id> span_id=<id> <message>`, with
/// [`MISSING_ID`] for both ids outside of a span.
#[derive(Debug, Default, Clone)]
pub struct TraceContextFormat {
    timer: ConsoleTime,
}

impl<S, N> FormatEvent<S, N> for TraceContextFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        self.timer.format_time(&mut writer)?;
        write!(writer, " [{}] ", event.metadata().level())?;

        // parent_span honours an explicit `parent:` on the event, like the bridge
        match ctx.parent_span().as_ref().and_then(span_context) {
            Some(span) => write!(
                writer,
                "trace_id={} span_id={} ",
                span.trace_id(),
                span.span_id()
            )?,
            None => write!(writer, "trace_id={MISSING_ID} span_id={MISSING_ID} ")?,
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
