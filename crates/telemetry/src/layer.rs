//! `tracing-subscriber` layer that feeds every event into a [`LogSink`](crate::sink::LogSink).

use std::fmt;
use std::sync::Arc;

use opentelemetry::trace::{SpanContext, TraceContextExt};
use tracing::field::{Field, Visit};
use tracing::span::{Attributes, Id, Record};
use tracing::{Event, Subscriber};
use tracing_opentelemetry::{OtelData, PreSampledTracer};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::error::SinkError;
use crate::pipeline::SdkTracer;
use crate::sink::{Attribute, LogRecord, SharedSink, SourceLocation};

const MESSAGE_FIELD: &str = "message";

pub type ErrorHook = Arc<dyn Fn(&SinkError) + Send + Sync>;

/// Converts `tracing` events into [`LogRecord`]s.
///
/// Fields of enclosing spans are included root first, followed by the
/// event's own fields. When a tracer is attached, the record carries the
/// sampled OpenTelemetry span context of the event's span. Sink failures go
/// to the error hook since a `tracing` macro has nowhere to return them.
pub struct SinkLayer {
    sink: SharedSink,
    tracer: Option<SdkTracer>,
    on_error: ErrorHook,
}

impl SinkLayer {
    pub fn new(sink: SharedSink) -> Self {
        Self {
            sink,
            tracer: None,
            on_error: Arc::new(|err: &SinkError| {
                eprintln!("pulse-telemetry: dropped log record: {err}");
            }),
        }
    }

    /// Resolve span contexts through `tracer`. Must be the tracer given to
    /// the `OpenTelemetryLayer` in the same subscriber.
    pub fn with_tracer(mut self, tracer: SdkTracer) -> Self {
        self.tracer = Some(tracer);
        self
    }

    pub fn with_error_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn(&SinkError) + Send + Sync + 'static,
    {
        self.on_error = Arc::new(hook);
        self
    }

    fn span_context<S>(&self, event: &Event<'_>, ctx: &Context<'_, S>) -> Option<SpanContext>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let tracer = self.tracer.as_ref()?;
        let span = ctx.event_span(event)?;
        let mut extensions = span.extensions_mut();
        let data = extensions.get_mut::<OtelData>()?;
        let cx = tracer.sampled_context(data);
        let span_context = cx.span().span_context().clone();
        Some(span_context)
    }
}

impl fmt::Debug for SinkLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkLayer")
            .field("sink", &self.sink)
            .field("has_tracer", &self.tracer.is_some())
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for SinkLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(&self, attrs: &Attributes<'_>, id: &Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = SpanFields::default();
        attrs.record(&mut FieldVisitor::new(&mut fields.0));
        span.extensions_mut().insert(fields);
    }

    fn on_record(&self, id: &Id, values: &Record<'_>, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<SpanFields>() {
            values.record(&mut FieldVisitor::new(&mut fields.0));
        }
    }

    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let level = *event.metadata().level();
        if !self.sink.enabled(level) {
            return;
        }

        let mut attributes = Vec::new();
        if let Some(scope) = ctx.event_scope(event) {
            for span in scope.from_root() {
                if let Some(fields) = span.extensions().get::<SpanFields>() {
                    attributes.extend(fields.0.iter().cloned());
                }
            }
        }

        let message = {
            let mut visitor = FieldVisitor::new(&mut attributes);
            event.record(&mut visitor);
            visitor.message
        };

        let metadata = event.metadata();
        let mut record = LogRecord::new(level, message.unwrap_or_default());
        record.attributes = attributes;
        if let Some(file) = metadata.file() {
            record = record.with_source(SourceLocation::new(
                file,
                metadata.line(),
                metadata.module_path(),
            ));
        }
        if let Some(span_context) = self.span_context(event, &ctx) {
            record = record.with_span_context(&span_context);
        }

        if let Err(err) = self.sink.handle(&record) {
            (self.on_error)(&err);
        }
    }
}

#[derive(Debug, Default)]
struct SpanFields(Vec<Attribute>);

struct FieldVisitor<'a> {
    message: Option<String>,
    attributes: &'a mut Vec<Attribute>,
}

impl<'a> FieldVisitor<'a> {
    fn new(attributes: &'a mut Vec<Attribute>) -> Self {
        Self {
            message: None,
            attributes,
        }
    }

    fn push(&mut self, field: &Field, value: impl Into<crate::sink::AttrValue>) {
        let name = field.name();
        // otel.* fields configure the exported span, log.* come from tracing-log
        if name.starts_with("otel.") || name.starts_with("log.") {
            return;
        }
        self.attributes.push(Attribute::new(name, value));
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(value.to_string());
        } else {
            self.push(field, value);
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.push(field, value);
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.push(field, value);
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.push(field, value);
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.push(field, value);
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        self.push(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == MESSAGE_FIELD {
            self.message = Some(format!("{value:?}"));
        } else {
            self.push(field, format!("{value:?}"));
        }
    }
}
