use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

use opentelemetry::logs::{AnyValue, LogRecord as _, Logger as _, Severity};
use opentelemetry::trace::TraceFlags;
use opentelemetry::Key;
use tracing::Level;

use super::record::{AttrValue, Attribute, LogRecord, SourceLocation};
use super::{LogSink, Scope, SharedSink};
use crate::error::SinkError;
use crate::pipeline::SdkLogger;

pub const CODE_FILEPATH: &str = "code.filepath";
pub const CODE_LINENO: &str = "code.lineno";
pub const CODE_NAMESPACE: &str = "code.namespace";

/// Emits records through the log pipeline as OpenTelemetry log records.
#[derive(Clone)]
pub struct OtelBridgeSink {
    logger: Arc<SdkLogger>,
    max_level: Level,
    scope: Scope,
}

impl OtelBridgeSink {
    pub fn new(logger: SdkLogger) -> Self {
        Self {
            logger: Arc::new(logger),
            max_level: Level::TRACE,
            scope: Scope::default(),
        }
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }
}

impl fmt::Debug for OtelBridgeSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OtelBridgeSink")
            .field("max_level", &self.max_level)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl LogSink for OtelBridgeSink {
    fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        if !self.enabled(record.level) {
            return Ok(());
        }

        let mut otel_record = self.logger.create_log_record();
        otel_record.set_timestamp(SystemTime::from(record.timestamp));
        otel_record.set_observed_timestamp(SystemTime::now());
        otel_record.set_severity_number(severity(record.level));
        otel_record.set_severity_text(record.level.as_str());
        otel_record.set_body(AnyValue::from(record.message.clone()));
        otel_record.add_attributes(
            self.scope
                .resolve(record)
                .into_iter()
                .map(|attr| (Key::new(attr.key), any_value(attr.value))),
        );
        if let Some(source) = &record.source {
            otel_record.add_attributes(source_attributes(source));
        }
        if let (Some(trace_id), Some(span_id)) = (record.trace_id, record.span_id) {
            otel_record.set_trace_context(trace_id, span_id, Some(TraceFlags::SAMPLED));
        }

        self.logger.emit(otel_record);
        Ok(())
    }

    fn with_attributes(&self, attributes: &[Attribute]) -> SharedSink {
        let mut sink = self.clone();
        sink.scope = self.scope.with_attributes(attributes);
        Arc::new(sink)
    }

    fn with_group(&self, name: &str) -> SharedSink {
        let mut sink = self.clone();
        sink.scope = self.scope.with_group(name);
        Arc::new(sink)
    }
}

fn severity(level: Level) -> Severity {
    match level {
        Level::TRACE => Severity::Trace,
        Level::DEBUG => Severity::Debug,
        Level::INFO => Severity::Info,
        Level::WARN => Severity::Warn,
        _ => Severity::Error,
    }
}

fn source_attributes(source: &SourceLocation) -> Vec<(Key, AnyValue)> {
    let mut attrs = vec![(Key::from_static_str(CODE_FILEPATH), AnyValue::from(source.file))];
    if let Some(line) = source.line {
        attrs.push((Key::from_static_str(CODE_LINENO), AnyValue::from(i64::from(line))));
    }
    if let Some(module_path) = source.module_path {
        attrs.push((Key::from_static_str(CODE_NAMESPACE), AnyValue::from(module_path)));
    }
    attrs
}

fn any_value(value: AttrValue) -> AnyValue {
    match value {
        AttrValue::Str(v) => AnyValue::from(v),
        AttrValue::I64(v) => AnyValue::from(v),
        AttrValue::U64(v) => match i64::try_from(v) {
            Ok(v) => AnyValue::from(v),
            Err(_) => AnyValue::from(v.to_string()),
        },
        AttrValue::F64(v) => AnyValue::from(v),
        AttrValue::Bool(v) => AnyValue::from(v),
    }
}
