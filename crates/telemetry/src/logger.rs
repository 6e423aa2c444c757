use opentelemetry::trace::TraceContextExt;
use opentelemetry::Context;
use tracing::Level;

use crate::error::SinkError;
use crate::sink::{Attribute, LogRecord, SharedSink, SourceLocation};

/// Explicit logging handle over a sink chain.
///
/// Unlike `tracing` macros, every call returns the sink's error to the caller.
#[derive(Debug, Clone)]
pub struct Logger {
    sink: SharedSink,
}

impl Logger {
    pub fn new(sink: SharedSink) -> Self {
        Self { sink }
    }

    /// A logger whose records all carry `attributes`.
    pub fn with(&self, attributes: &[Attribute]) -> Self {
        Self {
            sink: self.sink.with_attributes(attributes),
        }
    }

    pub fn with_group(&self, name: &str) -> Self {
        Self {
            sink: self.sink.with_group(name),
        }
    }

    pub fn enabled(&self, level: Level) -> bool {
        self.sink.enabled(level)
    }

    pub fn sink(&self) -> &SharedSink {
        &self.sink
    }

    #[track_caller]
    pub fn log(&self, level: Level, message: &str, attributes: &[Attribute]) -> Result<(), SinkError> {
        self.emit(level, message, attributes, None)
    }

    /// Logs with the trace correlation of `cx`.
    #[track_caller]
    pub fn log_in_context(
        &self,
        cx: &Context,
        level: Level,
        message: &str,
        attributes: &[Attribute],
    ) -> Result<(), SinkError> {
        self.emit(level, message, attributes, Some(cx))
    }

    #[track_caller]
    pub fn debug(&self, message: &str, attributes: &[Attribute]) -> Result<(), SinkError> {
        self.log(Level::DEBUG, message, attributes)
    }

    #[track_caller]
    pub fn info(&self, message: &str, attributes: &[Attribute]) -> Result<(), SinkError> {
        self.log(Level::INFO, message, attributes)
    }

    #[track_caller]
    pub fn warn(&self, message: &str, attributes: &[Attribute]) -> Result<(), SinkError> {
        self.log(Level::WARN, message, attributes)
    }

    #[track_caller]
    pub fn error(&self, message: &str, attributes: &[Attribute]) -> Result<(), SinkError> {
        self.log(Level::ERROR, message, attributes)
    }

    #[track_caller]
    fn emit(
        &self,
        level: Level,
        message: &str,
        attributes: &[Attribute],
        cx: Option<&Context>,
    ) -> Result<(), SinkError> {
        if !self.sink.enabled(level) {
            return Ok(());
        }

        let mut record = LogRecord::new(level, message)
            .with_attributes(attributes.iter().cloned())
            .with_source(SourceLocation::caller());
        if let Some(cx) = cx {
            record = record.with_span_context(cx.span().span_context());
        }
        self.sink.handle(&record)
    }
}
