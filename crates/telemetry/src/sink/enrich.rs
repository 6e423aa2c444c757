//! Correlation attributes shared by the fan-out and JSON-body sinks.

use chrono::{DateTime, SecondsFormat, Utc};

use super::record::{Attribute, LogRecord};

pub const LEVEL_KEY: &str = "level";
pub const MESSAGE_KEY: &str = "msg";
pub const SERVICE_NAME_KEY: &str = "service.name";
pub const TIMESTAMP_KEY: &str = "timestamp";
pub const TRACE_ID_KEY: &str = "trace_id";
pub const SPAN_ID_KEY: &str = "span_id";

/// RFC 3339 in UTC with nanosecond precision.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// `service.name` and `timestamp`, then `trace_id` and `span_id` only when
/// the record carries them.
pub fn correlation_attributes(service: &str, record: &LogRecord) -> Vec<Attribute> {
    let mut attrs = Vec::with_capacity(4);
    attrs.push(Attribute::new(SERVICE_NAME_KEY, service));
    attrs.push(Attribute::new(
        TIMESTAMP_KEY,
        format_timestamp(&record.timestamp),
    ));
    if let Some(trace_id) = record.trace_id {
        attrs.push(Attribute::new(TRACE_ID_KEY, trace_id.to_string()));
    }
    if let Some(span_id) = record.span_id {
        attrs.push(Attribute::new(SPAN_ID_KEY, span_id.to_string()));
    }
    attrs
}
