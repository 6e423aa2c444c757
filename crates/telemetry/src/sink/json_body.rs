use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::Level;

use super::enrich::{correlation_attributes, LEVEL_KEY, MESSAGE_KEY};
use super::record::{AttrValue, Attribute, LogRecord};
use super::{LogSink, SharedSink};
use crate::error::SinkError;

/// Replaces the message with a JSON document describing the whole record
/// before handing it to the wrapped sink.
#[derive(Debug, Clone)]
pub struct JsonBodySink {
    inner: SharedSink,
    service: Arc<str>,
}

impl JsonBodySink {
    pub fn new(inner: SharedSink, service: &str) -> Self {
        Self {
            inner,
            service: Arc::from(service),
        }
    }

    /// Level, message, correlation attributes, then the record's attributes.
    /// Later keys win on collision.
    pub fn body(&self, record: &LogRecord) -> Result<String, SinkError> {
        let mut payload: BTreeMap<&str, &AttrValue> = BTreeMap::new();
        let level = AttrValue::from(record.level.as_str());
        let message = AttrValue::from(record.message.as_str());
        payload.insert(LEVEL_KEY, &level);
        payload.insert(MESSAGE_KEY, &message);

        let correlation = correlation_attributes(&self.service, record);
        for attr in correlation.iter().chain(record.attributes.iter()) {
            payload.insert(attr.key.as_str(), &attr.value);
        }

        Ok(serde_json::to_string(&payload)?)
    }
}

impl LogSink for JsonBodySink {
    fn enabled(&self, level: Level) -> bool {
        self.inner.enabled(level)
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let body = self.body(record)?;

        let forwarded = LogRecord {
            timestamp: record.timestamp,
            level: record.level,
            message: body,
            attributes: correlation_attributes(&self.service, record),
            trace_id: record.trace_id,
            span_id: record.span_id,
            source: record.source,
        };
        self.inner.handle(&forwarded)
    }

    fn with_attributes(&self, attributes: &[Attribute]) -> SharedSink {
        Arc::new(Self {
            inner: self.inner.with_attributes(attributes),
            service: self.service.clone(),
        })
    }

    fn with_group(&self, name: &str) -> SharedSink {
        Arc::new(Self {
            inner: self.inner.with_group(name),
            service: self.service.clone(),
        })
    }
}
