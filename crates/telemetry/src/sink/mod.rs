//! Structured log sinks and the console + remote handler chain.
//!
//! Every record goes through a [`FanOutSink`] which stamps correlation
//! attributes once and hands the record to each wrapped sink in order. The
//! remote side is wrapped in a [`JsonBodySink`] so the backend receives the
//! whole event as a JSON body as well as structured attributes.

mod bridge;
mod console;
pub mod enrich;
mod fanout;
mod json_body;
mod record;

use std::fmt;
use std::sync::Arc;

use tracing::Level;

use crate::error::SinkError;

pub use bridge::OtelBridgeSink;
pub use console::{ConsoleFormat, ConsoleSink};
pub use fanout::FanOutSink;
pub use json_body::JsonBodySink;
pub use record::{AttrValue, Attribute, LogRecord, SourceLocation};

pub type SharedSink = Arc<dyn LogSink>;

/// A destination for structured log records.
///
/// Implementations must be safe to call from many threads at once; the
/// scoping operations return new sinks and never mutate `self`.
pub trait LogSink: Send + Sync + fmt::Debug {
    fn enabled(&self, level: Level) -> bool;

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError>;

    /// A sink that adds `attributes` to every record it handles.
    fn with_attributes(&self, attributes: &[Attribute]) -> SharedSink;

    /// A sink that qualifies subsequent attribute keys with `name.`.
    fn with_group(&self, name: &str) -> SharedSink;
}

/// Console first, then the remote sink behind a JSON-body transform.
pub fn handler_chain(service: &str, console: SharedSink, remote: SharedSink) -> FanOutSink {
    let json_body: SharedSink = Arc::new(JsonBodySink::new(remote, service));
    FanOutSink::new(vec![console, json_body], service)
}

/// Attributes and group prefix accumulated through `with_attributes` and
/// `with_group`.
#[derive(Debug, Clone, Default)]
pub(crate) struct Scope {
    attributes: Vec<Attribute>,
    prefix: String,
}

impl Scope {
    pub(crate) fn with_attributes(&self, attributes: &[Attribute]) -> Self {
        let mut scoped = self.clone();
        scoped.attributes.extend(
            attributes
                .iter()
                .map(|attr| Attribute::new(self.qualify(&attr.key), attr.value.clone())),
        );
        scoped
    }

    pub(crate) fn with_group(&self, name: &str) -> Self {
        let mut scoped = self.clone();
        if !name.is_empty() {
            scoped.prefix.push_str(name);
            scoped.prefix.push('.');
        }
        scoped
    }

    pub(crate) fn qualify(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Scope attributes followed by the record's own, qualified by the group.
    pub(crate) fn resolve(&self, record: &LogRecord) -> Vec<Attribute> {
        let mut attrs = Vec::with_capacity(self.attributes.len() + record.attributes.len());
        attrs.extend(self.attributes.iter().cloned());
        attrs.extend(
            record
                .attributes
                .iter()
                .map(|attr| Attribute::new(self.qualify(&attr.key), attr.value.clone())),
        );
        attrs
    }
}
