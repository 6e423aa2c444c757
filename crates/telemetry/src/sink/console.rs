use std::fmt;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tracing::Level;

use super::enrich::format_timestamp;
use super::record::{AttrValue, Attribute, LogRecord};
use super::{LogSink, Scope, SharedSink};
use crate::error::SinkError;

const SERVICE_KEY: &str = "service";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleFormat {
    /// `key=value` pairs
    Text,
    /// One JSON object per line
    Json,
}

impl ConsoleFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            ConsoleFormat::Json
        } else {
            ConsoleFormat::Text
        }
    }
}

type SharedWriter = Arc<Mutex<Box<dyn Write + Send>>>;

/// Writes one line per record to stdout or any other writer.
#[derive(Clone)]
pub struct ConsoleSink {
    format: ConsoleFormat,
    max_level: Level,
    service: Option<Arc<str>>,
    writer: SharedWriter,
    scope: Scope,
}

impl ConsoleSink {
    pub fn new<W>(format: ConsoleFormat, writer: W) -> Self
    where
        W: Write + Send + 'static,
    {
        Self {
            format,
            max_level: Level::INFO,
            service: None,
            writer: Arc::new(Mutex::new(Box::new(writer))),
            scope: Scope::default(),
        }
    }

    pub fn stdout(format: ConsoleFormat) -> Self {
        Self::new(format, io::stdout())
    }

    /// Adds `service=<name>` to every line.
    pub fn with_service(mut self, service: &str) -> Self {
        self.service = Some(Arc::from(service));
        self
    }

    pub fn with_max_level(mut self, level: Level) -> Self {
        self.max_level = level;
        self
    }

    pub fn format(&self) -> ConsoleFormat {
        self.format
    }

    fn render(&self, record: &LogRecord) -> Result<String, SinkError> {
        let mut attrs = self.scope.resolve(record);
        if let Some(service) = &self.service {
            attrs.push(Attribute::new(SERVICE_KEY, service.as_ref()));
        }

        match self.format {
            ConsoleFormat::Text => Ok(render_text(record, &attrs)),
            ConsoleFormat::Json => Ok(serde_json::to_string(&JsonLine {
                record,
                attrs: &attrs,
            })?),
        }
    }
}

impl fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("format", &self.format)
            .field("max_level", &self.max_level)
            .field("service", &self.service)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl LogSink for ConsoleSink {
    fn enabled(&self, level: Level) -> bool {
        level <= self.max_level
    }

    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        if !self.enabled(record.level) {
            return Ok(());
        }

        let mut line = self.render(record)?;
        line.push('\n');

        let mut writer = self.writer.lock().map_err(|_| SinkError::Poisoned)?;
        writer.write_all(line.as_bytes())?;
        writer.flush()?;
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

fn render_text(record: &LogRecord, attrs: &[Attribute]) -> String {
    let mut line = format!(
        "time={} level={} msg={}",
        format_timestamp(&record.timestamp),
        record.level.as_str(),
        quote_if_needed(&record.message)
    );
    for attr in attrs {
        let value = match &attr.value {
            AttrValue::Str(s) => quote_if_needed(s),
            other => other.to_string(),
        };
        line.push(' ');
        line.push_str(&quote_if_needed(&attr.key));
        line.push('=');
        line.push_str(&value);
    }
    line
}

fn quote_if_needed(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c == '=' || c == '"');
    if needs_quotes {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

struct JsonLine<'a> {
    record: &'a LogRecord,
    attrs: &'a [Attribute],
}

impl Serialize for JsonLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(3 + self.attrs.len()))?;
        map.serialize_entry("time", &format_timestamp(&self.record.timestamp))?;
        map.serialize_entry("level", self.record.level.as_str())?;
        map.serialize_entry("msg", &self.record.message)?;
        for attr in self.attrs {
            map.serialize_entry(&attr.key, &attr.value)?;
        }
        map.end()
    }
}
