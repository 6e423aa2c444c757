use std::fmt;

use chrono::{DateTime, Utc};
use opentelemetry::trace::{SpanContext, SpanId, TraceId};
use serde::ser::Error as _;
use serde::{Serialize, Serializer};
use tracing::Level;

/// A structured attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Str(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
}

impl AttrValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl Serialize for AttrValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AttrValue::Str(v) => serializer.serialize_str(v),
            AttrValue::I64(v) => serializer.serialize_i64(*v),
            AttrValue::U64(v) => serializer.serialize_u64(*v),
            AttrValue::F64(v) if v.is_finite() => serializer.serialize_f64(*v),
            AttrValue::F64(v) => Err(S::Error::custom(format!(
                "unsupported floating point value: {v}"
            ))),
            AttrValue::Bool(v) => serializer.serialize_bool(*v),
        }
    }
}

impl fmt::Display for AttrValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttrValue::Str(v) => f.write_str(v),
            AttrValue::I64(v) => write!(f, "{v}"),
            AttrValue::U64(v) => write!(f, "{v}"),
            AttrValue::F64(v) => write!(f, "{v}"),
            AttrValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::Str(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::Str(value)
    }
}

impl From<i64> for AttrValue {
    fn from(value: i64) -> Self {
        AttrValue::I64(value)
    }
}

impl From<i32> for AttrValue {
    fn from(value: i32) -> Self {
        AttrValue::I64(value.into())
    }
}

impl From<u64> for AttrValue {
    fn from(value: u64) -> Self {
        AttrValue::U64(value)
    }
}

impl From<u32> for AttrValue {
    fn from(value: u32) -> Self {
        AttrValue::U64(value.into())
    }
}

impl From<f64> for AttrValue {
    fn from(value: f64) -> Self {
        AttrValue::F64(value)
    }
}

impl From<bool> for AttrValue {
    fn from(value: bool) -> Self {
        AttrValue::Bool(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    pub key: String,
    pub value: AttrValue,
}

impl Attribute {
    pub fn new(key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Where in the program a record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: Option<u32>,
    pub module_path: Option<&'static str>,
}

impl SourceLocation {
    pub fn new(file: &'static str, line: Option<u32>, module_path: Option<&'static str>) -> Self {
        Self {
            file,
            line,
            module_path,
        }
    }

    /// Location of the caller of a `#[track_caller]` function.
    #[track_caller]
    pub fn caller() -> Self {
        let location = std::panic::Location::caller();
        Self::new(location.file(), Some(location.line()), None)
    }
}

/// One structured log event on its way through the sink chain.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub attributes: Vec<Attribute>,
    pub trace_id: Option<TraceId>,
    pub span_id: Option<SpanId>,
    pub source: Option<SourceLocation>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            attributes: Vec::new(),
            trace_id: None,
            span_id: None,
            source: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_source(mut self, source: SourceLocation) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.attributes.push(Attribute::new(key, value));
        self
    }

    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = Attribute>) -> Self {
        self.attributes.extend(attributes);
        self
    }

    /// Copies trace and span ids from `span_context` when it is valid and sampled.
    pub fn with_span_context(mut self, span_context: &SpanContext) -> Self {
        if span_context.is_valid() && span_context.is_sampled() {
            self.trace_id = Some(span_context.trace_id());
            self.span_id = Some(span_context.span_id());
        } else {
            self.trace_id = None;
            self.span_id = None;
        }
        self
    }

    /// Last value recorded under `key`.
    pub fn attribute(&self, key: &str) -> Option<&AttrValue> {
        self.attributes
            .iter()
            .rev()
            .find(|attr| attr.key == key)
            .map(|attr| &attr.value)
    }
}
