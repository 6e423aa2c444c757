use std::fmt;
use std::time::Duration;

use opentelemetry_sdk::error::OTelSdkError;
use thiserror::Error;

use crate::pipeline::Signal;

/// Errors raised while building or installing the telemetry stack.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("failed to build {signal} exporter: {source}")]
    ExporterBuild {
        signal: Signal,
        #[source]
        source: opentelemetry_otlp::ExporterBuildError,
    },

    #[error("invalid collector endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid telemetry configuration: {0}")]
    Validation(String),

    #[error("failed to load telemetry configuration: {0}")]
    Configuration(#[from] config::ConfigError),

    #[error("failed to parse telemetry configuration: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid log filter: {0}")]
    Filter(String),

    #[error("failed to install global subscriber: {0}")]
    Subscriber(String),
}

impl TelemetryError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn exporter_build(signal: Signal, source: opentelemetry_otlp::ExporterBuildError) -> Self {
        Self::ExporterBuild { signal, source }
    }
}

/// Errors raised while handling a single log record.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to serialize log record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to write log record: {0}")]
    Io(#[from] std::io::Error),

    #[error("log writer lock poisoned")]
    Poisoned,

    #[error("log record rejected: {0}")]
    Rejected(String),
}

/// Failure of one provider's flush or shutdown.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Sdk(#[from] OTelSdkError),

    #[error("did not complete within {0:?}")]
    DeadlineExceeded(Duration),

    #[error("shutdown task failed: {0}")]
    Join(String),
}

#[derive(Debug)]
pub struct ShutdownFailure {
    pub signal: Signal,
    pub error: PipelineError,
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.signal, self.error)
    }
}

/// Every provider failure collected during a flush or shutdown, in pipeline order.
#[derive(Debug)]
pub struct ShutdownError {
    failures: Vec<ShutdownFailure>,
}

impl ShutdownError {
    pub(crate) fn new(failures: Vec<ShutdownFailure>) -> Self {
        Self { failures }
    }

    pub fn failures(&self) -> &[ShutdownFailure] {
        &self.failures
    }

    /// The first recorded failure.
    pub fn first(&self) -> Option<&ShutdownFailure> {
        self.failures.first()
    }

    pub fn signals(&self) -> Vec<Signal> {
        self.failures.iter().map(|f| f.signal).collect()
    }

    pub fn into_failures(self) -> Vec<ShutdownFailure> {
        self.failures
    }
}

impl fmt::Display for ShutdownError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} telemetry provider(s) failed",
            self.failures.len()
        )?;
        for (i, failure) in self.failures.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{sep}{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ShutdownError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.failures
            .first()
            .map(|f| &f.error as &(dyn std::error::Error + 'static))
    }
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
