//! Observability bootstrap shared by pulse services.
//!
//! [`init_telemetry`] builds the service resource, one OTLP export pipeline
//! per signal, and a log handler chain that writes every record to the
//! console and, as a JSON body with trace correlation, to the collector. The
//! returned [`Telemetry`] owns all of it; call [`Telemetry::shutdown`] before
//! the process exits.

pub mod config;
pub mod error;
pub mod layer;
pub mod lifecycle;
pub mod logger;
pub mod pipeline;
pub mod propagation;
pub mod resource;
pub mod sink;

pub use crate::config::TelemetryConfig;
pub use error::{
    PipelineError, ShutdownError, ShutdownFailure, SinkError, TelemetryError, TelemetryResult,
};
pub use layer::SinkLayer;
pub use lifecycle::{init_telemetry, shutdown_pipelines, Telemetry};
pub use logger::Logger;
pub use pipeline::{
    ExportSettings, LogPipeline, MetricPipeline, PipelineStack, PipelineState, Pipelines, Signal,
    SignalPipeline, TracePipeline,
};
pub use resource::{ResourceDescriptor, DEFAULT_ENVIRONMENT};
pub use sink::{
    handler_chain, AttrValue, Attribute, ConsoleFormat, ConsoleSink, FanOutSink, JsonBodySink,
    LogRecord, LogSink, OtelBridgeSink, SharedSink,
};
