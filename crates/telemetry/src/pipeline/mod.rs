//! Export pipelines: one OTLP exporter plus SDK provider per signal kind.

mod log;
mod metric;
mod trace;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::TelemetryConfig;
use crate::error::{PipelineError, ShutdownFailure, TelemetryError, TelemetryResult};
use crate::resource::ResourceDescriptor;

pub use log::{LogPipeline, SdkLogger};
pub use metric::MetricPipeline;
pub use trace::{SdkTracer, TracePipeline};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Constructed,
    Active,
    /// Terminal.
    Shutdown,
}

impl PipelineState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PipelineState::Constructed,
            1 => PipelineState::Active,
            _ => PipelineState::Shutdown,
        }
    }
}

/// Processor timeout for shutdowns not bound by a caller deadline.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Lock-free `Constructed -> Active -> Shutdown` state shared by the pipelines.
#[derive(Debug, Default)]
pub(crate) struct PipelineLifecycle(AtomicU8);

impl PipelineLifecycle {
    pub(crate) fn state(&self) -> PipelineState {
        PipelineState::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn activate(&self) {
        let _ = self
            .0
            .compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire);
    }

    pub(crate) fn mark_shutdown(&self) -> PipelineState {
        PipelineState::from_u8(self.0.swap(2, Ordering::AcqRel))
    }
}

/// Common control surface of the three signal pipelines.
pub trait SignalPipeline: Send + Sync + fmt::Debug {
    fn signal(&self) -> Signal;

    fn state(&self) -> PipelineState;

    /// Moves a constructed pipeline to `Active`. No effect after shutdown.
    fn activate(&self);

    fn force_flush(&self) -> Result<(), PipelineError>;

    /// Flushes buffered data and stops the provider, giving its processors
    /// at most `timeout`. A second call reports the provider's
    /// already-shutdown error.
    fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PipelineError>;

    fn shutdown(&self) -> Result<(), PipelineError> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT)
    }
}

/// Exporter connection settings shared by all three pipelines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSettings {
    endpoint: String,
    timeout: Duration,
    metric_interval: Duration,
}

impl ExportSettings {
    pub fn new(endpoint: &str, timeout: Duration, metric_interval: Duration) -> TelemetryResult<Self> {
        Ok(Self {
            endpoint: normalize_endpoint(endpoint)?,
            timeout,
            metric_interval,
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> TelemetryResult<Self> {
        Self::new(
            &config.exporter_endpoint,
            config.export_timeout(),
            config.metric_interval(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn metric_interval(&self) -> Duration {
        self.metric_interval
    }
}

/// Turns `host:port` into `http://host:port`. TLS endpoints are refused since
/// the collector transport is plaintext.
fn normalize_endpoint(endpoint: &str) -> TelemetryResult<String> {
    let endpoint = endpoint.trim();
    if endpoint.is_empty() {
        return Err(TelemetryError::InvalidEndpoint(
            "endpoint is empty".to_string(),
        ));
    }
    if endpoint.starts_with("https://") {
        return Err(TelemetryError::InvalidEndpoint(format!(
            "{endpoint}: TLS collector endpoints are not supported"
        )));
    }
    if endpoint.starts_with("http://") {
        return Ok(endpoint.to_string());
    }
    if endpoint.contains("://") {
        return Err(TelemetryError::InvalidEndpoint(format!(
            "{endpoint}: unsupported scheme"
        )));
    }
    Ok(format!("http://{endpoint}"))
}

/// Pipelines built so far during initialization. A construction failure
/// shuts the earlier ones down, newest first.
#[derive(Debug, Default)]
pub struct PipelineStack {
    built: Vec<Arc<dyn SignalPipeline>>,
}

impl PipelineStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build<P, F>(&mut self, construct: F) -> TelemetryResult<Arc<P>>
    where
        P: SignalPipeline + 'static,
        F: FnOnce() -> TelemetryResult<P>,
    {
        match construct() {
            Ok(pipeline) => {
                let pipeline = Arc::new(pipeline);
                self.built.push(pipeline.clone());
                Ok(pipeline)
            }
            Err(err) => {
                self.unwind();
                Err(err)
            }
        }
    }

    /// Shuts down every pipeline built so far in reverse order of construction.
    pub fn unwind(&mut self) -> Vec<ShutdownFailure> {
        let mut failures = Vec::new();
        while let Some(pipeline) = self.built.pop() {
            let signal = pipeline.signal();
            debug!(telemetry.signal = %signal, "Unwinding partially initialized pipeline");
            if let Err(error) = pipeline.shutdown() {
                warn!(telemetry.signal = %signal, error = %error, "Pipeline unwind failed");
                failures.push(ShutdownFailure { signal, error });
            }
        }
        failures
    }
}

/// The three signal pipelines of one process.
#[derive(Debug, Clone)]
pub struct Pipelines {
    pub traces: Arc<TracePipeline>,
    pub metrics: Arc<MetricPipeline>,
    pub logs: Arc<LogPipeline>,
}

impl Pipelines {
    pub fn new(traces: TracePipeline, metrics: MetricPipeline, logs: LogPipeline) -> Self {
        Self {
            traces: Arc::new(traces),
            metrics: Arc::new(metrics),
            logs: Arc::new(logs),
        }
    }

    /// Builds traces, metrics, then logs against the OTLP collector.
    pub fn build(resource: &ResourceDescriptor, settings: &ExportSettings) -> TelemetryResult<Self> {
        let mut stack = PipelineStack::new();
        let traces = stack.build(|| TracePipeline::build(resource, settings))?;
        let metrics = stack.build(|| MetricPipeline::build(resource, settings))?;
        let logs = stack.build(|| LogPipeline::build(resource, settings))?;
        Ok(Self {
            traces,
            metrics,
            logs,
        })
    }

    /// Pipelines in shutdown order: traces, metrics, logs.
    pub fn ordered(&self) -> Vec<Arc<dyn SignalPipeline>> {
        vec![
            self.traces.clone() as Arc<dyn SignalPipeline>,
            self.metrics.clone() as Arc<dyn SignalPipeline>,
            self.logs.clone() as Arc<dyn SignalPipeline>,
        ]
    }
}
