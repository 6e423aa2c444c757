use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::logs::LoggerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::logs::{BatchLogProcessor, LogExporter, SdkLoggerProvider};
use tracing::debug;

use super::{ExportSettings, PipelineLifecycle, PipelineState, Signal, SignalPipeline};
use crate::error::{PipelineError, TelemetryError, TelemetryResult};
use crate::resource::ResourceDescriptor;
use crate::sink::OtelBridgeSink;

pub type SdkLogger = <SdkLoggerProvider as opentelemetry::logs::LoggerProvider>::Logger;

/// Log pipeline: exporter behind a batch log processor.
#[derive(Debug)]
pub struct LogPipeline {
    provider: SdkLoggerProvider,
    lifecycle: PipelineLifecycle,
}

impl LogPipeline {
    pub fn build(resource: &ResourceDescriptor, settings: &ExportSettings) -> TelemetryResult<Self> {
        let exporter = opentelemetry_otlp::LogExporter::builder()
            .with_tonic()
            .with_endpoint(settings.endpoint())
            .with_timeout(settings.timeout())
            .build()
            .map_err(|e| TelemetryError::exporter_build(Signal::Logs, e))?;

        debug!(
            telemetry.signal = %Signal::Logs,
            telemetry.endpoint = settings.endpoint(),
            "Log exporter created"
        );
        Ok(Self::with_exporter(resource, exporter))
    }

    pub fn with_exporter<E>(resource: &ResourceDescriptor, exporter: E) -> Self
    where
        E: LogExporter + 'static,
    {
        let processor = BatchLogProcessor::builder(exporter).build();
        let provider = SdkLoggerProvider::builder()
            .with_log_processor(processor)
            .with_resource(resource.resource())
            .build();

        Self {
            provider,
            lifecycle: PipelineLifecycle::default(),
        }
    }

    pub fn provider(&self) -> &SdkLoggerProvider {
        &self.provider
    }

    pub fn logger(&self, name: impl Into<Cow<'static, str>>) -> SdkLogger {
        self.provider.logger(name)
    }

    /// Sink that forwards records to this pipeline's logger under `service`.
    pub fn bridge(&self, service: &str) -> OtelBridgeSink {
        OtelBridgeSink::new(self.logger(service.to_string()))
    }
}

impl SignalPipeline for LogPipeline {
    fn signal(&self) -> Signal {
        Signal::Logs
    }

    fn state(&self) -> PipelineState {
        self.lifecycle.state()
    }

    fn activate(&self) {
        self.lifecycle.activate();
    }

    fn force_flush(&self) -> Result<(), PipelineError> {
        self.provider.force_flush()?;
        Ok(())
    }

    fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PipelineError> {
        self.lifecycle.mark_shutdown();
        self.provider.shutdown_with_timeout(timeout)?;
        Ok(())
    }
}
