use std::borrow::Cow;
use std::time::Duration;

use opentelemetry::trace::TracerProvider as _;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::trace::{BatchSpanProcessor, SdkTracerProvider, SpanExporter};
use tracing::debug;

use super::{ExportSettings, PipelineLifecycle, PipelineState, Signal, SignalPipeline};
use crate::error::{PipelineError, TelemetryError, TelemetryResult};
use crate::resource::ResourceDescriptor;

pub type SdkTracer = <SdkTracerProvider as opentelemetry::trace::TracerProvider>::Tracer;

/// Span pipeline: exporter behind a batch span processor.
#[derive(Debug)]
pub struct TracePipeline {
    provider: SdkTracerProvider,
    lifecycle: PipelineLifecycle,
}

impl TracePipeline {
    pub fn build(resource: &ResourceDescriptor, settings: &ExportSettings) -> TelemetryResult<Self> {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(settings.endpoint())
            .with_timeout(settings.timeout())
            .build()
            .map_err(|e| TelemetryError::exporter_build(Signal::Traces, e))?;

        debug!(
            telemetry.signal = %Signal::Traces,
            telemetry.endpoint = settings.endpoint(),
            "Trace exporter created"
        );
        Ok(Self::with_exporter(resource, exporter))
    }

    pub fn with_exporter<E>(resource: &ResourceDescriptor, exporter: E) -> Self
    where
        E: SpanExporter + 'static,
    {
        let processor = BatchSpanProcessor::builder(exporter).build();
        let provider = SdkTracerProvider::builder()
            .with_span_processor(processor)
            .with_resource(resource.resource())
            .build();

        Self {
            provider,
            lifecycle: PipelineLifecycle::default(),
        }
    }

    pub fn provider(&self) -> &SdkTracerProvider {
        &self.provider
    }

    pub fn tracer(&self, name: impl Into<Cow<'static, str>>) -> SdkTracer {
        self.provider.tracer(name)
    }
}

impl SignalPipeline for TracePipeline {
    fn signal(&self) -> Signal {
        Signal::Traces
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
