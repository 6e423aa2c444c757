use std::time::Duration;

use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::exporter::PushMetricExporter;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use tracing::debug;

use super::{ExportSettings, PipelineLifecycle, PipelineState, Signal, SignalPipeline};
use crate::error::{PipelineError, TelemetryError, TelemetryResult};
use crate::resource::ResourceDescriptor;

/// Metric pipeline: exporter behind a periodic reader.
#[derive(Debug)]
pub struct MetricPipeline {
    provider: SdkMeterProvider,
    interval: Duration,
    lifecycle: PipelineLifecycle,
}

impl MetricPipeline {
    pub fn build(resource: &ResourceDescriptor, settings: &ExportSettings) -> TelemetryResult<Self> {
        let exporter = opentelemetry_otlp::MetricExporter::builder()
            .with_tonic()
            .with_endpoint(settings.endpoint())
            .with_timeout(settings.timeout())
            .build()
            .map_err(|e| TelemetryError::exporter_build(Signal::Metrics, e))?;

        debug!(
            telemetry.signal = %Signal::Metrics,
            telemetry.endpoint = settings.endpoint(),
            telemetry.interval_ms = settings.metric_interval().as_millis() as u64,
            "Metric exporter created"
        );
        Ok(Self::with_exporter(
            resource,
            exporter,
            settings.metric_interval(),
        ))
    }

    pub fn with_exporter<E>(resource: &ResourceDescriptor, exporter: E, interval: Duration) -> Self
    where
        E: PushMetricExporter + 'static,
    {
        let reader = PeriodicReader::builder(exporter)
            .with_interval(interval)
            .build();
        let provider = SdkMeterProvider::builder()
            .with_reader(reader)
            .with_resource(resource.resource())
            .build();

        Self {
            provider,
            interval,
            lifecycle: PipelineLifecycle::default(),
        }
    }

    pub fn provider(&self) -> &SdkMeterProvider {
        &self.provider
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.provider.meter(name)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl SignalPipeline for MetricPipeline {
    fn signal(&self) -> Signal {
        Signal::Metrics
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
