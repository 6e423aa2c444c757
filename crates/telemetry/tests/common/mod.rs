#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use opentelemetry::logs::AnyValue;
use opentelemetry_sdk::logs::InMemoryLogExporter;
use opentelemetry_sdk::metrics::InMemoryMetricExporter;
use opentelemetry_sdk::trace::InMemorySpanExporter;
use pulse_telemetry::{
    ConsoleFormat, ConsoleSink, LogPipeline, MetricPipeline, Pipelines, ResourceDescriptor,
    Telemetry, TelemetryConfig, TracePipeline,
};

/// In-memory stand-in for stdout.
#[derive(Clone, Default)]
pub struct Buffer(Arc<Mutex<Vec<u8>>>);

impl Write for Buffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Buffer {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8(self.0.lock().unwrap().clone())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub struct Harness {
    pub telemetry: Telemetry,
    pub console: Buffer,
    pub spans: InMemorySpanExporter,
    pub logs: InMemoryLogExporter,
}

/// Telemetry for service `gateway` 1.0.0 with in-memory exporters and a
/// captured console.
pub fn harness(log_json: bool) -> Harness {
    let config = TelemetryConfig {
        log_json,
        ..TelemetryConfig::new("gateway", "1.0.0")
    };
    let resource = ResourceDescriptor::new(
        &config.service_name,
        &config.service_version,
        Some(config.resolved_environment()),
    );

    let spans = InMemorySpanExporter::default();
    let logs = InMemoryLogExporter::default();
    let pipelines = Pipelines::new(
        TracePipeline::with_exporter(&resource, spans.clone()),
        MetricPipeline::with_exporter(
            &resource,
            InMemoryMetricExporter::default(),
            config.metric_interval(),
        ),
        LogPipeline::with_exporter(&resource, logs.clone()),
    );

    let console = Buffer::default();
    let sink = ConsoleSink::new(ConsoleFormat::from_json_flag(log_json), console.clone())
        .with_service(&config.service_name);
    let telemetry = Telemetry::assemble(config, resource, pipelines, Arc::new(sink));

    Harness {
        telemetry,
        console,
        spans,
        logs,
    }
}

impl Harness {
    /// Bodies of every log record exported so far, parsed as JSON.
    pub fn exported_bodies(&self) -> Vec<serde_json::Value> {
        self.telemetry
            .pipelines()
            .logs
            .provider()
            .force_flush()
            .unwrap();

        self.logs
            .get_emitted_logs()
            .unwrap()
            .iter()
            .map(|log| match log.record.body() {
                Some(AnyValue::String(body)) => serde_json::from_str(body.as_str()).unwrap(),
                other => panic!("unexpected log body: {other:?}"),
            })
            .collect()
    }
}
