mod common;

use common::harness;
use opentelemetry::trace::TraceContextExt;
use pulse_telemetry::{Attribute, SinkError};
use tracing::{info, info_span};
use tracing_opentelemetry::OpenTelemetrySpanExt;

#[test]
fn test_service_started_without_trace_context() {
    let h = harness(false);
    assert_eq!(h.telemetry.resource().environment(), "development");

    h.telemetry
        .logger()
        .info("service_started", &[Attribute::new("port", "8080")])
        .unwrap();

    let lines = h.console.lines();
    assert_eq!(lines.len(), 1);
    let line = &lines[0];
    assert!(line.contains("service=gateway"));
    assert!(line.contains("msg=service_started"));
    assert!(line.contains("port=8080"));
    assert!(line.contains("service.name=gateway"));
    assert!(!line.contains("trace_id"));
    assert!(!line.contains("span_id"));

    let bodies = h.exported_bodies();
    assert_eq!(bodies.len(), 1);
    let body = &bodies[0];
    assert_eq!(body["level"], "INFO");
    assert_eq!(body["msg"], "service_started");
    assert_eq!(body["service.name"], "gateway");
    assert_eq!(body["port"], "8080");
    assert!(body["timestamp"].is_string());
    assert!(body.get("trace_id").is_none());
    assert!(body.get("span_id").is_none());
}

#[test]
fn test_json_console_output() {
    let h = harness(true);

    h.telemetry
        .logger()
        .warn("disk_low", &[Attribute::new("free_mb", 512i64)])
        .unwrap();

    let lines = h.console.lines();
    let line: serde_json::Value = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(line["level"], "WARN");
    assert_eq!(line["msg"], "disk_low");
    assert_eq!(line["free_mb"], 512);
    assert_eq!(line["service"], "gateway");
}

#[test]
fn test_tracing_events_carry_span_correlation() {
    let h = harness(false);
    let subscriber = h.telemetry.subscriber().unwrap();

    let mut expected_trace_id = String::new();
    tracing::subscriber::with_default(subscriber, || {
        let span = info_span!("handle_request", route = "/health");
        span.in_scope(|| info!(status = 200u64, "request_handled"));
        expected_trace_id = span.context().span().span_context().trace_id().to_string();
        drop(span);
        info!("idle");
    });

    let lines = h.console.lines();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].contains("msg=request_handled"));
    assert!(lines[0].contains("route=/health"));
    assert!(lines[0].contains(&format!("trace_id={expected_trace_id}")));
    assert!(lines[0].contains("span_id="));
    assert!(!lines[1].contains("trace_id"));

    let bodies = h.exported_bodies();
    assert_eq!(bodies[0]["trace_id"], expected_trace_id.as_str());
    assert_eq!(bodies[0]["status"], 200);
    assert!(bodies[1].get("trace_id").is_none());

    let logs = h.logs.get_emitted_logs().unwrap();
    let trace_context = logs[0].record.trace_context().unwrap();
    assert_eq!(trace_context.trace_id.to_string(), expected_trace_id);
    assert!(logs[1].record.trace_context().is_none());

    h.telemetry
        .pipelines()
        .traces
        .provider()
        .force_flush()
        .unwrap();
    let spans = h.spans.get_finished_spans().unwrap();
    assert!(spans
        .iter()
        .any(|span| span.name == "handle_request"
            && span.span_context.trace_id().to_string() == expected_trace_id));
}

#[test]
fn test_serialization_failure_stops_after_console() {
    let h = harness(false);

    let result = h
        .telemetry
        .logger()
        .info("ratio", &[Attribute::new("value", f64::NAN)]);

    assert!(matches!(result, Err(SinkError::Serialization(_))));
    assert_eq!(h.console.lines().len(), 1);
    assert!(h.exported_bodies().is_empty());
}

#[test]
fn test_scoped_logger_reaches_both_sinks() {
    let h = harness(false);
    let logger = h
        .telemetry
        .logger()
        .with(&[Attribute::new("request_id", "r-42")])
        .with_group("http");

    logger
        .info("served", &[Attribute::new("status", 200i64)])
        .unwrap();

    let lines = h.console.lines();
    assert!(lines[0].contains("request_id=r-42"));
    assert!(lines[0].contains("http.status=200"));

    let bodies = h.exported_bodies();
    assert_eq!(bodies[0]["status"], 200);

    let logs = h.logs.get_emitted_logs().unwrap();
    let request_id = logs[0]
        .record
        .attributes_iter()
        .find(|(key, _)| key.as_str() == "request_id")
        .map(|(_, value)| value.clone());
    assert_eq!(
        request_id,
        Some(opentelemetry::logs::AnyValue::from("r-42".to_string()))
    );

    let filepath = logs[0]
        .record
        .attributes_iter()
        .find(|(key, _)| key.as_str() == "code.filepath")
        .map(|(_, value)| value.clone());
    assert_eq!(filepath, Some(opentelemetry::logs::AnyValue::from(file!())));
}
