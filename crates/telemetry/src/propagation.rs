//! W3C trace-context and baggage propagation across process boundaries.

use std::collections::HashMap;

use opentelemetry::propagation::{Extractor, Injector, TextMapCompositePropagator};
use opentelemetry::{global, Context};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};

/// Composite of `traceparent`/`tracestate` and `baggage` propagation.
pub fn composite_propagator() -> TextMapCompositePropagator {
    TextMapCompositePropagator::new(vec![
        Box::new(TraceContextPropagator::new()),
        Box::new(BaggagePropagator::new()),
    ])
}

/// Registers [`composite_propagator`] as the process-wide text map propagator.
pub fn install_propagator() {
    global::set_text_map_propagator(composite_propagator());
}

/// Writes `cx` into `headers` with the global propagator.
pub fn inject_context(cx: &Context, headers: &mut HashMap<String, String>) {
    let mut injector = HeaderInjector(headers);
    global::get_text_map_propagator(|propagator| propagator.inject_context(cx, &mut injector));
}

/// Reads a remote context out of `headers` with the global propagator.
pub fn extract_context(headers: &HashMap<String, String>) -> Context {
    let extractor = HeaderExtractor(headers);
    global::get_text_map_propagator(|propagator| propagator.extract(&extractor))
}

// Header names are matched case-insensitively.
struct HeaderExtractor<'a>(&'a HashMap<String, String>);

impl Extractor for HeaderExtractor<'_> {
    fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.0.keys().map(|k| k.as_str()).collect()
    }
}

struct HeaderInjector<'a>(&'a mut HashMap<String, String>);

impl Injector for HeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key.to_ascii_lowercase(), value);
    }
}
