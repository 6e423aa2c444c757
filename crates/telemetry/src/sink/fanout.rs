use std::sync::Arc;

use tracing::Level;

use super::enrich::correlation_attributes;
use super::record::{Attribute, LogRecord};
use super::{LogSink, SharedSink};
use crate::error::SinkError;

/// Forwards each record to every wrapped sink, in order.
#[derive(Debug, Clone)]
pub struct FanOutSink {
    sinks: Arc<[SharedSink]>,
    service: Arc<str>,
}

impl FanOutSink {
    pub fn new(sinks: Vec<SharedSink>, service: &str) -> Self {
        Self {
            sinks: sinks.into(),
            service: Arc::from(service),
        }
    }

    pub fn sinks(&self) -> &[SharedSink] {
        &self.sinks
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn map_sinks(&self, scope: impl Fn(&SharedSink) -> SharedSink) -> SharedSink {
        Arc::new(Self {
            sinks: self.sinks.iter().map(scope).collect(),
            service: self.service.clone(),
        })
    }
}

impl LogSink for FanOutSink {
    fn enabled(&self, level: Level) -> bool {
        self.sinks.iter().any(|sink| sink.enabled(level))
    }

    /// Adds correlation attributes once, then stops at the first sink error.
    fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
        let mut enriched = record.clone();
        enriched
            .attributes
            .extend(correlation_attributes(&self.service, record));

        for sink in self.sinks.iter() {
            sink.handle(&enriched)?;
        }
        Ok(())
    }

    fn with_attributes(&self, attributes: &[Attribute]) -> SharedSink {
        self.map_sinks(|sink| sink.with_attributes(attributes))
    }

    fn with_group(&self, name: &str) -> SharedSink {
        self.map_sinks(|sink| sink.with_group(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct Journal {
        entries: Mutex<Vec<(String, LogRecord)>>,
    }

    #[derive(Debug)]
    struct StubSink {
        name: String,
        max_level: Level,
        fail: bool,
        journal: Arc<Journal>,
        scope: Vec<Attribute>,
    }

    impl StubSink {
        fn shared(name: &str, max_level: Level, fail: bool, journal: &Arc<Journal>) -> SharedSink {
            Arc::new(Self {
                name: name.to_string(),
                max_level,
                fail,
                journal: journal.clone(),
                scope: Vec::new(),
            })
        }
    }

    impl LogSink for StubSink {
        fn enabled(&self, level: Level) -> bool {
            level <= self.max_level
        }

        fn handle(&self, record: &LogRecord) -> Result<(), SinkError> {
            let record = record.clone().with_attributes(self.scope.clone());
            self.journal
                .entries
                .lock()
                .unwrap()
                .push((self.name.clone(), record));
            if self.fail {
                return Err(SinkError::Rejected(self.name.clone()));
            }
            Ok(())
        }

        fn with_attributes(&self, attributes: &[Attribute]) -> SharedSink {
            let mut scope = self.scope.clone();
            scope.extend_from_slice(attributes);
            Arc::new(Self {
                name: self.name.clone(),
                max_level: self.max_level,
                fail: self.fail,
                journal: self.journal.clone(),
                scope,
            })
        }

        fn with_group(&self, name: &str) -> SharedSink {
            Arc::new(Self {
                name: format!("{}/{}", self.name, name),
                max_level: self.max_level,
                fail: self.fail,
                journal: self.journal.clone(),
                scope: self.scope.clone(),
            })
        }
    }

    fn names(journal: &Journal) -> Vec<String> {
        journal
            .entries
            .lock()
            .unwrap()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    #[test]
    fn test_dispatches_to_every_sink_in_order() {
        let journal = Arc::new(Journal::default());
        let fanout = FanOutSink::new(
            vec![
                StubSink::shared("console", Level::INFO, false, &journal),
                StubSink::shared("remote", Level::TRACE, false, &journal),
                StubSink::shared("audit", Level::WARN, false, &journal),
            ],
            "gateway",
        );

        fanout
            .handle(&LogRecord::new(Level::INFO, "service_started"))
            .unwrap();

        assert_eq!(names(&journal), vec!["console", "remote", "audit"]);
        for (_, record) in journal.entries.lock().unwrap().iter() {
            assert_eq!(
                record.attribute("service.name").and_then(|v| v.as_str()),
                Some("gateway")
            );
            assert!(record.attribute("timestamp").is_some());
            assert!(record.attribute("trace_id").is_none());
            assert!(record.attribute("span_id").is_none());
        }
    }

    #[test]
    fn test_stops_at_first_failing_sink() {
        let journal = Arc::new(Journal::default());
        let fanout = FanOutSink::new(
            vec![
                StubSink::shared("console", Level::TRACE, false, &journal),
                StubSink::shared("remote", Level::TRACE, true, &journal),
                StubSink::shared("audit", Level::TRACE, false, &journal),
            ],
            "gateway",
        );

        let err = fanout
            .handle(&LogRecord::new(Level::ERROR, "boom"))
            .unwrap_err();

        assert!(matches!(err, SinkError::Rejected(ref name) if name == "remote"));
        assert_eq!(names(&journal), vec!["console", "remote"]);
    }

    #[test]
    fn test_enabled_is_any_sink_enabled() {
        let journal = Arc::new(Journal::default());
        let fanout = FanOutSink::new(
            vec![
                StubSink::shared("console", Level::WARN, false, &journal),
                StubSink::shared("remote", Level::DEBUG, false, &journal),
            ],
            "gateway",
        );

        assert!(fanout.enabled(Level::ERROR));
        assert!(fanout.enabled(Level::INFO));
        assert!(fanout.enabled(Level::DEBUG));
        assert!(!fanout.enabled(Level::TRACE));

        let empty = FanOutSink::new(Vec::new(), "gateway");
        assert!(!empty.enabled(Level::ERROR));
    }

    #[test]
    fn test_scoping_applies_to_every_sink() {
        let journal = Arc::new(Journal::default());
        let fanout = FanOutSink::new(
            vec![
                StubSink::shared("console", Level::TRACE, false, &journal),
                StubSink::shared("remote", Level::TRACE, false, &journal),
            ],
            "gateway",
        );

        let scoped = fanout
            .with_group("http")
            .with_attributes(&[Attribute::new("request_id", "r-1")]);
        scoped.handle(&LogRecord::new(Level::INFO, "served")).unwrap();

        assert_eq!(names(&journal), vec!["console/http", "remote/http"]);
        for (_, record) in journal.entries.lock().unwrap().iter() {
            assert_eq!(
                record.attribute("request_id").and_then(|v| v.as_str()),
                Some("r-1")
            );
            assert_eq!(
                record.attribute("service.name").and_then(|v| v.as_str()),
                Some("gateway")
            );
        }
    }
}
