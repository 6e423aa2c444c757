use std::sync::Arc;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Meter;
use tokio::time::{timeout, Instant};
use tracing::{debug, info, warn, Subscriber};
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::filter::{Directive, EnvFilter};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::TelemetryConfig;
use crate::error::{PipelineError, ShutdownError, ShutdownFailure, TelemetryError, TelemetryResult};
use crate::layer::SinkLayer;
use crate::logger::Logger;
use crate::pipeline::{ExportSettings, Pipelines, SdkTracer, SignalPipeline};
use crate::propagation::install_propagator;
use crate::resource::ResourceDescriptor;
use crate::sink::{handler_chain, ConsoleFormat, ConsoleSink, SharedSink};

/// Targets of the export stack. Logging from these would feed back into the
/// log pipeline.
const SUPPRESSED_TARGETS: &[&str] = &[
    "opentelemetry",
    "opentelemetry_sdk",
    "opentelemetry_otlp",
    "tonic",
    "h2",
    "hyper",
    "tower",
];

/// Owns the resource identity, the three signal pipelines and the root of
/// the log sink chain for one process.
#[derive(Debug)]
pub struct Telemetry {
    config: TelemetryConfig,
    resource: ResourceDescriptor,
    pipelines: Pipelines,
    root: SharedSink,
}

impl Telemetry {
    /// Builds resource, trace, metric and log pipelines, then the handler
    /// chain. Must be called from within a Tokio runtime.
    pub fn init(config: &TelemetryConfig) -> TelemetryResult<Self> {
        config.validate()?;
        let console = ConsoleSink::stdout(ConsoleFormat::from_json_flag(config.log_json))
            .with_service(&config.service_name)
            .with_max_level(config.console_max_level()?);
        let settings = ExportSettings::from_config(config)?;

        let resource = ResourceDescriptor::new(
            &config.service_name,
            &config.service_version,
            Some(config.resolved_environment()),
        );
        let pipelines = Pipelines::build(&resource, &settings)?;

        debug!(
            service.name = resource.service_name(),
            telemetry.endpoint = settings.endpoint(),
            "Telemetry pipelines constructed"
        );
        Ok(Self::assemble(
            config.clone(),
            resource,
            pipelines,
            Arc::new(console),
        ))
    }

    /// Wires already built pipelines and a console sink into the handler chain.
    pub fn assemble(
        config: TelemetryConfig,
        resource: ResourceDescriptor,
        pipelines: Pipelines,
        console: SharedSink,
    ) -> Self {
        let remote: SharedSink = Arc::new(pipelines.logs.bridge(resource.service_name()));
        let root: SharedSink = Arc::new(handler_chain(resource.service_name(), console, remote));

        Self {
            config,
            resource,
            pipelines,
            root,
        }
    }

    /// Registers the global `tracing` subscriber, the propagator and, if
    /// configured, the global providers, then marks every pipeline active.
    ///
    /// Nothing process-wide is replaced when the subscriber cannot be
    /// installed.
    pub fn install(&self) -> TelemetryResult<()> {
        self.subscriber()?
            .try_init()
            .map_err(|e| TelemetryError::Subscriber(e.to_string()))?;

        install_propagator();
        if self.config.register_globals {
            global::set_tracer_provider(self.pipelines.traces.provider().clone());
            global::set_meter_provider(self.pipelines.metrics.provider().clone());
        }

        self.activate();
        info!(
            service.name = self.resource.service_name(),
            service.version = self.resource.service_version(),
            deployment.environment = self.resource.environment(),
            "Telemetry initialized"
        );
        Ok(())
    }

    pub fn activate(&self) {
        for pipeline in self.pipelines.ordered() {
            pipeline.activate();
        }
    }

    /// Registry with the level filter, the OpenTelemetry span layer and the
    /// sink layer. Installed globally by [`Telemetry::install`].
    pub fn subscriber(&self) -> TelemetryResult<impl Subscriber + Send + Sync + 'static> {
        Ok(tracing_subscriber::registry()
            .with(self.env_filter()?)
            .with(self.otel_layer())
            .with(self.sink_layer()))
    }

    /// `RUST_LOG` if set, otherwise the configured level, with the export
    /// stack's own targets turned off.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(&self.config.log_level)
                .map_err(|e| TelemetryError::Filter(e.to_string()))?,
        };

        SUPPRESSED_TARGETS.iter().try_fold(filter, |filter, target| {
            let directive: Directive = format!("{target}=off")
                .parse()
                .map_err(|e: tracing_subscriber::filter::ParseError| {
                    TelemetryError::Filter(e.to_string())
                })?;
            Ok::<_, TelemetryError>(filter.add_directive(directive))
        })
    }

    pub fn otel_layer<S>(&self) -> OpenTelemetryLayer<S, SdkTracer>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        tracing_opentelemetry::layer()
            .with_tracer(self.tracer(self.resource.service_name().to_string()))
    }

    pub fn sink_layer(&self) -> SinkLayer {
        SinkLayer::new(self.root.clone())
            .with_tracer(self.tracer(self.resource.service_name().to_string()))
    }

    /// Shuts traces, metrics and logs down, in that order, within `deadline`.
    ///
    /// Every failure is reported. Calling this again reports each provider's
    /// already-shutdown error.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), ShutdownError> {
        shutdown_pipelines(self.pipelines.ordered(), deadline).await
    }

    pub async fn force_flush(&self, deadline: Duration) -> Result<(), ShutdownError> {
        drive(self.pipelines.ordered(), deadline, "flush", |p, _| p.force_flush()).await
    }

    pub fn logger(&self) -> Logger {
        Logger::new(self.root.clone())
    }

    pub fn root_sink(&self) -> &SharedSink {
        &self.root
    }

    pub fn tracer(&self, name: impl Into<std::borrow::Cow<'static, str>>) -> SdkTracer {
        self.pipelines.traces.tracer(name)
    }

    pub fn meter(&self, name: &'static str) -> Meter {
        self.pipelines.metrics.meter(name)
    }

    pub fn resource(&self) -> &ResourceDescriptor {
        &self.resource
    }

    pub fn pipelines(&self) -> &Pipelines {
        &self.pipelines
    }

    pub fn config(&self) -> &TelemetryConfig {
        &self.config
    }

    /// Shuts the pipelines down in reverse order with the default processor timeout.
    fn unwind(&self) {
        for pipeline in self.pipelines.ordered().into_iter().rev() {
            if let Err(error) = pipeline.shutdown() {
                warn!(telemetry.signal = %pipeline.signal(), error = %error, "Pipeline unwind failed");
            }
        }
    }
}

/// Builds and installs telemetry. If installation fails the pipelines are
/// shut down before the error is returned.
pub fn init_telemetry(config: &TelemetryConfig) -> TelemetryResult<Telemetry> {
    let telemetry = Telemetry::init(config)?;
    if let Err(err) = telemetry.install() {
        telemetry.unwind();
        return Err(err);
    }
    Ok(telemetry)
}

/// Shuts each pipeline down in order against one overall deadline.
///
/// Every shutdown is started even once the deadline has passed, so each
/// provider still receives its stop signal. Each one gets only the time left
/// both as its processor timeout and as the time it is awaited.
pub async fn shutdown_pipelines(
    pipelines: Vec<Arc<dyn SignalPipeline>>,
    deadline: Duration,
) -> Result<(), ShutdownError> {
    drive(pipelines, deadline, "shutdown", |p, remaining| {
        p.shutdown_with_timeout(remaining)
    })
    .await
}

async fn drive(
    pipelines: Vec<Arc<dyn SignalPipeline>>,
    deadline: Duration,
    action: &'static str,
    op: fn(&dyn SignalPipeline, Duration) -> Result<(), PipelineError>,
) -> Result<(), ShutdownError> {
    let started = Instant::now();
    let mut failures = Vec::new();

    for pipeline in pipelines {
        let signal = pipeline.signal();
        let remaining = deadline.saturating_sub(started.elapsed());
        let task = tokio::task::spawn_blocking(move || op(pipeline.as_ref(), remaining));

        let result = match timeout(remaining, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(PipelineError::Join(join_err.to_string())),
            Err(_) => Err(PipelineError::DeadlineExceeded(deadline)),
        };

        match result {
            Ok(()) => debug!(telemetry.signal = %signal, telemetry.action = action, "Provider completed"),
            Err(error) => {
                warn!(telemetry.signal = %signal, telemetry.action = action, error = %error, "Provider failed");
                failures.push(ShutdownFailure { signal, error });
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ShutdownError::new(failures))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{PipelineState, Signal};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Debug)]
    struct ScriptedPipeline {
        signal: Signal,
        delay: Duration,
        fail: bool,
        calls: Arc<AtomicUsize>,
        timeouts: Arc<Mutex<Vec<Duration>>>,
    }

    impl ScriptedPipeline {
        fn shared(signal: Signal, delay: Duration, fail: bool, calls: &Arc<AtomicUsize>) -> Arc<dyn SignalPipeline> {
            Self::recording(signal, delay, fail, calls, &Arc::new(Mutex::new(Vec::new())))
        }

        fn recording(
            signal: Signal,
            delay: Duration,
            fail: bool,
            calls: &Arc<AtomicUsize>,
            timeouts: &Arc<Mutex<Vec<Duration>>>,
        ) -> Arc<dyn SignalPipeline> {
            Arc::new(Self {
                signal,
                delay,
                fail,
                calls: calls.clone(),
                timeouts: timeouts.clone(),
            })
        }
    }

    impl SignalPipeline for ScriptedPipeline {
        fn signal(&self) -> Signal {
            self.signal
        }

        fn state(&self) -> PipelineState {
            PipelineState::Active
        }

        fn activate(&self) {}

        fn force_flush(&self) -> Result<(), PipelineError> {
            Ok(())
        }

        fn shutdown_with_timeout(&self, timeout: Duration) -> Result<(), PipelineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.timeouts.lock().unwrap().push(timeout);
            std::thread::sleep(self.delay);
            if self.fail {
                return Err(PipelineError::Join("scripted failure".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_collects_every_failure_in_order() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipelines = vec![
            ScriptedPipeline::shared(Signal::Traces, Duration::ZERO, true, &calls),
            ScriptedPipeline::shared(Signal::Metrics, Duration::ZERO, false, &calls),
            ScriptedPipeline::shared(Signal::Logs, Duration::ZERO, true, &calls),
        ];

        let err = shutdown_pipelines(pipelines, Duration::from_secs(5))
            .await
            .unwrap_err();

        assert_eq!(err.signals(), vec![Signal::Traces, Signal::Logs]);
        assert_eq!(err.first().map(|f| f.signal), Some(Signal::Traces));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_deadline_bounds_shutdown() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipelines = vec![
            ScriptedPipeline::shared(Signal::Traces, Duration::from_millis(500), false, &calls),
            ScriptedPipeline::shared(Signal::Metrics, Duration::from_millis(500), false, &calls),
            ScriptedPipeline::shared(Signal::Logs, Duration::from_millis(500), false, &calls),
        ];

        let started = std::time::Instant::now();
        let err = shutdown_pipelines(pipelines, Duration::from_millis(50))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(400));
        assert_eq!(err.failures().len(), 3);
        assert!(err
            .failures()
            .iter()
            .all(|f| matches!(f.error, PipelineError::DeadlineExceeded(_))));
    }

    #[tokio::test]
    async fn test_providers_get_the_remaining_deadline() {
        let calls = Arc::new(AtomicUsize::new(0));
        let timeouts = Arc::new(Mutex::new(Vec::new()));
        let pipelines = vec![
            ScriptedPipeline::recording(Signal::Traces, Duration::from_millis(100), false, &calls, &timeouts),
            ScriptedPipeline::recording(Signal::Metrics, Duration::ZERO, false, &calls, &timeouts),
        ];

        let deadline = Duration::from_secs(2);
        shutdown_pipelines(pipelines, deadline).await.unwrap();

        let timeouts = timeouts.lock().unwrap();
        assert_eq!(timeouts.len(), 2);
        assert!(timeouts[0] <= deadline);
        assert!(timeouts[1] <= deadline - Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_all_succeed() {
        let calls = Arc::new(AtomicUsize::new(0));
        let pipelines = vec![
            ScriptedPipeline::shared(Signal::Traces, Duration::ZERO, false, &calls),
            ScriptedPipeline::shared(Signal::Metrics, Duration::ZERO, false, &calls),
        ];

        assert!(shutdown_pipelines(pipelines, Duration::from_secs(1)).await.is_ok());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
