use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::Level;

use crate::error::{TelemetryError, TelemetryResult};
use crate::resource::DEFAULT_ENVIRONMENT;

/// Telemetry bootstrap configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub service_name: String,
    pub service_version: String,
    /// Collector address as `host:port` or `http://host:port`
    pub exporter_endpoint: String,
    pub environment: Option<String>,
    /// JSON console lines when true, `key=value` text otherwise
    pub log_json: bool,
    /// Filter directive used when `RUST_LOG` is unset
    pub log_level: String,
    pub console_level: String,
    pub export_timeout_secs: u64,
    pub metric_interval_secs: u64,
    pub shutdown_timeout_secs: u64,
    /// Register the tracer and meter providers as OpenTelemetry globals
    pub register_globals: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "pulse".to_string(),
            service_version: "0.1.0".to_string(),
            exporter_endpoint: "localhost:4317".to_string(),
            environment: None,
            log_json: true,
            log_level: "info".to_string(),
            console_level: "info".to_string(),
            export_timeout_secs: 30,
            metric_interval_secs: 3,
            shutdown_timeout_secs: 10,
            register_globals: true,
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>, service_version: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_version: service_version.into(),
            ..Self::default()
        }
    }

    /// Load configuration from defaults, an optional TOML file and
    /// `PULSE__*` environment variables, in that order of precedence.
    pub fn load(config_path: Option<&str>) -> TelemetryResult<Self> {
        let defaults = Self::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("service_name", defaults.service_name)?
            .set_default("service_version", defaults.service_version)?
            .set_default("exporter_endpoint", defaults.exporter_endpoint)?
            .set_default("log_json", defaults.log_json)?
            .set_default("log_level", defaults.log_level)?
            .set_default("console_level", defaults.console_level)?
            .set_default("export_timeout_secs", defaults.export_timeout_secs)?
            .set_default("metric_interval_secs", defaults.metric_interval_secs)?
            .set_default("shutdown_timeout_secs", defaults.shutdown_timeout_secs)?
            .set_default("register_globals", defaults.register_globals)?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(TelemetryError::validation(format!(
                    "config file not found: {path}"
                )));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("PULSE")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: TelemetryConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> TelemetryResult<Self> {
        let config: TelemetryConfig = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> TelemetryResult<()> {
        if self.service_name.trim().is_empty() {
            return Err(TelemetryError::validation("service_name must not be empty"));
        }
        if self.exporter_endpoint.trim().is_empty() {
            return Err(TelemetryError::validation(
                "exporter_endpoint must not be empty",
            ));
        }
        if self.export_timeout_secs == 0 {
            return Err(TelemetryError::validation(
                "export_timeout_secs must be greater than 0",
            ));
        }
        if self.metric_interval_secs == 0 {
            return Err(TelemetryError::validation(
                "metric_interval_secs must be greater than 0",
            ));
        }
        if self.shutdown_timeout_secs == 0 {
            return Err(TelemetryError::validation(
                "shutdown_timeout_secs must be greater than 0",
            ));
        }
        self.console_max_level()?;
        Ok(())
    }

    /// The configured environment, or `development` when unset or blank.
    pub fn resolved_environment(&self) -> &str {
        match self.environment.as_deref().map(str::trim) {
            Some(env) if !env.is_empty() => env,
            _ => DEFAULT_ENVIRONMENT,
        }
    }

    pub fn console_max_level(&self) -> TelemetryResult<Level> {
        Level::from_str(self.console_level.trim()).map_err(|_| {
            TelemetryError::validation(format!(
                "console_level is not a log level: {}",
                self.console_level
            ))
        })
    }

    pub fn export_timeout(&self) -> Duration {
        Duration::from_secs(self.export_timeout_secs)
    }

    pub fn metric_interval(&self) -> Duration {
        Duration::from_secs(self.metric_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
