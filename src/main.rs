use anyhow::{Context, Result};
use clap::{Arg, Command};
use pulse_telemetry::{init_telemetry, TelemetryConfig};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("pulse")
        .version("1.0.0")
        .about("Service entry point with OpenTelemetry export")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Telemetry config file (TOML)"),
        )
        .arg(
            Arg::new("service-name")
                .long("service-name")
                .value_name("NAME")
                .help("Overrides service_name from the config"),
        )
        .arg(
            Arg::new("service-version")
                .long("service-version")
                .value_name("VERSION")
                .help("Overrides service_version from the config"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("Port reported in the startup log")
                .default_value("8080"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config");
    let mut config = TelemetryConfig::load(config_path.map(String::as_str))
        .context("failed to load telemetry configuration")?;

    if let Some(name) = matches.get_one::<String>("service-name") {
        config.service_name = name.clone();
    }
    if let Some(version) = matches.get_one::<String>("service-version") {
        config.service_version = version.clone();
    }
    config.validate()?;

    let telemetry = init_telemetry(&config).context("failed to initialize telemetry")?;

    let port = matches
        .get_one::<String>("port")
        .map(String::as_str)
        .unwrap_or("8080");
    info!(port = port, "service_started");

    wait_for_shutdown_signal().await;

    info!("service_shutting_down");

    if let Err(e) = telemetry.shutdown(config.shutdown_timeout()).await {
        // the log pipeline may already be gone
        eprintln!("telemetry shutdown failed: {e}");
        for failure in e.failures() {
            eprintln!("  {failure}");
        }
    }

    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C");
        },
        _ = terminate => {
            info!("received SIGTERM");
        },
    }
}
