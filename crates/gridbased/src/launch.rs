//! Startup sequence tying configuration, telemetry, host and lifecycle
//! together.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use gridbase_config::{Config, ConfigError};

use crate::host::{HostError, HostOptions, HostStats, ServiceHost};
use crate::lifecycle::{LifecycleController, ShutdownCause, SignalFlag};
use crate::logbuf::LogRingBuffer;
use crate::registry::HandlerRegistry;
use crate::services::{self, ServiceContext};
use crate::telemetry::{self, TelemetryError};

const LAUNCH_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::launch");

/// Errors that prevent the service from starting.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The configuration is unusable.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Telemetry could not be installed.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
    /// The host could not bind or start.
    #[error("failed to open service host: {0}")]
    Host(#[from] HostError),
}

/// Runs the service until it is asked to stop and returns why it stopped.
///
/// # Errors
///
/// Returns [`LaunchError`] when the configuration is invalid, telemetry
/// cannot be installed, or no port can be bound.
pub fn run_service(config: &Config) -> Result<ShutdownCause, LaunchError> {
    config.validate()?;
    let log = Arc::new(LogRingBuffer::with_trim_interval(
        config.log_max_lines,
        config.log_trim_interval,
    ));
    telemetry::initialise(config, Arc::clone(&log))?;
    info!(
        target: LAUNCH_TARGET,
        service = config.service_name(),
        base_port = config.port,
        protocol = %config.stop_protocol,
        "starting service host"
    );

    let stats = Arc::new(HostStats::default());
    let context = ServiceContext::new(config.service_name(), Arc::clone(&log), Arc::clone(&stats));
    let mut registry = HandlerRegistry::new();
    services::register_builtin(&mut registry, &context);

    let mut host = ServiceHost::with_stats(HostOptions::from(config), Arc::new(registry), stats);
    let port = match host.open() {
        Ok(port) => port,
        Err(error) => {
            warn!(
                target: LAUNCH_TARGET,
                error = %error,
                "service host failed to start"
            );
            log.close();
            return Err(error.into());
        }
    };
    info!(
        target: LAUNCH_TARGET,
        service = config.service_name(),
        port,
        "service host started"
    );
    for entry in host.registry().all() {
        info!(
            target: LAUNCH_TARGET,
            "curl http://127.0.0.1:{port}{}",
            entry.path()
        );
    }

    let signals = SignalFlag::install().unwrap_or_else(|error| {
        warn!(
            target: LAUNCH_TARGET,
            error = %error,
            "signal handlers unavailable; relying on markers"
        );
        SignalFlag::manual()
    });
    let controller =
        LifecycleController::new(config.marker_paths(port), config.poll_interval(), signals)
            .with_protocol(config.stop_protocol)
            .retiring(log);
    let cause = controller.run(&mut host);
    info!(
        target: LAUNCH_TARGET,
        service = config.service_name(),
        ?cause,
        "service terminated"
    );
    Ok(cause)
}
