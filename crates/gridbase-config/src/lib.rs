//! Shared configuration for the gridbase service host.
//!
//! Values are layered with `ortho_config`: built-in defaults, then the shared
//! configuration file (`conf/gridbase.toml` unless `--config-path` or
//! `GRIDBASE_CONFIG_PATH` names another), then `GRIDBASE_*` environment
//! variables, then command-line flags. Once the service name, data directory
//! and port are known, a per-instance overlay at
//! `<data>/<service>-<port>/conf/gridbase.toml` is applied on top of the file
//! layer; environment and flags still win over it. The merged result is
//! validated so the daemon fails fast on settings it could never honour.

mod defaults;
mod logging;
mod markers;
mod overlay;
mod shutdown;

use std::ffi::OsString;
use std::sync::Arc;
use std::time::Duration;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use defaults::{
    DEFAULT_CONFIG_PATH, DEFAULT_DATA_DIR, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_MS,
    DEFAULT_LOG_FILTER, DEFAULT_LOG_MAX_LINES, DEFAULT_LOG_TRIM_INTERVAL, DEFAULT_MAX_WORKERS,
    DEFAULT_POLL_INTERVAL_MS, DEFAULT_PORT, DEFAULT_PORT_ATTEMPTS, DEFAULT_SERVICE_NAME,
    OVERLAY_FILE_NAME, default_data_dir, default_host, default_idle_timeout_ms,
    default_log_filter, default_log_format, default_log_max_lines, default_log_trim_interval,
    default_max_workers, default_poll_interval_ms, default_port, default_port_attempts,
    default_service_name, default_stop_protocol,
};
pub use logging::LogFormat;
pub use markers::{MarkerPaths, MarkerPathsError};
pub use shutdown::StopProtocol;

use overlay::{ConfigOverlay, PinnedFields};

/// Resolved configuration for one service host process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "GRIDBASE")]
pub struct Config {
    /// Service name used in marker file names and status output.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Interface the HTTP listener binds to.
    #[serde(default = "default_host")]
    pub host: String,

    /// First port to try; later ports are tried when it is taken.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Additional consecutive ports tried after the base port.
    #[serde(default = "default_port_attempts")]
    pub port_attempts: u16,

    /// Fail instead of trying other ports when the base port is taken.
    #[serde(default)]
    pub force_port: bool,

    /// Directory holding the markers and per-instance overlays.
    #[serde(default = "default_data_dir")]
    pub data_dir: Utf8PathBuf,

    /// Maximum number of requests served concurrently.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Milliseconds a connection may stay silent before it is dropped.
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Log filter expression, e.g. `info` or `gridbased::host=debug`.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Format of the stderr log mirror (`compact` or `json`).
    #[serde(default = "default_log_format")]
    pub log_format: LogFormat,

    /// Log lines retained in memory for the log endpoint.
    #[serde(default = "default_log_max_lines")]
    pub log_max_lines: usize,

    /// Appends between two trims of the in-memory log.
    #[serde(default = "default_log_trim_interval")]
    pub log_trim_interval: usize,

    /// Stop protocol: `markers` (kill file and signals) or `signals`.
    #[serde(default = "default_stop_protocol")]
    pub stop_protocol: StopProtocol,

    /// Milliseconds between two kill-marker checks.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            host: default_host(),
            port: DEFAULT_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
            force_port: false,
            data_dir: default_data_dir(),
            max_workers: DEFAULT_MAX_WORKERS,
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            log_filter: default_log_filter(),
            log_format: default_log_format(),
            log_max_lines: DEFAULT_LOG_MAX_LINES,
            log_trim_interval: DEFAULT_LOG_TRIM_INTERVAL,
            stop_protocol: default_stop_protocol(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl Config {
    /// Resolves configuration from the process arguments, environment and
    /// configuration files.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer cannot be read or the merged
    /// values fail validation.
    pub fn resolve() -> Result<Self, ConfigError> {
        Self::resolve_from_iter(std::env::args_os())
    }

    /// Resolves configuration from an explicit argument list.
    ///
    /// The first item is treated as the binary name, as with
    /// [`std::env::args_os`].
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a layer cannot be read or the merged
    /// values fail validation.
    pub fn resolve_from_iter<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString>,
    {
        let args: Vec<OsString> = args.into_iter().map(Into::into).collect();
        let pinned = PinnedFields::from_args(&args);
        let mut config = Self::load_from_iter(overlay::with_base_file(args))
            .map_err(|source| ConfigError::Load { source })?;
        let overlay_path = config.overlay_path();
        if let Some(overlay) = ConfigOverlay::read(&overlay_path)? {
            overlay.apply(&mut config, &pinned);
        }
        config.validate()?;
        Ok(config)
    }

    /// Rejects settings the service host cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.trim().is_empty() {
            return Err(ConfigError::invalid("service_name", "must not be empty"));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::invalid("max_workers", "must be at least 1"));
        }
        if self.log_max_lines == 0 {
            return Err(ConfigError::invalid("log_max_lines", "must be at least 1"));
        }
        if self.log_trim_interval == 0 {
            return Err(ConfigError::invalid(
                "log_trim_interval",
                "must be at least 1",
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "poll_interval_ms",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Configured service name.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Log filter expression for the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format of the stderr log mirror.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Idle timeout applied to accepted connections.
    #[must_use]
    pub const fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    /// Interval between two kill-marker checks.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Marker paths for this service once it listens on `port`.
    #[must_use]
    pub fn marker_paths(&self, port: u16) -> MarkerPaths {
        MarkerPaths::for_service(self.data_dir.as_std_path(), &self.service_name, port)
    }

    /// Per-instance overlay file for the configured service and base port.
    #[must_use]
    pub fn overlay_path(&self) -> Utf8PathBuf {
        self.data_dir
            .join(format!("{}-{}", self.service_name, self.port))
            .join("conf")
            .join(OVERLAY_FILE_NAME)
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Defaults, the shared file, environment or flags could not be merged.
    #[error("{source}")]
    Load {
        /// Underlying loader error; carries usage output for flag errors.
        #[source]
        source: Arc<OrthoError>,
    },
    /// The per-instance overlay exists but could not be read.
    #[error("failed to read configuration overlay '{path}': {source}")]
    OverlayRead {
        /// Overlay file.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
    /// The per-instance overlay is not valid TOML for this configuration.
    #[error("failed to parse configuration overlay '{path}': {source}")]
    OverlayParse {
        /// Overlay file.
        path: Utf8PathBuf,
        /// Underlying TOML error.
        #[source]
        source: toml::de::Error,
    },
    /// A value parsed but cannot be used.
    #[error("invalid configuration: {field} {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
