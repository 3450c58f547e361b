use camino::Utf8PathBuf;

use crate::logging::LogFormat;
use crate::shutdown::StopProtocol;

/// Service name used for marker files when none is configured.
pub const DEFAULT_SERVICE_NAME: &str = "base";

/// Interface the HTTP listener binds to.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// First port tried by the bind fallback.
pub const DEFAULT_PORT: u16 = 8888;

/// Additional ports tried after the base port is unavailable.
pub const DEFAULT_PORT_ATTEMPTS: u16 = 16;

/// Directory holding lifecycle markers and per-instance configuration.
pub const DEFAULT_DATA_DIR: &str = "data";

/// Upper bound on concurrently served requests.
pub const DEFAULT_MAX_WORKERS: usize = 100;

/// Idle time after which a silent connection is dropped.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 20_000;

/// Default log filter expression used by the binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Number of log lines retained in memory.
pub const DEFAULT_LOG_MAX_LINES: usize = 100_000;

/// Appends between two periodic trims of the log buffer.
pub const DEFAULT_LOG_TRIM_INTERVAL: usize = 100;

/// Interval between two kill-marker checks.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Shared configuration file read when no explicit path is given.
pub const DEFAULT_CONFIG_PATH: &str = "conf/gridbase.toml";

/// File name of the per-instance overlay below `<data>/<service>-<port>/conf`.
pub const OVERLAY_FILE_NAME: &str = "gridbase.toml";

/// Default service name.
#[must_use]
pub fn default_service_name() -> String {
    DEFAULT_SERVICE_NAME.to_owned()
}

/// Default listener interface.
#[must_use]
pub fn default_host() -> String {
    DEFAULT_HOST.to_owned()
}

/// Default base port.
#[must_use]
pub const fn default_port() -> u16 {
    DEFAULT_PORT
}

/// Default number of fallback ports.
#[must_use]
pub const fn default_port_attempts() -> u16 {
    DEFAULT_PORT_ATTEMPTS
}

/// Default directory for lifecycle markers.
#[must_use]
pub fn default_data_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_DATA_DIR)
}

/// Default request concurrency.
#[must_use]
pub const fn default_max_workers() -> usize {
    DEFAULT_MAX_WORKERS
}

/// Default connection idle timeout in milliseconds.
#[must_use]
pub const fn default_idle_timeout_ms() -> u64 {
    DEFAULT_IDLE_TIMEOUT_MS
}

/// Default log filter expression used by the binaries.
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Compact
}

/// Default in-memory log capacity.
#[must_use]
pub const fn default_log_max_lines() -> usize {
    DEFAULT_LOG_MAX_LINES
}

/// Default trim cadence of the in-memory log.
#[must_use]
pub const fn default_log_trim_interval() -> usize {
    DEFAULT_LOG_TRIM_INTERVAL
}

/// Default shutdown protocol.
#[must_use]
pub const fn default_stop_protocol() -> StopProtocol {
    StopProtocol::Markers
}

/// Default kill-marker polling interval in milliseconds.
#[must_use]
pub const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
