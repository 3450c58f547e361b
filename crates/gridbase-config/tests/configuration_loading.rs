//! Precedence and fail-fast behaviour of configuration loading.

use std::ffi::OsString;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use once_cell::sync::Lazy;
use rstest::rstest;

use gridbase_config::{Config, ConfigError, DEFAULT_PORT, LogFormat, StopProtocol};

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &str) -> Self {
        let guard = ENV_MUTEX
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let previous = std::env::var_os(key);
        // Environment mutation is `unsafe` in edition 2024; the guard restores
        // the previous value on drop and serialises access across tests.
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
    }
}

fn args(extra: &[&str]) -> Vec<OsString> {
    std::iter::once("gridbased")
        .chain(extra.iter().copied())
        .map(OsString::from)
        .collect()
}

fn env_lock() -> MutexGuard<'static, ()> {
    ENV_MUTEX
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

#[test]
fn loads_defaults_without_arguments() {
    let _lock = env_lock();
    let config = Config::resolve_from_iter(args(&[])).expect("defaults should load");
    assert_eq!(config, Config::default());
    assert_eq!(config.port, DEFAULT_PORT);
    assert_eq!(config.stop_protocol, StopProtocol::Markers);
}

#[test]
fn environment_overrides_defaults() {
    let _env = EnvOverride::set_var("GRIDBASE_PORT", "9100");
    let config = Config::resolve_from_iter(args(&[])).expect("environment should load");
    assert_eq!(config.port, 9100);
}

#[test]
fn cli_overrides_environment() {
    let _env = EnvOverride::set_var("GRIDBASE_LOG_FORMAT", "json");
    let config = Config::resolve_from_iter(args(&["--log-format", "compact"]))
        .expect("cli flags should load");
    assert_eq!(config.log_format, LogFormat::Compact);
}

#[test]
fn parses_force_and_protocol_flags() {
    let _lock = env_lock();
    let config = Config::resolve_from_iter(args(&[
        "--force-port",
        "--stop-protocol",
        "signals",
        "--port",
        "8010",
    ]))
    .expect("flags should load");
    assert!(config.force_port);
    assert_eq!(config.stop_protocol, StopProtocol::Signals);
    assert_eq!(config.port, 8010);
}

#[rstest]
#[case(&["--max-workers", "0"], "max_workers")]
#[case(&["--log-max-lines", "0"], "log_max_lines")]
#[case(&["--log-trim-interval", "0"], "log_trim_interval")]
#[case(&["--poll-interval-ms", "0"], "poll_interval_ms")]
#[case(&["--service-name", " "], "service_name")]
fn rejects_unusable_values(#[case] extra: &[&str], #[case] expected: &str) {
    let _lock = env_lock();
    let error = Config::resolve_from_iter(args(extra)).expect_err("validation should fail");
    match error {
        ConfigError::Invalid { field, .. } => assert_eq!(field, expected),
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn rejects_unparseable_port() {
    let _lock = env_lock();
    let error =
        Config::resolve_from_iter(args(&["--port", "eighty"])).expect_err("parse should fail");
    assert!(matches!(error, ConfigError::Load { .. }));
    assert!(error.to_string().contains("eighty"), "unexpected message: {error}");
}

fn write_toml(path: &Path, body: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create config directory");
    }
    fs::write(path, body).expect("write configuration file");
}

fn path_arg(path: &Path) -> &str {
    path.to_str().expect("temp paths are utf-8")
}

#[test]
fn shared_file_sets_values() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().expect("temp dir");
    let shared = dir.path().join("gridbase.toml");
    write_toml(&shared, "port = 9200\nmax_workers = 5\nstop_protocol = \"signals\"\n");

    let config = Config::resolve_from_iter(args(&["--config-path", path_arg(&shared)]))
        .expect("shared file should load");
    assert_eq!(config.port, 9200);
    assert_eq!(config.max_workers, 5);
    assert_eq!(config.stop_protocol, StopProtocol::Signals);
}

#[test]
fn instance_overlay_beats_shared_file() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().expect("temp dir");
    let shared = dir.path().join("conf").join("gridbase.toml");
    let data = dir.path().join("data");
    write_toml(&shared, "port = 9300\nmax_workers = 5\nlog_filter = \"warn\"\n");
    write_toml(
        &data.join("crawler-9300").join("conf").join("gridbase.toml"),
        "max_workers = 9\n",
    );

    let config = Config::resolve_from_iter(args(&[
        "--config-path",
        path_arg(&shared),
        "--service-name",
        "crawler",
        "--data-dir",
        path_arg(&data),
    ]))
    .expect("overlay should load");
    assert_eq!(config.max_workers, 9);
    assert_eq!(config.log_filter, "warn");
    assert!(config.overlay_path().ends_with("crawler-9300/conf/gridbase.toml"));
}

#[test]
fn environment_and_flags_beat_instance_overlay() {
    let _env = EnvOverride::set_var("GRIDBASE_LOG_FILTER", "trace");
    let dir = tempfile::tempdir().expect("temp dir");
    write_toml(
        &dir.path().join("base-9400").join("conf").join("gridbase.toml"),
        "log_filter = \"debug\"\nmax_workers = 9\nidle_timeout_ms = 50\n",
    );

    let config = Config::resolve_from_iter(args(&[
        "--data-dir",
        path_arg(dir.path()),
        "--port",
        "9400",
        "--max-workers",
        "2",
    ]))
    .expect("overlay should load");
    assert_eq!(config.log_filter, "trace");
    assert_eq!(config.max_workers, 2);
    assert_eq!(config.idle_timeout_ms, 50);
}

#[test]
fn malformed_overlay_fails_fast() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().expect("temp dir");
    write_toml(
        &dir.path().join("base-9500").join("conf").join("gridbase.toml"),
        "max_workers = \"many\"\n",
    );

    let error = Config::resolve_from_iter(args(&[
        "--data-dir",
        path_arg(dir.path()),
        "--port",
        "9500",
    ]))
    .expect_err("overlay should be rejected");
    assert!(matches!(error, ConfigError::OverlayParse { .. }));
}

#[test]
fn overlay_values_are_validated() {
    let _lock = env_lock();
    let dir = tempfile::tempdir().expect("temp dir");
    write_toml(
        &dir.path().join("base-9600").join("conf").join("gridbase.toml"),
        "log_trim_interval = 0\n",
    );

    let error = Config::resolve_from_iter(args(&[
        "--data-dir",
        path_arg(dir.path()),
        "--port",
        "9600",
    ]))
    .expect_err("validation should fail");
    assert!(matches!(
        error,
        ConfigError::Invalid {
            field: "log_trim_interval",
            ..
        }
    ));
}

#[test]
fn marker_paths_follow_effective_port() {
    let config = Config {
        service_name: "crawler".to_owned(),
        data_dir: "/srv/grid".into(),
        ..Config::default()
    };
    let paths = config.marker_paths(8891);
    assert!(paths.pid_path().ends_with("crawler-8891.pid"));
    assert!(paths.kill_path().ends_with("crawler-8891.kill"));
}
