//! Per-instance configuration overlay and shared-file discovery.
//!
//! Several instances of one service may share a data directory, each on its
//! own port. An instance reads its overlay from
//! `<data>/<service>-<port>/conf/gridbase.toml`, where the location is fixed
//! by the values resolved before the overlay is read. Fields set through the
//! environment or on the command line are pinned: the overlay never replaces
//! them.

use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;

use crate::defaults::DEFAULT_CONFIG_PATH;
use crate::{Config, ConfigError, LogFormat, StopProtocol};

const ENV_PREFIX: &str = "GRIDBASE_";
const CONFIG_PATH_FLAG: &str = "--config-path";
const CONFIG_PATH_ENV: &str = "GRIDBASE_CONFIG_PATH";

/// Prepends the shared configuration file when no other file is named.
pub(crate) fn with_base_file(mut args: Vec<OsString>) -> Vec<OsString> {
    let explicit = args
        .iter()
        .skip(1)
        .filter_map(|arg| arg.to_str())
        .any(|arg| flag_matches(arg, CONFIG_PATH_FLAG));
    if explicit
        || std::env::var_os(CONFIG_PATH_ENV).is_some()
        || !Path::new(DEFAULT_CONFIG_PATH).is_file()
    {
        return args;
    }
    let at = args.len().min(1);
    args.splice(
        at..at,
        [
            OsString::from(CONFIG_PATH_FLAG),
            OsString::from(DEFAULT_CONFIG_PATH),
        ],
    );
    args
}

fn flag_matches(arg: &str, flag: &str) -> bool {
    arg.strip_prefix(flag)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('='))
}

/// Fields set by a layer that outranks the overlay.
#[derive(Debug, Default)]
pub(crate) struct PinnedFields {
    flags: Vec<String>,
}

impl PinnedFields {
    pub(crate) fn from_args(args: &[OsString]) -> Self {
        let flags = args
            .iter()
            .skip(1)
            .filter_map(|arg| arg.to_str())
            .filter(|arg| arg.starts_with("--"))
            .map(str::to_owned)
            .collect();
        Self { flags }
    }

    fn contains(&self, field: &str) -> bool {
        let flag = format!("--{}", field.replace('_', "-"));
        let env = format!("{ENV_PREFIX}{}", field.to_ascii_uppercase());
        std::env::var_os(env).is_some() || self.flags.iter().any(|arg| flag_matches(arg, &flag))
    }
}

/// Sparse configuration read from a per-instance overlay file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct ConfigOverlay {
    service_name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    port_attempts: Option<u16>,
    force_port: Option<bool>,
    data_dir: Option<Utf8PathBuf>,
    max_workers: Option<usize>,
    idle_timeout_ms: Option<u64>,
    log_filter: Option<String>,
    log_format: Option<LogFormat>,
    log_max_lines: Option<usize>,
    log_trim_interval: Option<usize>,
    stop_protocol: Option<StopProtocol>,
    poll_interval_ms: Option<u64>,
}

impl ConfigOverlay {
    /// Reads the overlay at `path`; a missing file is not an error.
    pub(crate) fn read(path: &Utf8Path) -> Result<Option<Self>, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::OverlayRead {
                    path: path.to_owned(),
                    source,
                });
            }
        };
        toml::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::OverlayParse {
                path: path.to_owned(),
                source,
            })
    }

    /// Copies every overlay value onto `config` unless the field is pinned.
    pub(crate) fn apply(self, config: &mut Config, pinned: &PinnedFields) {
        layer(&mut config.service_name, self.service_name, "service_name", pinned);
        layer(&mut config.host, self.host, "host", pinned);
        layer(&mut config.port, self.port, "port", pinned);
        layer(&mut config.port_attempts, self.port_attempts, "port_attempts", pinned);
        layer(&mut config.force_port, self.force_port, "force_port", pinned);
        layer(&mut config.data_dir, self.data_dir, "data_dir", pinned);
        layer(&mut config.max_workers, self.max_workers, "max_workers", pinned);
        layer(&mut config.idle_timeout_ms, self.idle_timeout_ms, "idle_timeout_ms", pinned);
        layer(&mut config.log_filter, self.log_filter, "log_filter", pinned);
        layer(&mut config.log_format, self.log_format, "log_format", pinned);
        layer(&mut config.log_max_lines, self.log_max_lines, "log_max_lines", pinned);
        layer(
            &mut config.log_trim_interval,
            self.log_trim_interval,
            "log_trim_interval",
            pinned,
        );
        layer(&mut config.stop_protocol, self.stop_protocol, "stop_protocol", pinned);
        layer(
            &mut config.poll_interval_ms,
            self.poll_interval_ms,
            "poll_interval_ms",
            pinned,
        );
    }
}

fn layer<T>(slot: &mut T, value: Option<T>, field: &str, pinned: &PinnedFields) {
    if let Some(value) = value.filter(|_| !pinned.contains(field)) {
        *slot = value;
    }
}
