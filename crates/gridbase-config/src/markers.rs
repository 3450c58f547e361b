//! Derives the lifecycle marker paths shared by the service and its operators.
//!
//! A running service owns two files in its data directory, both named after
//! the service and the port it actually bound: `<service>-<port>.pid` exists
//! while the process is alive, and `<service>-<port>.kill` exists while the
//! service should keep running. Deleting the kill marker asks the service to
//! stop.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Canonical paths for the lifecycle markers of one service instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkerPaths {
    data_dir: PathBuf,
    pid_path: PathBuf,
    kill_path: PathBuf,
}

impl MarkerPaths {
    /// Derives marker paths for `service` listening on `port`.
    #[must_use]
    pub fn for_service(data_dir: impl Into<PathBuf>, service: &str, port: u16) -> Self {
        let data_dir = data_dir.into();
        Self {
            pid_path: data_dir.join(format!("{service}-{port}.pid")),
            kill_path: data_dir.join(format!("{service}-{port}.kill")),
            data_dir,
        }
    }

    /// Ensures the data directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerPathsError::DataDirectory`] when the directory cannot
    /// be created.
    pub fn prepare(&self) -> Result<(), MarkerPathsError> {
        fs::create_dir_all(&self.data_dir).map_err(|source| MarkerPathsError::DataDirectory {
            path: self.data_dir.clone(),
            source,
        })
    }

    /// Directory holding the markers.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        self.data_dir.as_path()
    }

    /// Path to the pid marker.
    #[must_use]
    pub fn pid_path(&self) -> &Path {
        self.pid_path.as_path()
    }

    /// Path to the kill marker.
    #[must_use]
    pub fn kill_path(&self) -> &Path {
        self.kill_path.as_path()
    }
}

/// Errors raised while preparing marker paths.
#[derive(Debug, Error)]
pub enum MarkerPathsError {
    /// Creating the data directory failed.
    #[error("failed to prepare data directory '{path}': {source}")]
    DataDirectory {
        /// Directory that could not be created.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_markers_after_service_and_port() {
        let paths = MarkerPaths::for_service("/var/lib/grid", "base", 8890);
        assert_eq!(paths.pid_path(), Path::new("/var/lib/grid/base-8890.pid"));
        assert_eq!(paths.kill_path(), Path::new("/var/lib/grid/base-8890.kill"));
        assert_eq!(paths.data_dir(), Path::new("/var/lib/grid"));
    }

    #[test]
    fn prepare_creates_nested_data_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let nested = dir.path().join("a").join("b");
        let paths = MarkerPaths::for_service(&nested, "base", 8888);
        paths.prepare().expect("prepare should create directories");
        assert!(nested.is_dir());
    }

    #[test]
    fn prepare_fails_when_data_dir_is_a_file() {
        let dir = tempfile::tempdir().expect("temp dir");
        let blocker = dir.path().join("occupied");
        fs::write(&blocker, b"").expect("write blocker");
        let paths = MarkerPaths::for_service(&blocker, "base", 8888);
        let error = paths.prepare().expect_err("prepare should fail");
        assert!(matches!(error, MarkerPathsError::DataDirectory { .. }));
    }
}
