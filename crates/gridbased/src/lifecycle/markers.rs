//! Pid and kill marker files for out-of-band process control.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use gridbase_config::{MarkerPaths, MarkerPathsError};

use super::LIFECYCLE_TARGET;

/// Errors raised while creating the lifecycle markers.
#[derive(Debug, Error)]
pub enum MarkerError {
    #[error(transparent)]
    Directory(#[from] MarkerPathsError),
    #[error("failed to remove stale marker '{path}': {source}")]
    Stale {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write marker '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Live marker pair; both files are removed on drop.
#[derive(Debug)]
pub struct LifecycleMarkers {
    paths: MarkerPaths,
}

impl LifecycleMarkers {
    /// Deletes stale markers and creates fresh ones. The pid marker records
    /// the current process id.
    ///
    /// # Errors
    ///
    /// Returns [`MarkerError`] when the directory cannot be prepared or a
    /// marker cannot be removed or written.
    pub fn create(paths: MarkerPaths) -> Result<Self, MarkerError> {
        paths.prepare()?;
        remove_stale(paths.pid_path())?;
        remove_stale(paths.kill_path())?;

        // Constructed before writing so a partial failure still cleans up.
        let markers = Self { paths };
        write_marker(markers.paths.pid_path(), &format!("{}\n", std::process::id()))?;
        write_marker(markers.paths.kill_path(), "")?;
        info!(
            target: LIFECYCLE_TARGET,
            pid = %markers.paths.pid_path().display(),
            kill = %markers.paths.kill_path().display(),
            "lifecycle markers created; delete the kill marker to stop"
        );
        Ok(markers)
    }

    /// `true` once the kill marker has been deleted.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        !self.paths.kill_path().exists()
    }

    /// Marker locations.
    #[must_use]
    pub const fn paths(&self) -> &MarkerPaths {
        &self.paths
    }
}

impl Drop for LifecycleMarkers {
    fn drop(&mut self) {
        for path in [self.paths.kill_path(), self.paths.pid_path()] {
            match fs::remove_file(path) {
                Err(error) if error.kind() != io::ErrorKind::NotFound => {
                    warn!(
                        target: LIFECYCLE_TARGET,
                        file = %path.display(),
                        error = %error,
                        "failed to remove lifecycle marker"
                    );
                }
                _ => {}
            }
        }
    }
}

fn remove_stale(path: &Path) -> Result<(), MarkerError> {
    match fs::remove_file(path) {
        Ok(()) => {
            info!(
                target: LIFECYCLE_TARGET,
                file = %path.display(),
                "removed stale marker"
            );
            Ok(())
        }
        Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(MarkerError::Stale {
            path: path.to_path_buf(),
            source,
        }),
    }
}

fn write_marker(path: &Path, content: &str) -> Result<(), MarkerError> {
    let write = || -> io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.write_all(content.as_bytes())?;
        file.sync_all()
    };
    write().map_err(|source| MarkerError::Write {
        path: path.to_path_buf(),
        source,
    })
}
