//! File- and signal-based start/stop protocol for the service process.
//!
//! On startup the controller replaces any stale `<service>-<port>.pid` and
//! `<service>-<port>.kill` markers with fresh ones and then polls: deleting
//! the kill marker, a termination signal, or the host dying ends the wait.
//! The host is stopped, the in-memory log is retired and the markers are
//! removed. When the markers cannot be created the controller falls back to
//! waiting for the host itself.

mod controller;
mod markers;
mod signal;

pub use controller::{HostControl, LifecycleController, ShutdownCause};
pub use markers::{LifecycleMarkers, MarkerError};
pub use signal::{SignalError, SignalFlag};

pub(crate) const LIFECYCLE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::lifecycle");
