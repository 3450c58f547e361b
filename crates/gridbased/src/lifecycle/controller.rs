//! Drives a running host until a stop is requested, then tears it down.
//!
//! The poll loop checks the kill marker, the signal flag and host liveness
//! once per poll interval and records the first cause it sees.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{info, warn};

use gridbase_config::{MarkerPaths, StopProtocol};

use crate::host::{HostError, ServiceHost};
use crate::logbuf::LogRingBuffer;

use super::LIFECYCLE_TARGET;
use super::markers::LifecycleMarkers;
use super::signal::SignalFlag;

/// Operations the controller needs from the host it supervises.
pub trait HostControl {
    /// `true` while the host accepts connections.
    fn is_alive(&self) -> bool;

    /// Stops the host; repeated calls are no-ops.
    fn stop(&mut self) -> Result<(), HostError>;

    /// Blocks until the host has finished.
    fn join(&mut self) -> Result<(), HostError>;
}

impl HostControl for ServiceHost {
    fn is_alive(&self) -> bool {
        Self::is_alive(self)
    }

    fn stop(&mut self) -> Result<(), HostError> {
        Self::stop(self)
    }

    fn join(&mut self) -> Result<(), HostError> {
        Self::join(self)
    }
}

/// Why the controller stopped waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownCause {
    /// The kill marker was deleted.
    KillMarkerRemoved,
    /// A termination signal arrived.
    Signal,
    /// The host stopped accepting while markers were in place.
    HostTerminated,
    /// The host finished while no markers were in place.
    HostJoined,
}

/// Blocks the main thread until shutdown is requested, then stops the host.
#[derive(Debug)]
pub struct LifecycleController {
    paths: MarkerPaths,
    protocol: StopProtocol,
    poll_interval: Duration,
    signals: SignalFlag,
    log_buffer: Option<Arc<LogRingBuffer>>,
}

impl LifecycleController {
    /// Creates a controller using the marker protocol at `paths`.
    #[must_use]
    pub fn new(paths: MarkerPaths, poll_interval: Duration, signals: SignalFlag) -> Self {
        Self {
            paths,
            protocol: StopProtocol::Markers,
            poll_interval,
            signals,
            log_buffer: None,
        }
    }

    /// Selects the stop protocol.
    #[must_use]
    pub fn with_protocol(mut self, protocol: StopProtocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Retires `buffer` once the host has stopped.
    #[must_use]
    pub fn retiring(mut self, buffer: Arc<LogRingBuffer>) -> Self {
        self.log_buffer = Some(buffer);
        self
    }

    /// Signal flag observed while waiting.
    #[must_use]
    pub const fn signals(&self) -> &SignalFlag {
        &self.signals
    }

    /// Waits for a stop request, stops `host` and tears down.
    ///
    /// With the marker protocol the kill marker is polled at the configured
    /// interval. When markers are disabled or cannot be created, the
    /// controller waits for the host to finish instead; termination signals
    /// are honoured in both modes.
    pub fn run<H: HostControl + ?Sized>(&self, host: &mut H) -> ShutdownCause {
        let markers = self.create_markers();
        let cause = match &markers {
            Some(markers) => self.poll_markers(host, markers),
            None => self.wait_for_host(host),
        };
        info!(
            target: LIFECYCLE_TARGET,
            ?cause,
            "shutdown requested"
        );

        let outcome = match cause {
            ShutdownCause::HostJoined => host.join(),
            _ => host.stop(),
        };
        if let Err(error) = outcome {
            warn!(
                target: LIFECYCLE_TARGET,
                error = %error,
                "host did not shut down cleanly"
            );
        }

        self.retire_log_buffer();
        drop(markers);
        cause
    }

    fn create_markers(&self) -> Option<LifecycleMarkers> {
        if !self.protocol.uses_markers() {
            return None;
        }
        match LifecycleMarkers::create(self.paths.clone()) {
            Ok(markers) => Some(markers),
            Err(error) => {
                warn!(
                    target: LIFECYCLE_TARGET,
                    error = %error,
                    "lifecycle markers unavailable; waiting for the host to finish"
                );
                None
            }
        }
    }

    fn poll_markers<H: HostControl + ?Sized>(
        &self,
        host: &H,
        markers: &LifecycleMarkers,
    ) -> ShutdownCause {
        loop {
            if self.signals.is_raised() {
                return ShutdownCause::Signal;
            }
            if !host.is_alive() {
                return ShutdownCause::HostTerminated;
            }
            if markers.stop_requested() {
                return ShutdownCause::KillMarkerRemoved;
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn wait_for_host<H: HostControl + ?Sized>(&self, host: &H) -> ShutdownCause {
        loop {
            if self.signals.is_raised() {
                return ShutdownCause::Signal;
            }
            if !host.is_alive() {
                return ShutdownCause::HostJoined;
            }
            thread::sleep(self.poll_interval);
        }
    }

    fn retire_log_buffer(&self) {
        let Some(buffer) = &self.log_buffer else {
            return;
        };
        info!(
            target: LIFECYCLE_TARGET,
            retained = buffer.len(),
            "retiring log buffer"
        );
        buffer.close();
    }
}
