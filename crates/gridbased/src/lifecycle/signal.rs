//! Termination signals recorded as a shared flag for the poll loop.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use signal_hook::SigId;
use signal_hook::consts::signal::{SIGHUP, SIGINT, SIGQUIT, SIGTERM};
use signal_hook::flag;
use thiserror::Error;
use tracing::debug;

use super::LIFECYCLE_TARGET;

const SHUTDOWN_SIGNALS: [i32; 4] = [SIGTERM, SIGINT, SIGQUIT, SIGHUP];

/// Errors reported while installing signal handlers.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Installing a handler failed.
    #[error("failed to install handler for signal {signal}: {source}")]
    Install {
        /// Signal number.
        signal: i32,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
}

/// Flag raised when a termination signal arrives.
#[derive(Debug)]
pub struct SignalFlag {
    raised: Arc<AtomicBool>,
    registrations: Vec<SigId>,
}

impl SignalFlag {
    /// Raises the flag on SIGTERM, SIGINT, SIGQUIT or SIGHUP.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Install`] when a handler cannot be registered.
    pub fn install() -> Result<Self, SignalError> {
        let mut signals = Self::manual();
        for signal in SHUTDOWN_SIGNALS {
            let id = flag::register(signal, Arc::clone(&signals.raised))
                .map_err(|source| SignalError::Install { signal, source })?;
            signals.registrations.push(id);
        }
        debug!(target: LIFECYCLE_TARGET, "shutdown signal handlers installed");
        Ok(signals)
    }

    /// Flag without OS handlers; raised only through [`raise`](Self::raise).
    #[must_use]
    pub fn manual() -> Self {
        Self {
            raised: Arc::new(AtomicBool::new(false)),
            registrations: Vec::new(),
        }
    }

    /// `true` once a signal arrived or [`raise`](Self::raise) was called.
    #[must_use]
    pub fn is_raised(&self) -> bool {
        self.raised.load(Ordering::SeqCst)
    }

    /// Raises the flag from inside the process.
    pub fn raise(&self) {
        self.raised.store(true, Ordering::SeqCst);
    }

    /// Shareable handle that raises this flag.
    #[must_use]
    pub fn trigger(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.raised)
    }
}

impl Drop for SignalFlag {
    fn drop(&mut self) {
        for id in self.registrations.drain(..) {
            signal_hook::low_level::unregister(id);
        }
    }
}
