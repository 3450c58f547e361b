//! Built-in information services mounted by every service host.

mod log;
mod status;
mod threaddump;

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;

use crate::host::HostStats;
use crate::logbuf::LogRingBuffer;
use crate::registry::HandlerRegistry;

pub use log::{DEFAULT_LOG_COUNT, LOG_PATH, LogService};
pub use status::{STATUS_PATH, StatusReport, StatusService};
pub use threaddump::{THREADDUMP_PATH, ThreadDumpService};

/// State the information services read from.
#[derive(Debug, Clone)]
pub struct ServiceContext {
    service_name: String,
    started_at: Instant,
    log: Arc<LogRingBuffer>,
    stats: Arc<HostStats>,
}

impl ServiceContext {
    /// Creates a context whose uptime starts now.
    #[must_use]
    pub fn new(
        service_name: impl Into<String>,
        log: Arc<LogRingBuffer>,
        stats: Arc<HostStats>,
    ) -> Self {
        Self {
            service_name: service_name.into(),
            started_at: Instant::now(),
            log,
            stats,
        }
    }

    /// Name of the hosting service.
    #[must_use]
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    /// Whole seconds since the context was created.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// In-memory log.
    #[must_use]
    pub fn log(&self) -> &Arc<LogRingBuffer> {
        &self.log
    }

    /// Host counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<HostStats> {
        &self.stats
    }
}

/// Registers `status`, `log` and `threaddump` in that order.
pub fn register_builtin(registry: &mut HandlerRegistry, context: &ServiceContext) {
    // Failures are logged by the registry and never fatal.
    let _ = registry.register("status", || {
        Ok::<_, Infallible>(StatusService::new(context.clone()))
    });
    let _ = registry.register("log", || {
        Ok::<_, Infallible>(LogService::new(Arc::clone(context.log())))
    });
    let _ = registry.register("threaddump", || {
        Ok::<_, Infallible>(ThreadDumpService::new(Arc::clone(context.stats())))
    });
}
