//! Embeddable HTTP host for the information services of a grid worker.
//!
//! A long-running worker process starts a [`ServiceHost`] that exposes a
//! handful of named endpoints (status, log tail, thread dump) over plain
//! HTTP. The host binds its configured base port or, when that port is
//! taken, the next free one, so several workers can share a machine without
//! coordination. The effective port is logged and used to name the lifecycle
//! markers.
//!
//! Shutdown is requested out of band. The [`LifecycleController`] writes
//! `<service>-<port>.pid` and `<service>-<port>.kill` into the data directory
//! and polls them: deleting the kill marker, or sending SIGTERM, stops the
//! host gracefully. When the markers cannot be written the controller simply
//! waits for the host to finish.
//!
//! Every log event is also recorded in a bounded [`LogRingBuffer`] so the
//! recent history can be fetched from `/info/log.txt` without access to the
//! machine.

mod host;
mod http;
mod launch;
mod lifecycle;
mod logbuf;
mod registry;
mod services;
mod telemetry;

pub use host::{
    Dispatcher, DispatchError, HostError, HostOptions, HostState, HostStats, ServiceHost,
    StatsSnapshot, WorkerActivity,
};
pub use http::{Request, Response};
pub use launch::{LaunchError, run_service};
pub use lifecycle::{
    HostControl, LifecycleController, LifecycleMarkers, MarkerError, ShutdownCause, SignalError,
    SignalFlag,
};
pub use logbuf::{DEFAULT_TRIM_INTERVAL, LOW_MEMORY_RETAIN, LogRingBuffer};
pub use registry::{
    BoxError, HandlerFault, HandlerRegistry, RegisteredHandler, RegistrationError, ServiceHandler,
};
pub use services::{
    DEFAULT_LOG_COUNT, LOG_PATH, LogService, STATUS_PATH, ServiceContext, StatusReport,
    StatusService, THREADDUMP_PATH, ThreadDumpService, register_builtin,
};
pub use telemetry::{RingBufferLayer, TRACE_FIELD, TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
