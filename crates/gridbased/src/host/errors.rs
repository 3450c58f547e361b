//! Error types for binding and running the service host.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use super::HostState;

/// Errors surfaced while binding, starting or stopping the service host.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("failed to resolve address {host}:{port}: {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    #[error("no addresses resolved for {host}:{port}")]
    ResolveEmpty { host: String, port: u16 },
    #[error(
        "no free port for {host} in {base}..={last} after {attempts} attempts: {source}"
    )]
    BindExhausted {
        host: String,
        base: u16,
        last: u16,
        attempts: usize,
        #[source]
        source: io::Error,
    },
    #[error("failed to bind listener at {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("cannot {operation} while the host is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: HostState,
    },
    #[error("failed to enable non-blocking listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    #[error("failed to build the request runtime: {source}")]
    Runtime {
        #[source]
        source: io::Error,
    },
    #[error("failed to register listener with the runtime: {source}")]
    Listener {
        #[source]
        source: io::Error,
    },
    #[error("failed to spawn thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("host accept thread panicked")]
    ThreadPanic,
}

impl HostError {
    pub(crate) const fn invalid_state(operation: &'static str, state: HostState) -> Self {
        Self::InvalidState { operation, state }
    }
}

/// Reasons a request could not be answered by a handler.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No handler is mounted at the requested path.
    #[error("no service mounted at {path}")]
    Miss { path: String },
    /// The handler returned an error.
    #[error("service '{service}' failed: {source}")]
    Fault {
        service: String,
        #[source]
        source: crate::registry::HandlerFault,
    },
    /// The handler panicked.
    #[error("service '{service}' panicked: {message}")]
    Panic { service: String, message: String },
}

impl DispatchError {
    /// HTTP status reported to the caller.
    #[must_use]
    pub const fn status(&self) -> u16 {
        match self {
            Self::Miss { .. } => 404,
            Self::Fault { .. } | Self::Panic { .. } => 500,
        }
    }
}
