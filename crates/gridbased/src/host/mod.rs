//! HTTP service host: port negotiation, accept loop and request runtime.
//!
//! A [`ServiceHost`] moves through `Unbound → Bound(port) → Running →
//! Stopped` and never back. Binding tries the configured base port and then
//! successive ports until one is free. Once running, a dedicated accept
//! thread drives a tokio runtime on which hyper serves each connection,
//! answering a single request through the [`Dispatcher`] with at most
//! `max_workers` requests in flight.

mod bind;
mod dispatch;
mod errors;
mod server;
mod stats;
#[cfg(test)]
mod test_utils;

use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tokio::runtime::Runtime;
use tokio::sync::{Semaphore, watch};
use tracing::{debug, info};

use gridbase_config::{
    Config, DEFAULT_HOST, DEFAULT_IDLE_TIMEOUT_MS, DEFAULT_MAX_WORKERS, DEFAULT_PORT,
    DEFAULT_PORT_ATTEMPTS,
};

use crate::http::{Request, Response};
use crate::registry::HandlerRegistry;

pub use dispatch::Dispatcher;
pub use errors::{DispatchError, HostError};
pub use stats::{ACCEPT_THREAD_NAME, HostStats, StatsSnapshot, WorkerActivity};

#[cfg(test)]
pub(crate) use test_utils::{FixedService, http_get, occupy_consecutive};

use server::{ConnectionContext, Server};

pub(crate) const HOST_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::host");

const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const RUNTIME_THREADS: usize = 2;
const RUNTIME_THREAD_NAME: &str = "gridbase-worker";
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Lifecycle state of a [`ServiceHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// No listener yet.
    Unbound,
    /// Listener bound to the given port but not accepting.
    Bound(u16),
    /// Accept loop running.
    Running,
    /// Listener closed; terminal.
    Stopped,
}

/// Settings controlling how the host binds and serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOptions {
    /// Interface to bind.
    pub host: String,
    /// First port to try.
    pub base_port: u16,
    /// Further ports tried after the base port.
    pub port_attempts: u16,
    /// Only try the base port.
    pub force: bool,
    /// Requests served concurrently.
    pub max_workers: usize,
    /// Time a connection may take to send its request; zero disables it.
    pub idle_timeout: Duration,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_owned(),
            base_port: DEFAULT_PORT,
            port_attempts: DEFAULT_PORT_ATTEMPTS,
            force: false,
            max_workers: DEFAULT_MAX_WORKERS,
            idle_timeout: Duration::from_millis(DEFAULT_IDLE_TIMEOUT_MS),
        }
    }
}

impl From<&Config> for HostOptions {
    fn from(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            base_port: config.port,
            port_attempts: config.port_attempts,
            force: config.force_port,
            max_workers: config.max_workers,
            idle_timeout: config.idle_timeout(),
        }
    }
}

/// Owns the listener and the threads serving registered handlers.
#[derive(Debug)]
pub struct ServiceHost {
    options: HostOptions,
    dispatcher: Dispatcher,
    stats: Arc<HostStats>,
    state: HostState,
    listener: Option<TcpListener>,
    local_addr: Option<SocketAddr>,
    alive: Arc<AtomicBool>,
    shutdown: watch::Sender<bool>,
    accept: Option<JoinHandle<()>>,
}

impl ServiceHost {
    /// Creates an unbound host serving `registry`.
    #[must_use]
    pub fn new(options: HostOptions, registry: Arc<HandlerRegistry>) -> Self {
        Self::with_stats(options, registry, Arc::new(HostStats::default()))
    }

    /// Creates an unbound host that reports into existing `stats`.
    #[must_use]
    pub fn with_stats(
        options: HostOptions,
        registry: Arc<HandlerRegistry>,
        stats: Arc<HostStats>,
    ) -> Self {
        Self {
            options,
            dispatcher: Dispatcher::new(registry),
            stats,
            state: HostState::Unbound,
            listener: None,
            local_addr: None,
            alive: Arc::new(AtomicBool::new(false)),
            shutdown: watch::Sender::new(false),
            accept: None,
        }
    }

    /// Binds the listener, falling back to later ports unless forced.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::BindExhausted`] when every candidate port is
    /// taken, [`HostError::Bind`] for any other bind failure (or the first
    /// failure in force mode), and [`HostError::InvalidState`] unless the
    /// host is unbound.
    pub fn bind(&mut self) -> Result<u16, HostError> {
        if self.state != HostState::Unbound {
            return Err(HostError::invalid_state("bind", self.state));
        }
        let (listener, port) = bind::bind_with_fallback(
            &self.options.host,
            self.options.base_port,
            self.options.port_attempts,
            self.options.force,
        )?;
        self.local_addr = listener.local_addr().ok();
        self.listener = Some(listener);
        self.state = HostState::Bound(port);
        self.stats.record_port(port);
        Ok(port)
    }

    /// Starts the request runtime and the accept loop.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::InvalidState`] unless the host is bound, or the
    /// error raised while configuring the listener, building the runtime or
    /// spawning the accept thread.
    pub fn start(&mut self) -> Result<(), HostError> {
        let HostState::Bound(port) = self.state else {
            return Err(HostError::invalid_state("start", self.state));
        };
        let listener = self
            .listener
            .take()
            .ok_or_else(|| HostError::invalid_state("start", self.state))?;
        listener
            .set_nonblocking(true)
            .map_err(|source| HostError::NonBlocking { source })?;

        let max_workers = self.options.max_workers.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .max_blocking_threads(max_workers)
            .thread_name(RUNTIME_THREAD_NAME)
            .enable_all()
            .build()
            .map_err(|source| HostError::Runtime { source })?;
        let listener = {
            let _entered = runtime.enter();
            tokio::net::TcpListener::from_std(listener)
                .map_err(|source| HostError::Listener { source })?
        };
        self.stats.record_pool(max_workers);

        self.shutdown.send_replace(false);
        self.alive.store(true, Ordering::SeqCst);
        let server = Server {
            listener,
            context: Arc::new(ConnectionContext {
                dispatcher: self.dispatcher.clone(),
                stats: Arc::clone(&self.stats),
                idle_timeout: self.options.idle_timeout,
            }),
            permits: Arc::new(Semaphore::new(max_workers)),
            shutdown: self.shutdown.subscribe(),
        };
        let alive = AliveGuard {
            alive: Arc::clone(&self.alive),
            stats: Arc::clone(&self.stats),
        };
        let handle = thread::Builder::new()
            .name(ACCEPT_THREAD_NAME.to_owned())
            .spawn(move || run_acceptor(runtime, server, alive))
            .map_err(|source| {
                self.alive.store(false, Ordering::SeqCst);
                HostError::Spawn {
                    name: ACCEPT_THREAD_NAME.to_owned(),
                    source,
                }
            })?;
        self.accept = Some(handle);
        self.state = HostState::Running;
        info!(
            target: HOST_TARGET,
            port,
            workers = max_workers,
            "service host running"
        );
        Ok(())
    }

    /// Binds and starts in one step, returning the effective port.
    ///
    /// # Errors
    ///
    /// Returns any error from [`bind`](Self::bind) or [`start`](Self::start).
    pub fn open(&mut self) -> Result<u16, HostError> {
        let port = self.bind()?;
        self.start()?;
        Ok(port)
    }

    /// `true` while the listener is open and accepting, including the
    /// moment between [`start`](Self::start) and the first accept.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    /// Closes the listener and waits for in-flight requests. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ThreadPanic`] when the accept thread panicked.
    pub fn stop(&mut self) -> Result<(), HostError> {
        match self.state {
            HostState::Stopped => {
                debug!(target: HOST_TARGET, "stop requested on stopped host");
                Ok(())
            }
            HostState::Unbound | HostState::Bound(_) => {
                self.listener = None;
                self.state = HostState::Stopped;
                info!(target: HOST_TARGET, "service host stopped before start");
                Ok(())
            }
            HostState::Running => {
                self.shutdown.send_replace(true);
                let result = self.reap();
                info!(
                    target: HOST_TARGET,
                    port = self.port(),
                    served = self.stats.requests_served(),
                    "service host stopped"
                );
                result
            }
        }
    }

    /// Blocks until the accept loop exits, then marks the host stopped.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::ThreadPanic`] when the accept thread panicked.
    pub fn join(&mut self) -> Result<(), HostError> {
        match self.state {
            HostState::Running => self.reap(),
            _ => Ok(()),
        }
    }

    fn reap(&mut self) -> Result<(), HostError> {
        self.state = HostState::Stopped;
        let Some(handle) = self.accept.take() else {
            return Ok(());
        };
        handle.join().map_err(|_| {
            self.alive.store(false, Ordering::SeqCst);
            HostError::ThreadPanic
        })
    }

    /// Answers `request` in the calling thread, bypassing the network.
    #[must_use]
    pub fn dispatch(&self, request: &Request) -> Response {
        self.dispatcher.respond(request)
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> HostState {
        self.state
    }

    /// Effective bound port, once bound.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        self.local_addr.map(|addr| addr.port())
    }

    /// Address the listener is bound to.
    #[must_use]
    pub const fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// Registry the host dispatches to.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        self.dispatcher.registry()
    }

    /// Requests currently being served.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.stats.busy_workers()
    }

    /// Shared runtime counters.
    #[must_use]
    pub fn stats(&self) -> &Arc<HostStats> {
        &self.stats
    }
}

impl Drop for ServiceHost {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

fn run_acceptor(runtime: Runtime, server: Server, _alive: AliveGuard) {
    runtime.block_on(server.serve());
    // Handlers still running after the drain grace are abandoned.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
}

/// Clears liveness when the accept thread exits, including by panic.
struct AliveGuard {
    alive: Arc<AtomicBool>,
    stats: Arc<HostStats>,
}

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.stats.set_accepting(false);
        self.alive.store(false, Ordering::SeqCst);
    }
}
