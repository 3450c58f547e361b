//! Shared world for service lifecycle scenarios.

use std::convert::Infallible;
use std::fs;
use std::net::{SocketAddr, TcpListener};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tempfile::TempDir;

use gridbase_config::MarkerPaths;

use crate::host::{FixedService, HostOptions, HostStats, ServiceHost, http_get, occupy_consecutive};
use crate::lifecycle::{LifecycleController, ShutdownCause, SignalFlag};
use crate::logbuf::LogRingBuffer;
use crate::registry::HandlerRegistry;
use crate::services::{ServiceContext, register_builtin};

pub(crate) const SERVICE_NAME: &str = "base";
const WAIT_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(20);

type Outcome = (ShutdownCause, ServiceHost);

pub(crate) struct ServiceWorld {
    data_dir: TempDir,
    base_port: u16,
    held_ports: Vec<TcpListener>,
    log: Arc<LogRingBuffer>,
    stats: Arc<HostStats>,
    registry: Option<HandlerRegistry>,
    addr: Option<SocketAddr>,
    runner: Option<JoinHandle<Outcome>>,
    outcome: Option<Outcome>,
}

impl ServiceWorld {
    pub(crate) fn new() -> Self {
        Self {
            data_dir: tempfile::tempdir().expect("temp dir"),
            base_port: 0,
            held_ports: Vec::new(),
            log: Arc::new(LogRingBuffer::new(1_000)),
            stats: Arc::new(HostStats::default()),
            registry: None,
            addr: None,
            runner: None,
            outcome: None,
        }
    }

    pub(crate) fn occupy_base_port(&mut self) {
        let (base, held) = occupy_consecutive(1);
        self.base_port = base;
        self.held_ports = held;
    }

    pub(crate) fn build_registry(&mut self) {
        let context =
            ServiceContext::new(SERVICE_NAME, Arc::clone(&self.log), Arc::clone(&self.stats));
        let mut registry = HandlerRegistry::new();
        register_builtin(&mut registry, &context);
        self.registry = Some(registry);
    }

    pub(crate) fn add_fixed_service(&mut self, name: &str, path: &'static str, body: &'static str) {
        let registry = self.registry.get_or_insert_with(HandlerRegistry::new);
        registry
            .register(name, || Ok::<_, Infallible>(FixedService::new(path, body)))
            .expect("fixed service registers");
    }

    pub(crate) fn start(&mut self) -> Result<(), String> {
        let registry = self.registry.take().ok_or("registry not built")?;
        let options = HostOptions {
            host: "127.0.0.1".to_owned(),
            base_port: self.base_port,
            max_workers: 4,
            ..HostOptions::default()
        };
        let mut host =
            ServiceHost::with_stats(options, Arc::new(registry), Arc::clone(&self.stats));
        let port = host.open().map_err(|error| error.to_string())?;
        self.addr = host.local_addr();

        let controller = LifecycleController::new(
            self.marker_paths(port),
            POLL_INTERVAL,
            SignalFlag::manual(),
        )
        .retiring(Arc::clone(&self.log));
        self.runner = Some(thread::spawn(move || {
            let cause = controller.run(&mut host);
            (cause, host)
        }));
        wait_until(|| self.marker_paths(port).kill_path().exists())
    }

    pub(crate) fn port(&self) -> Result<u16, String> {
        self.addr
            .map(|addr| addr.port())
            .ok_or_else(|| "service not started".to_owned())
    }

    pub(crate) const fn base_port(&self) -> u16 {
        self.base_port
    }

    pub(crate) fn marker_paths(&self, port: u16) -> MarkerPaths {
        MarkerPaths::for_service(self.data_dir.path(), SERVICE_NAME, port)
    }

    pub(crate) fn get(&self, target: &str) -> Result<(u16, String), String> {
        let addr = self.addr.ok_or("service not started")?;
        http_get(addr, target).map_err(|error| error.to_string())
    }

    pub(crate) fn is_accepting(&self) -> bool {
        self.stats.snapshot().accepting
    }

    pub(crate) fn log(&self) -> &Arc<LogRingBuffer> {
        &self.log
    }

    pub(crate) fn delete_kill_marker(&self) -> Result<(), String> {
        let port = self.port()?;
        fs::remove_file(self.marker_paths(port).kill_path()).map_err(|error| error.to_string())
    }

    pub(crate) fn await_shutdown(&mut self) -> Result<ShutdownCause, String> {
        if let Some(runner) = self.runner.take() {
            let outcome = runner
                .join()
                .map_err(|_| "controller thread panicked".to_owned())?;
            self.outcome = Some(outcome);
        }
        self.outcome
            .as_ref()
            .map(|(cause, _)| *cause)
            .ok_or_else(|| "service never ran".to_owned())
    }

    pub(crate) fn stopped_host(&self) -> Option<&ServiceHost> {
        self.outcome.as_ref().map(|(_, host)| host)
    }
}

impl Drop for ServiceWorld {
    fn drop(&mut self) {
        // Unblock a scenario that failed before requesting shutdown.
        if self.runner.is_some()
            && let Ok(port) = self.port()
        {
            let _ = fs::remove_file(self.marker_paths(port).kill_path());
            if let Some(runner) = self.runner.take() {
                let _ = runner.join();
            }
        }
    }
}

pub(crate) fn wait_until(mut condition: impl FnMut() -> bool) -> Result<(), String> {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while Instant::now() < deadline {
        if condition() {
            return Ok(());
        }
        thread::sleep(Duration::from_millis(10));
    }
    Err("condition not met before timeout".to_owned())
}

pub(crate) fn exists(path: &Path) -> bool {
    path.exists()
}
