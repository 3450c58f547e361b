//! Live counters describing the service host, read by the info endpoints.

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Name of the thread running the accept loop.
pub const ACCEPT_THREAD_NAME: &str = "gridbase-acceptor";

fn worker_slot_name(index: usize) -> String {
    format!("gridbase-worker-{index}")
}

/// Shared runtime counters of one host.
#[derive(Debug, Default)]
pub struct HostStats {
    port: AtomicU16,
    busy: AtomicUsize,
    served: AtomicU64,
    accepting: AtomicBool,
    workers: Mutex<Vec<Option<String>>>,
}

/// Point-in-time copy of [`HostStats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Bound port, `None` before binding.
    pub port: Option<u16>,
    /// Requests that may be served at once.
    pub pool_size: usize,
    /// Workers currently serving a request.
    pub busy_workers: usize,
    /// Requests answered since start.
    pub requests_served: u64,
    /// Whether the accept loop is running.
    pub accepting: bool,
    /// One entry per worker slot.
    pub workers: Vec<WorkerActivity>,
}

/// What a single worker slot is doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerActivity {
    /// Slot name.
    pub name: String,
    /// Request line being served, if any.
    pub current: Option<String>,
}

impl HostStats {
    /// Bound port, `None` before binding.
    #[must_use]
    pub fn port(&self) -> Option<u16> {
        match self.port.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }

    /// Workers currently serving a request.
    #[must_use]
    pub fn busy_workers(&self) -> usize {
        self.busy.load(Ordering::Acquire)
    }

    /// Requests answered since start.
    #[must_use]
    pub fn requests_served(&self) -> u64 {
        self.served.load(Ordering::Acquire)
    }

    /// Requests that may be served at once.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.slots().len()
    }

    /// Copies every counter at once.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let workers = self
            .slots()
            .iter()
            .enumerate()
            .map(|(index, current)| WorkerActivity {
                name: worker_slot_name(index),
                current: current.clone(),
            })
            .collect::<Vec<_>>();
        StatsSnapshot {
            port: self.port(),
            pool_size: workers.len(),
            busy_workers: self.busy_workers(),
            requests_served: self.requests_served(),
            accepting: self.accepting.load(Ordering::Acquire),
            workers,
        }
    }

    pub(super) fn record_port(&self, port: u16) {
        self.port.store(port, Ordering::Release);
    }

    pub(super) fn record_pool(&self, size: usize) {
        *self.slots() = vec![None; size];
    }

    pub(super) fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::Release);
    }

    /// Marks the first idle slot busy with `label` until the guard drops.
    ///
    /// The caller holds a concurrency permit, so a slot is free unless the
    /// pool was never sized.
    pub(super) fn begin(&self, label: String) -> BusyGuard<'_> {
        self.busy.fetch_add(1, Ordering::AcqRel);
        let slot = self
            .slots()
            .iter_mut()
            .enumerate()
            .find(|(_, current)| current.is_none())
            .map(|(index, current)| {
                *current = Some(label);
                index
            });
        BusyGuard { stats: self, slot }
    }

    fn slots(&self) -> MutexGuard<'_, Vec<Option<String>>> {
        self.workers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Clears a slot's activity and counts the request as served.
pub(super) struct BusyGuard<'a> {
    stats: &'a HostStats,
    slot: Option<usize>,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Some(index) = self.slot {
            if let Some(current) = self.stats.slots().get_mut(index) {
                *current = None;
            }
        }
        self.stats.served.fetch_add(1, Ordering::AcqRel);
        self.stats.busy.fetch_sub(1, Ordering::AcqRel);
    }
}
