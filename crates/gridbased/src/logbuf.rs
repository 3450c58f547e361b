//! Bounded in-memory log store served by the log endpoint.
//!
//! Every formatted log line is appended to a [`LogRingBuffer`] shared by all
//! threads of the process. Writers push onto a lock-free queue and never
//! block each other; the retained window lives behind a lock taken only by
//! trims and reads, which first settle the queued entries into it. Each
//! `trim_interval`-th append evicts the oldest lines until at most
//! `max_lines` remain, so the size may briefly exceed the cap between two
//! trims. Readers get a snapshot: a prefix of the append order, with a
//! message and its trace lines always kept together.
//!
//! The buffer must never emit `tracing` events itself: it sits behind the
//! telemetry layer, and logging from inside the store would re-enter it.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crossbeam::queue::SegQueue;

/// Appends between two periodic trims unless configured otherwise.
pub const DEFAULT_TRIM_INTERVAL: usize = 100;

/// Lines kept when memory runs short.
pub const LOW_MEMORY_RETAIN: usize = 5_000;

/// Thread-safe FIFO-bounded sequence of formatted log lines.
#[derive(Debug)]
pub struct LogRingBuffer {
    pending: SegQueue<Vec<String>>,
    lines: Mutex<Option<VecDeque<String>>>,
    closed: AtomicBool,
    appends: AtomicUsize,
    max_lines: usize,
    trim_interval: usize,
}

impl LogRingBuffer {
    /// Creates a buffer capped at `max_lines`, trimmed every
    /// [`DEFAULT_TRIM_INTERVAL`] appends.
    #[must_use]
    pub fn new(max_lines: usize) -> Self {
        Self::with_trim_interval(max_lines, DEFAULT_TRIM_INTERVAL)
    }

    /// Creates a buffer capped at `max_lines`, trimmed every `trim_interval`
    /// appends. An interval of zero is treated as one.
    #[must_use]
    pub fn with_trim_interval(max_lines: usize, trim_interval: usize) -> Self {
        Self {
            pending: SegQueue::new(),
            lines: Mutex::new(Some(VecDeque::new())),
            closed: AtomicBool::new(false),
            appends: AtomicUsize::new(0),
            max_lines,
            trim_interval: trim_interval.max(1),
        }
    }

    /// Appends a formatted line, followed by one entry per non-empty line of
    /// `trace` when present.
    ///
    /// Never blocks on other writers and never fails; after
    /// [`close`](Self::close) the call does nothing.
    pub fn append(&self, line: impl Into<String>, trace: Option<&str>) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let mut line = line.into();
        let trimmed = line.trim_end_matches(['\r', '\n']).len();
        line.truncate(trimmed);
        let mut entry = vec![line];
        if let Some(trace) = trace {
            entry.extend(
                trace
                    .lines()
                    .filter(|entry| !entry.trim().is_empty())
                    .map(str::to_owned),
            );
        }
        self.pending.push(entry);

        let count = self.appends.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        if count % self.trim_interval == 0 {
            self.trim(self.max_lines);
        }
    }

    /// Evicts the oldest lines until at most `keep` remain and returns how
    /// many were removed.
    pub fn trim(&self, keep: usize) -> usize {
        let mut store = self.settled();
        let Some(lines) = store.as_mut() else {
            return 0;
        };
        let excess = lines.len().saturating_sub(keep);
        lines.drain(..excess);
        excess
    }

    /// Shrinks the buffer to `keep` lines on demand, independent of the
    /// periodic trim cadence.
    pub fn compact(&self, keep: usize) -> usize {
        self.trim(keep)
    }

    /// Shrinks the buffer to [`LOW_MEMORY_RETAIN`] lines.
    pub fn compact_for_low_memory(&self) -> usize {
        self.compact(LOW_MEMORY_RETAIN)
    }

    /// Returns up to `max` of the most recent lines, oldest first.
    #[must_use]
    pub fn tail(&self, max: usize) -> Vec<String> {
        let store = self.settled();
        let Some(lines) = store.as_ref() else {
            return Vec::new();
        };
        let start = lines.len().saturating_sub(max);
        lines.range(start..).cloned().collect()
    }

    /// Number of lines currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.settled().as_ref().map_or(0, VecDeque::len)
    }

    /// Returns `true` when no lines are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Configured line cap.
    #[must_use]
    pub const fn max_lines(&self) -> usize {
        self.max_lines
    }

    /// Appends between two periodic trims.
    #[must_use]
    pub const fn trim_interval(&self) -> usize {
        self.trim_interval
    }

    /// Releases the stored lines. Later appends are ignored and reads are
    /// empty.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        let released = self.settled().take();
        drop(released);
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Locks the retained window after moving the entries queued so far
    /// into it.
    ///
    /// Only entries queued before the call are moved, so a steady stream of
    /// writers cannot keep a reader draining forever.
    fn settled(&self) -> MutexGuard<'_, Option<VecDeque<String>>> {
        // A panic while holding the lock leaves the deque structurally intact.
        let mut store = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        for _ in 0..self.pending.len() {
            let Some(entry) = self.pending.pop() else {
                break;
            };
            if let Some(lines) = store.as_mut() {
                lines.extend(entry);
            }
        }
        store
    }
}
