use std::fmt::Write as _;
use std::sync::Arc;

use crate::host::{ACCEPT_THREAD_NAME, HostStats};
use crate::http::{Request, Response};
use crate::registry::{HandlerFault, ServiceHandler};

/// Mount path of the thread dump service.
pub const THREADDUMP_PATH: &str = "/info/threaddump.txt";

/// Lists the host threads and what each worker is serving.
#[derive(Debug)]
pub struct ThreadDumpService {
    stats: Arc<HostStats>,
}

impl ThreadDumpService {
    #[must_use]
    pub fn new(stats: Arc<HostStats>) -> Self {
        Self { stats }
    }

    /// Renders the dump as text, one thread per line.
    #[must_use]
    pub fn render(&self) -> String {
        let snapshot = self.stats.snapshot();
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{} threads, {} busy, {} requests served",
            snapshot.pool_size + 1,
            snapshot.busy_workers,
            snapshot.requests_served
        );
        let acceptor = if snapshot.accepting { "accepting" } else { "stopped" };
        let _ = writeln!(out, "{ACCEPT_THREAD_NAME}: {acceptor}");
        for worker in &snapshot.workers {
            match &worker.current {
                Some(request) => {
                    let _ = writeln!(out, "{}: busy {request}", worker.name);
                }
                None => {
                    let _ = writeln!(out, "{}: idle", worker.name);
                }
            }
        }
        out
    }
}

impl ServiceHandler for ThreadDumpService {
    fn path(&self) -> &str {
        THREADDUMP_PATH
    }

    fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
        Ok(Response::text(self.render()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_host_lists_acceptor_only() {
        let service = ThreadDumpService::new(Arc::new(HostStats::default()));
        let dump = service.render();
        assert!(dump.starts_with("1 threads, 0 busy, 0 requests served\n"));
        assert!(dump.contains("gridbase-acceptor: stopped"));
    }
}
