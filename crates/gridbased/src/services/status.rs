use serde::Serialize;

use crate::http::{Request, Response};
use crate::registry::{HandlerFault, ServiceHandler};

use super::ServiceContext;

/// Mount path of the status service.
pub const STATUS_PATH: &str = "/info/status.json";

/// Body of the status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub service: String,
    pub port: Option<u16>,
    pub uptime_secs: u64,
    pub pool_size: usize,
    pub busy_workers: usize,
    pub requests_served: u64,
    pub log_lines: usize,
}

/// Reports service identity and host counters as JSON.
#[derive(Debug)]
pub struct StatusService {
    context: ServiceContext,
}

impl StatusService {
    #[must_use]
    pub fn new(context: ServiceContext) -> Self {
        Self { context }
    }

    /// Builds the current report.
    #[must_use]
    pub fn report(&self) -> StatusReport {
        let stats = self.context.stats();
        StatusReport {
            service: self.context.service_name().to_owned(),
            port: stats.port(),
            uptime_secs: self.context.uptime_secs(),
            pool_size: stats.pool_size(),
            busy_workers: stats.busy_workers(),
            requests_served: stats.requests_served(),
            log_lines: self.context.log().len(),
        }
    }
}

impl ServiceHandler for StatusService {
    fn path(&self) -> &str {
        STATUS_PATH
    }

    fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
        Response::json(&self.report())
            .map_err(|error| HandlerFault::with_source("failed to encode status", error))
    }
}
