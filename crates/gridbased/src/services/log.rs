use std::sync::Arc;

use crate::http::{Request, Response};
use crate::logbuf::LogRingBuffer;
use crate::registry::{HandlerFault, ServiceHandler};

/// Mount path of the log service.
pub const LOG_PATH: &str = "/info/log.txt";

/// Lines returned when the request carries no `count` parameter.
pub const DEFAULT_LOG_COUNT: usize = 10_000;

/// Serves the tail of the in-memory log as plain text.
#[derive(Debug)]
pub struct LogService {
    log: Arc<LogRingBuffer>,
}

impl LogService {
    #[must_use]
    pub fn new(log: Arc<LogRingBuffer>) -> Self {
        Self { log }
    }
}

impl ServiceHandler for LogService {
    fn path(&self) -> &str {
        LOG_PATH
    }

    fn handle(&self, request: &Request) -> Result<Response, HandlerFault> {
        let count = match request.query_param("count") {
            None => DEFAULT_LOG_COUNT,
            Some(raw) => match raw.trim().parse::<usize>() {
                Ok(count) => count,
                Err(_) => return Ok(Response::bad_request("count must be a non-negative integer")),
            },
        };
        let mut body = String::new();
        for line in self.log.tail(count) {
            body.push_str(&line);
            body.push('\n');
        }
        Ok(Response::text(body))
    }
}

#[cfg(test)]
mod tests {
    use rstest::{fixture, rstest};

    use super::*;

    #[fixture]
    fn service() -> LogService {
        let log = Arc::new(LogRingBuffer::new(100));
        for index in 1..=5 {
            log.append(format!("line {index}"), None);
        }
        LogService::new(log)
    }

    #[rstest]
    #[case("/info/log.txt", "line 1\nline 2\nline 3\nline 4\nline 5\n")]
    #[case("/info/log.txt?count=2", "line 4\nline 5\n")]
    #[case("/info/log.txt?count=0", "")]
    fn returns_requested_tail(service: LogService, #[case] target: &str, #[case] expected: &str) {
        let response = service.handle(&Request::get(target)).expect("log answers");
        assert_eq!(response.status(), 200);
        assert_eq!(response.body_text(), expected);
    }

    #[rstest]
    fn rejects_non_numeric_count(service: LogService) {
        let response = service
            .handle(&Request::get("/info/log.txt?count=lots"))
            .expect("log answers");
        assert_eq!(response.status(), 400);
    }
}
