//! Routes requests to registered handlers.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use crate::http::{Request, Response};
use crate::registry::HandlerRegistry;

use super::{DispatchError, HOST_TARGET};

/// Exact-path dispatcher over a shared registry.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
}

impl Dispatcher {
    /// Creates a dispatcher over `registry`.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    /// Registry consulted for every request.
    #[must_use]
    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    /// Invokes the handler mounted at the request path.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Miss`] when nothing is mounted at the path,
    /// and [`DispatchError::Fault`] or [`DispatchError::Panic`] when the
    /// handler fails.
    pub fn dispatch(&self, request: &Request) -> Result<Response, DispatchError> {
        let entry = self
            .registry
            .resolve(request.path())
            .ok_or_else(|| DispatchError::Miss {
                path: request.path().to_owned(),
            })?;
        let handler = entry.handler();
        match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request))) {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(source)) => Err(DispatchError::Fault {
                service: entry.name().to_owned(),
                source,
            }),
            Err(payload) => Err(DispatchError::Panic {
                service: entry.name().to_owned(),
                message: panic_message(payload.as_ref()),
            }),
        }
    }

    /// Dispatches and converts failures into error responses.
    #[must_use]
    pub fn respond(&self, request: &Request) -> Response {
        match self.dispatch(request) {
            Ok(response) => response,
            Err(error @ DispatchError::Miss { .. }) => {
                debug!(
                    target: HOST_TARGET,
                    path = request.path(),
                    "no service for request"
                );
                Response::not_found(request.path()).with_status(error.status())
            }
            Err(error) => {
                warn!(
                    target: HOST_TARGET,
                    path = request.path(),
                    error = %error,
                    "service failed to answer request"
                );
                Response::server_error().with_status(error.status())
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use rstest::{fixture, rstest};

    use super::*;
    use crate::registry::{HandlerFault, ServiceHandler};

    struct Echo;

    impl ServiceHandler for Echo {
        fn path(&self) -> &str {
            "/echo"
        }

        fn handle(&self, request: &Request) -> Result<Response, HandlerFault> {
            Ok(Response::text(request.query_param("say").unwrap_or("")))
        }
    }

    struct Failing;

    impl ServiceHandler for Failing {
        fn path(&self) -> &str {
            "/fail"
        }

        fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
            Err(HandlerFault::new("backing store offline"))
        }
    }

    struct Panicking;

    impl ServiceHandler for Panicking {
        fn path(&self) -> &str {
            "/panic"
        }

        fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
            panic!("handler exploded");
        }
    }

    #[fixture]
    fn dispatcher() -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        registry
            .register("echo", || Ok::<_, Infallible>(Echo))
            .expect("echo registers");
        registry
            .register("fail", || Ok::<_, Infallible>(Failing))
            .expect("fail registers");
        registry
            .register("panic", || Ok::<_, Infallible>(Panicking))
            .expect("panic registers");
        Dispatcher::new(Arc::new(registry))
    }

    #[rstest]
    fn routes_exact_paths(dispatcher: Dispatcher) {
        let response = dispatcher
            .dispatch(&Request::get("/echo?say=hello"))
            .expect("echo answers");
        assert_eq!(response.body_text(), "hello");
    }

    #[rstest]
    #[case("/unknown", 404)]
    #[case("/echo/", 404)]
    #[case("/fail", 500)]
    #[case("/panic", 500)]
    fn failures_map_to_status_codes(
        dispatcher: Dispatcher,
        #[case] target: &str,
        #[case] status: u16,
    ) {
        let error = dispatcher
            .dispatch(&Request::get(target))
            .expect_err("dispatch should fail");
        assert_eq!(error.status(), status);
        assert_eq!(dispatcher.respond(&Request::get(target)).status(), status);
    }

    #[rstest]
    fn panics_are_reported_with_their_message(dispatcher: Dispatcher) {
        let error = dispatcher
            .dispatch(&Request::get("/panic"))
            .expect_err("panic is caught");
        match error {
            DispatchError::Panic { service, message } => {
                assert_eq!(service, "panic");
                assert_eq!(message, "handler exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
        // Later requests are still served.
        assert!(dispatcher.dispatch(&Request::get("/echo")).is_ok());
    }
}
