//! Named handler registry consulted by the service host.
//!
//! The registry is populated once at startup and then shared read-only behind
//! an `Arc`. A failing handler factory is logged and skipped; it never stops
//! the remaining registrations.

use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::http::{Request, Response};

const REGISTRY_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registry");

/// Boxed error returned by handler factories.
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// A unit answering requests under one mounted path.
pub trait ServiceHandler: Send + Sync + 'static {
    /// Exact path this handler is mounted at, e.g. `/info/status.json`.
    fn path(&self) -> &str;

    /// Answers one request.
    ///
    /// # Errors
    ///
    /// Returns [`HandlerFault`] when the request cannot be served; the caller
    /// receives a server error and the host keeps running.
    fn handle(&self, request: &Request) -> Result<Response, HandlerFault>;
}

/// Failure reported by a handler while serving a request.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct HandlerFault {
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl HandlerFault {
    /// Creates a fault with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    /// Creates a fault wrapping the error that caused it.
    #[must_use]
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self {
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

/// Errors raised while registering a handler.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The factory failed to construct the handler.
    #[error("failed to construct service '{name}': {source}")]
    Construction {
        /// Service name passed to [`HandlerRegistry::register`].
        name: String,
        /// Error returned by the factory.
        #[source]
        source: BoxError,
    },
    /// The handler reported a path dispatch can never match.
    #[error("service '{name}' has invalid mount path '{path}'")]
    InvalidPath {
        /// Service name.
        name: String,
        /// Offending path.
        path: String,
    },
}

/// Handler stored under a unique name.
#[derive(Clone)]
pub struct RegisteredHandler {
    name: String,
    path: String,
    handler: Arc<dyn ServiceHandler>,
}

impl RegisteredHandler {
    /// Unique service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Mount path captured at registration.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Shared handler instance.
    #[must_use]
    pub fn handler(&self) -> &Arc<dyn ServiceHandler> {
        &self.handler
    }
}

impl fmt::Debug for RegisteredHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredHandler")
            .field("name", &self.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Mapping from service name to handler, kept in registration order.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    entries: Vec<RegisteredHandler>,
    index: HashMap<String, usize>,
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Constructs a handler with `factory` and stores it under `name`.
    ///
    /// A later registration under the same name replaces the earlier handler
    /// but keeps its position in [`all`](Self::all).
    ///
    /// # Errors
    ///
    /// Returns [`RegistrationError`] when the factory fails or the handler's
    /// path does not start with `/`. The failure is also logged and leaves
    /// the registry unchanged.
    pub fn register<H, E, F>(
        &mut self,
        name: impl Into<String>,
        factory: F,
    ) -> Result<(), RegistrationError>
    where
        H: ServiceHandler,
        E: Into<BoxError>,
        F: FnOnce() -> Result<H, E>,
    {
        let name = name.into();
        let result = Self::construct(&name, factory);
        match result {
            Ok(entry) => {
                info!(
                    target: REGISTRY_TARGET,
                    service = %entry.name,
                    path = %entry.path,
                    "service registered"
                );
                self.insert(entry);
                Ok(())
            }
            Err(error) => {
                warn!(
                    target: REGISTRY_TARGET,
                    service = %name,
                    error = %error,
                    "service registration failed"
                );
                Err(error)
            }
        }
    }

    fn construct<H, E, F>(name: &str, factory: F) -> Result<RegisteredHandler, RegistrationError>
    where
        H: ServiceHandler,
        E: Into<BoxError>,
        F: FnOnce() -> Result<H, E>,
    {
        let handler = factory().map_err(|source| RegistrationError::Construction {
            name: name.to_owned(),
            source: source.into(),
        })?;
        let path = handler.path().to_owned();
        if !path.starts_with('/') {
            return Err(RegistrationError::InvalidPath {
                name: name.to_owned(),
                path,
            });
        }
        Ok(RegisteredHandler {
            name: name.to_owned(),
            path,
            handler: Arc::new(handler),
        })
    }

    fn insert(&mut self, entry: RegisteredHandler) {
        if let Some(&slot) = self.index.get(&entry.name) {
            self.entries[slot] = entry;
        } else {
            self.index.insert(entry.name.clone(), self.entries.len());
            self.entries.push(entry);
        }
    }

    /// Handler registered under `name`.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<&RegisteredHandler> {
        self.index.get(name).map(|&slot| &self.entries[slot])
    }

    /// Handler mounted exactly at `path`; the earliest registration wins
    /// when several claim the same path.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&RegisteredHandler> {
        self.entries.iter().find(|entry| entry.path == path)
    }

    /// All handlers in registration order.
    #[must_use]
    pub fn all(&self) -> &[RegisteredHandler] {
        &self.entries
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::convert::Infallible;

    use rstest::{fixture, rstest};

    use super::*;

    struct FixedHandler {
        path: &'static str,
        body: &'static str,
    }

    impl ServiceHandler for FixedHandler {
        fn path(&self) -> &str {
            self.path
        }

        fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
            Ok(Response::text(self.body))
        }
    }

    fn fixed(path: &'static str, body: &'static str) -> Result<FixedHandler, Infallible> {
        Ok(FixedHandler { path, body })
    }

    #[fixture]
    fn registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry
            .register("status", || fixed("/status", "status"))
            .expect("status registers");
        registry
            .register("log", || fixed("/log.txt", "log"))
            .expect("log registers");
        registry
    }

    fn body_of(entry: &RegisteredHandler) -> String {
        entry
            .handler()
            .handle(&Request::get(entry.path()))
            .expect("handler answers")
            .body_text()
            .into_owned()
    }

    #[rstest]
    fn lookup_and_resolve_find_registered_handlers(registry: HandlerRegistry) {
        let log = registry.lookup("log").expect("log is registered");
        assert_eq!(log.path(), "/log.txt");
        let resolved = registry.resolve("/log.txt").expect("path resolves");
        assert_eq!(resolved.name(), "log");
        assert!(registry.lookup("threaddump").is_none());
        assert!(registry.resolve("/unknown").is_none());
    }

    #[rstest]
    fn all_preserves_registration_order(registry: HandlerRegistry) {
        let names: Vec<&str> = registry.all().iter().map(RegisteredHandler::name).collect();
        assert_eq!(names, ["status", "log"]);
        assert_eq!(registry.len(), 2);
    }

    #[rstest]
    fn failed_factory_leaves_registry_untouched(mut registry: HandlerRegistry) {
        let error = registry
            .register("broken", || Err::<FixedHandler, _>("disk unavailable"))
            .expect_err("factory failure surfaces");
        assert!(matches!(error, RegistrationError::Construction { ref name, .. } if name == "broken"));
        assert!(registry.lookup("broken").is_none());
        assert_eq!(registry.len(), 2);

        registry
            .register("threaddump", || fixed("/threads.txt", "threads"))
            .expect("later registrations still succeed");
        assert_eq!(registry.len(), 3);
    }

    #[rstest]
    fn relative_paths_are_rejected(mut registry: HandlerRegistry) {
        let error = registry
            .register("bad", || fixed("relative", "x"))
            .expect_err("path must be absolute");
        assert!(matches!(error, RegistrationError::InvalidPath { .. }));
    }

    #[rstest]
    fn re_registration_replaces_handler_in_place(mut registry: HandlerRegistry) {
        registry
            .register("status", || fixed("/status.json", "replacement"))
            .expect("overwrite registers");
        assert_eq!(registry.len(), 2);
        let status = registry.lookup("status").expect("status still registered");
        assert_eq!(status.path(), "/status.json");
        assert_eq!(body_of(status), "replacement");
        assert_eq!(registry.all()[0].name(), "status");
        assert!(registry.resolve("/status").is_none());
    }

    #[rstest]
    fn earliest_entry_answers_a_shared_path(mut registry: HandlerRegistry) {
        registry
            .register("shadow", || fixed("/log.txt", "shadow"))
            .expect("shadow registers");
        let resolved = registry.resolve("/log.txt").expect("path resolves");
        assert_eq!(resolved.name(), "log");
        assert_eq!(body_of(resolved), "log");
    }
}
