//! Accept loop and per-connection serving on the request runtime.
//!
//! hyper parses each connection; handlers run on the runtime's blocking
//! pool so a slow handler never stalls the accept loop. A semaphore sized to
//! `max_workers` is acquired before every accept: while all permits are out,
//! further clients wait in the listen backlog instead of an in-process queue.

use std::convert::Infallible;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, watch};
use tracing::{debug, info, warn};

use crate::http::{Request, Response};

use super::dispatch::Dispatcher;
use super::stats::HostStats;
use super::{ERROR_BACKOFF, HOST_TARGET};

/// Upper bound on the wait for in-flight connections once accepting stops.
const DRAIN_GRACE: Duration = Duration::from_secs(30);

/// Collaborators every connection needs to answer a request.
pub(super) struct ConnectionContext {
    pub(super) dispatcher: Dispatcher,
    pub(super) stats: Arc<HostStats>,
    pub(super) idle_timeout: Duration,
}

impl ConnectionContext {
    fn respond(&self, request: &Request) -> Response {
        let _busy = self
            .stats
            .begin(format!("{} {}", request.method(), request.target()));
        self.dispatcher.respond(request)
    }
}

/// Accept loop running until the shutdown flag is raised.
pub(super) struct Server {
    pub(super) listener: TcpListener,
    pub(super) context: Arc<ConnectionContext>,
    pub(super) permits: Arc<Semaphore>,
    pub(super) shutdown: watch::Receiver<bool>,
}

impl Server {
    pub(super) async fn serve(self) {
        let Self {
            listener,
            context,
            permits,
            mut shutdown,
        } = self;
        context.stats.set_accepting(true);
        info!(
            target: HOST_TARGET,
            addr = ?listener.local_addr().ok(),
            "accepting connections"
        );

        // Every connection task holds a sender; recv yields None once all finish.
        let (drain_tx, mut drain_rx) = mpsc::channel::<()>(1);
        let mut last_error = None::<io::ErrorKind>;
        loop {
            let permit = tokio::select! {
                _ = shutdown.wait_for(|stopping| *stopping) => break,
                permit = Arc::clone(&permits).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };
            let accepted = tokio::select! {
                _ = shutdown.wait_for(|stopping| *stopping) => break,
                accepted = listener.accept() => accepted,
            };
            match accepted {
                Ok((stream, peer)) => {
                    last_error = None;
                    debug!(target: HOST_TARGET, %peer, "connection accepted");
                    tokio::spawn(serve_connection(
                        stream,
                        peer,
                        Arc::clone(&context),
                        permit,
                        drain_tx.clone(),
                    ));
                }
                Err(error) => {
                    let kind = error.kind();
                    if last_error != Some(kind) {
                        warn!(target: HOST_TARGET, error = %error, "accept error");
                    }
                    last_error = Some(kind);
                    drop(permit);
                    tokio::time::sleep(ERROR_BACKOFF).await;
                }
            }
        }

        context.stats.set_accepting(false);
        // Close the port before draining so no new client queues behind us.
        drop(listener);
        drop(drain_tx);
        if tokio::time::timeout(DRAIN_GRACE, drain_rx.recv()).await.is_err() {
            warn!(
                target: HOST_TARGET,
                busy = context.stats.busy_workers(),
                "connections still open after drain grace"
            );
        }
    }
}

/// Serves one request on `stream`, then closes it.
async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<ConnectionContext>,
    _permit: OwnedSemaphorePermit,
    _drain: mpsc::Sender<()>,
) {
    let mut builder = http1::Builder::new();
    builder.keep_alive(false);
    if !context.idle_timeout.is_zero() {
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(context.idle_timeout);
    }
    let service = service_fn(move |request: hyper::Request<Incoming>| {
        answer(Arc::clone(&context), request)
    });
    if let Err(error) = builder
        .serve_connection(TokioIo::new(stream), service)
        .await
    {
        debug!(target: HOST_TARGET, %peer, error = %error, "connection closed with error");
    }
}

async fn answer(
    context: Arc<ConnectionContext>,
    request: hyper::Request<Incoming>,
) -> Result<hyper::Response<Full<Bytes>>, Infallible> {
    let request = Request::from_http(&request);
    let response = tokio::task::spawn_blocking(move || context.respond(&request))
        .await
        .unwrap_or_else(|error| {
            warn!(target: HOST_TARGET, error = %error, "request task failed");
            Response::server_error()
        });
    Ok(response.into_http())
}
