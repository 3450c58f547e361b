//! Port negotiation for the service host listener.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use tracing::{debug, info};

use super::{HOST_TARGET, HostError};

/// Ports tried for `base`, in order: `base`, then up to `attempts` further
/// ports. Force mode tries only `base`; the search stops at port 65535.
pub(super) fn candidate_ports(base: u16, attempts: u16, force: bool) -> impl Iterator<Item = u16> {
    let extra = if force { 0 } else { attempts };
    (0..=extra).map_while(move |offset| base.checked_add(offset))
}

/// Whether a bind failure means "this port is taken, try the next one".
fn port_unavailable(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::AddrInUse | io::ErrorKind::PermissionDenied
    )
}

/// Binds the first free port starting at `base`.
///
/// Returns the listener together with the port it actually bound.
pub(super) fn bind_with_fallback(
    host: &str,
    base: u16,
    attempts: u16,
    force: bool,
) -> Result<(TcpListener, u16), HostError> {
    let mut tried = 0_usize;
    let mut last_port = base;
    let mut last_error = io::Error::from(io::ErrorKind::AddrInUse);

    for port in candidate_ports(base, attempts, force) {
        let addr = resolve(host, port)?;
        tried += 1;
        last_port = port;
        match TcpListener::bind(addr) {
            Ok(listener) => {
                let bound = listener
                    .local_addr()
                    .map_or(port, |local| local.port());
                info!(
                    target: HOST_TARGET,
                    host,
                    base,
                    port = bound,
                    offset = tried - 1,
                    "listener bound"
                );
                return Ok((listener, bound));
            }
            Err(source) if force || !port_unavailable(&source) => {
                return Err(HostError::Bind { addr, source });
            }
            Err(source) => {
                debug!(
                    target: HOST_TARGET,
                    port,
                    error = %source,
                    "port unavailable, trying the next one"
                );
                last_error = source;
            }
        }
    }

    Err(HostError::BindExhausted {
        host: host.to_owned(),
        base,
        last: last_port,
        attempts: tried,
        source: last_error,
    })
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, HostError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| HostError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    addrs.next().ok_or_else(|| HostError::ResolveEmpty {
        host: host.to_owned(),
        port,
    })
}
