//! Test helpers for the host module.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::time::Duration;

use crate::http::{Request, Response};
use crate::registry::{HandlerFault, ServiceHandler};

/// Handler answering a fixed body at a fixed path.
pub(crate) struct FixedService {
    path: &'static str,
    body: &'static str,
}

impl FixedService {
    pub(crate) const fn new(path: &'static str, body: &'static str) -> Self {
        Self { path, body }
    }
}

impl ServiceHandler for FixedService {
    fn path(&self) -> &str {
        self.path
    }

    fn handle(&self, _request: &Request) -> Result<Response, HandlerFault> {
        Ok(Response::text(self.body))
    }
}

/// Sends `GET target` to `addr` and returns the status code and body.
pub(crate) fn http_get(addr: SocketAddr, target: &str) -> std::io::Result<(u16, String)> {
    let mut stream = send_get(addr, target)?;
    stream.set_read_timeout(Some(Duration::from_secs(5)))?;
    read_response(&mut stream)
}

/// Connects to `addr` and writes `GET target` without reading the answer.
pub(crate) fn send_get(addr: SocketAddr, target: &str) -> std::io::Result<TcpStream> {
    let mut stream = TcpStream::connect(addr)?;
    write!(
        stream,
        "GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
    )?;
    stream.flush()?;
    Ok(stream)
}

/// Reads a whole response from `stream` and returns its status and body.
pub(crate) fn read_response(stream: &mut TcpStream) -> std::io::Result<(u16, String)> {
    let mut raw = String::new();
    stream.read_to_string(&mut raw)?;

    let (head, body) = raw.split_once("\r\n\r\n").unwrap_or((raw.as_str(), ""));
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| std::io::Error::other(format!("malformed response: {head}")))?;
    Ok((status, body.to_owned()))
}

/// Binds `count` consecutive loopback ports and returns the first one with
/// the listeners keeping them occupied.
pub(crate) fn occupy_consecutive(count: u16) -> (u16, Vec<TcpListener>) {
    for _ in 0..64 {
        let first = TcpListener::bind(("127.0.0.1", 0)).expect("bind first listener");
        let base = first.local_addr().expect("first listener address").port();
        if base.checked_add(count).is_none() {
            continue;
        }
        let mut held = vec![first];
        for offset in 1..count {
            match TcpListener::bind(("127.0.0.1", base + offset)) {
                Ok(listener) => held.push(listener),
                Err(_) => break,
            }
        }
        if held.len() == usize::from(count) {
            return (base, held);
        }
    }
    panic!("could not find {count} consecutive free ports");
}
