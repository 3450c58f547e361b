//! Request and response values exchanged with service handlers.
//!
//! hyper owns the wire format; handlers only see the method, the decoded
//! path, query parameters and headers of a request, and answer with a status,
//! a content type and a body.

use std::borrow::Cow;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::header::{self, HeaderValue};
use hyper::StatusCode;
use percent_encoding::percent_decode_str;
use serde::Serialize;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";
const APPLICATION_JSON: &str = "application/json";

/// Request as seen by a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    method: String,
    target: String,
    path: String,
    query: Vec<(String, String)>,
    headers: Vec<(String, String)>,
}

impl Request {
    /// Builds a `GET` request for `target`, e.g. `/info/log.txt?count=5`.
    #[must_use]
    pub fn get(target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: "GET".to_owned(),
            target: target.to_owned(),
            path,
            query,
            headers: Vec::new(),
        }
    }

    /// Converts a request received by hyper.
    ///
    /// Absolute-form targets (`GET http://host:port/path`) are reduced to
    /// their path and query, so dispatch sees the same path either way.
    #[must_use]
    pub fn from_http<B>(request: &hyper::Request<B>) -> Self {
        let uri = request.uri();
        let target = uri
            .path_and_query()
            .map_or_else(|| uri.path().to_owned(), |target| target.as_str().to_owned());
        let (path, query) = split_target(&target);
        let headers = request
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|value| (name.as_str().to_owned(), value.to_owned()))
            })
            .collect();
        Self {
            method: request.method().as_str().to_owned(),
            target,
            path,
            query,
            headers,
        }
    }

    /// Request method, e.g. `GET`.
    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Origin-form request target including any query string.
    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Percent-decoded path used for dispatch.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of the query parameter `name`.
    #[must_use]
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

fn split_target(target: &str) -> (String, Vec<(String, String)>) {
    let (raw_path, raw_query) = target.split_once('?').unwrap_or((target, ""));
    let path = percent_decode_str(raw_path).decode_utf8_lossy().into_owned();
    let query = raw_query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            (decode_component(key), decode_component(value))
        })
        .collect();
    (path, query)
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    percent_decode_str(&spaced).decode_utf8_lossy().into_owned()
}

/// Response produced by a handler or by the host itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    status: u16,
    content_type: &'static str,
    body: Vec<u8>,
}

impl Response {
    /// `200 OK` with a plain-text body.
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            content_type: TEXT_PLAIN,
            body: body.into().into_bytes(),
        }
    }

    /// `200 OK` with `value` serialised as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serialisation error when `value` cannot be encoded.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, serde_json::Error> {
        let mut body = serde_json::to_vec_pretty(value)?;
        body.push(b'\n');
        Ok(Self {
            status: 200,
            content_type: APPLICATION_JSON,
            body,
        })
    }

    /// `400 Bad Request` with a short explanation.
    #[must_use]
    pub fn bad_request(reason: &str) -> Self {
        Self::text(format!("bad request: {reason}\n")).with_status(400)
    }

    /// `404 Not Found` for `path`.
    #[must_use]
    pub fn not_found(path: &str) -> Self {
        Self::text(format!("no service mounted at {path}\n")).with_status(404)
    }

    /// `500 Internal Server Error`.
    #[must_use]
    pub fn server_error() -> Self {
        Self::text("internal server error\n").with_status(500)
    }

    /// Replaces the status code.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Value of the `Content-Type` header.
    #[must_use]
    pub const fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// Raw body bytes.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Body decoded as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    /// Converts into the response hyper writes to the connection.
    #[must_use]
    pub fn into_http(self) -> hyper::Response<Full<Bytes>> {
        let mut response = hyper::Response::new(Full::new(Bytes::from(self.body)));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        response
            .headers_mut()
            .insert(header::CONTENT_TYPE, HeaderValue::from_static(self.content_type));
        response
    }
}
