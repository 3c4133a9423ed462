//! HTTP transport types and the `Transport` seam.
//!
//! # Design
//! Requests and responses are plain owned data. `AkhetClient` builds an
//! `HttpRequest`, hands it to a `Transport`, and interprets the returned
//! `HttpResponse`. Any status code is a successful transport result; only
//! failures that never produced a status (refused connection, DNS, TLS)
//! are `TransportError`s. Swapping the transport is how tests run the
//! pipeline without a network.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use tracing::debug;

use crate::error::{AkhetError, TransportError};

/// HTTP methods the Akhet API accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exact, case-sensitive match. `"get"` is rejected just like `"PUT"`.
impl FromStr for HttpMethod {
    type Err = AkhetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            other => Err(AkhetError::MethodNotSupported(other.to_string())),
        }
    }
}

/// An HTTP request described as plain data.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl HttpRequest {
    /// First header value matching `name`, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// An HTTP response described as plain data.
///
/// `body` is `None` when the transport got a status line but could not
/// deliver a body.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

/// Performs one HTTP round-trip.
///
/// Implementations must be safe to share across threads; the client holds
/// its transport behind an `Arc`.
pub trait Transport: Send + Sync {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Largest response body `UreqTransport` will read.
pub const MAX_BODY_BYTES: u64 = 64 * 1024 * 1024;

/// Blocking transport backed by a `ureq` agent.
///
/// Status codes are returned as data rather than errors so the client can
/// interpret 401 and friends itself.
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .build()
            .new_agent();
        Self { agent }
    }

    /// Transport with an overall per-request deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        let agent = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(timeout))
            .build()
            .new_agent();
        Self { agent }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        // The API reads GET parameters from the JSON body, so GET carries one too.
        let mut builder = match request.method {
            HttpMethod::Get => self.agent.get(&request.url).force_send_body(),
            HttpMethod::Post => self.agent.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let mut response =
            builder
                .send(request.body.as_bytes())
                .map_err(|e| TransportError::Request {
                    url: request.url.clone(),
                    reason: e.to_string(),
                })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| Some((k.as_str().to_string(), v.to_str().ok()?.to_string())))
            .collect();
        // A body that arrives but is not UTF-8 is still a body; decoding it
        // lossily lets the envelope parser report it as an invalid response.
        let body = match response
            .body_mut()
            .with_config()
            .limit(MAX_BODY_BYTES)
            .read_to_vec()
        {
            Ok(bytes) => Some(decode_body(bytes, &request.url)),
            Err(e) => {
                debug!(url = %request.url, error = %e, "response body unreadable");
                None
            }
        };

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

fn decode_body(bytes: Vec<u8>, url: &str) -> String {
    match String::from_utf8(bytes) {
        Ok(body) => body,
        Err(e) => {
            debug!(url, "response body is not valid UTF-8");
            String::from_utf8_lossy(e.as_bytes()).into_owned()
        }
    }
}
