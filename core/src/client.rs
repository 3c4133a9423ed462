//! The request pipeline every Akhet API call passes through.
//!
//! # Design
//! `AkhetClient` holds immutable connection settings, a `Transport` and an
//! optional cache. `execute` runs the whole pipeline:
//!
//! 1. reject methods other than GET and POST before any I/O;
//! 2. for cacheable GETs, return a cached value if one exists;
//! 3. build the request (`build_request`);
//! 4. send it through the transport;
//! 5. interpret the response (`parse_response`);
//! 6. for cacheable GETs, store the returned `data`.
//!
//! `build_request` and `parse_response` are public so a host that performs
//! its own I/O can drive steps 3 and 5 directly.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{cache_key, Cache, CacheConfig};
use crate::config::{ClientConfig, Protocol, API_VERSION};
use crate::error::{AkhetError, AkhetResult};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
use crate::memcached::MemcachedCache;
use crate::payload::Payload;

/// Cache backend plus the lifetime given to values stored in it.
#[derive(Clone)]
struct CacheLayer {
    backend: Arc<dyn Cache>,
    ttl: Duration,
}

/// Client for an Akhet server.
#[derive(Clone)]
pub struct AkhetClient {
    base_url: String,
    username: String,
    password: String,
    transport: Arc<dyn Transport>,
    cache: Option<CacheLayer>,
}

impl fmt::Debug for AkhetClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AkhetClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("cache_ttl", &self.cache.as_ref().map(|c| c.ttl))
            .finish_non_exhaustive()
    }
}

/// The shape of every 200 response body. `version` is kept loose so a
/// missing or non-string version still reaches the version check.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    version: Value,
    #[serde(default)]
    data: Value,
}

impl AkhetClient {
    /// Client for `{protocol}://{host}` using HTTP basic authentication.
    ///
    /// `protocol` is matched case-insensitively against `http` and `https`;
    /// anything else fails with `InvalidProtocol`.
    pub fn new(host: &str, username: &str, password: &str, protocol: &str) -> AkhetResult<Self> {
        let protocol: Protocol = protocol.parse()?;
        Ok(Self {
            base_url: format!("{protocol}://{host}"),
            username: username.to_string(),
            password: password.to_string(),
            transport: Arc::new(UreqTransport::new()),
            cache: None,
        })
    }

    /// Client built from `config`, with memcached attached when the config
    /// has a cache section.
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut client = Self {
            base_url: config.base_url(),
            username: config.username.clone(),
            password: config.password.clone(),
            transport: Arc::new(UreqTransport::new()),
            cache: None,
        };
        if let Some(cache) = &config.cache {
            client.enable_cache(cache);
        }
        client
    }

    /// Replace the transport used for every subsequent call.
    pub fn with_transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Arc::new(transport);
        self
    }

    /// Cache GET results in the memcached server named by `config`.
    /// Replaces any cache attached earlier.
    pub fn enable_cache(&mut self, config: &CacheConfig) {
        debug!(host = %config.host, port = config.port, ttl_secs = config.ttl_secs, "memcached enabled");
        self.set_cache(MemcachedCache::from_config(config), config.ttl());
    }

    /// Cache GET results in `backend` for `ttl`. Replaces any cache attached
    /// earlier.
    pub fn set_cache(&mut self, backend: impl Cache + 'static, ttl: Duration) {
        self.cache = Some(CacheLayer {
            backend: Arc::new(backend),
            ttl,
        });
    }

    /// Like `set_cache`, for a backend the caller keeps a handle to.
    pub fn set_shared_cache(&mut self, backend: Arc<dyn Cache>, ttl: Duration) {
        self.cache = Some(CacheLayer { backend, ttl });
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn api_version(&self) -> &'static str {
        API_VERSION
    }

    /// Issue one API call and return the `data` member of the response.
    ///
    /// GET results are served from and stored into the cache unless
    /// `bypass_cache` is set or no cache is attached.
    pub fn execute(
        &self,
        resource: &str,
        method: &str,
        payload: &Payload,
        bypass_cache: bool,
    ) -> AkhetResult<Value> {
        let method: HttpMethod = method.parse()?;

        let cache = match (&self.cache, method) {
            (Some(layer), HttpMethod::Get) if !bypass_cache => {
                Some((layer, cache_key(resource, payload)))
            }
            _ => None,
        };

        if let Some((layer, key)) = &cache {
            match layer.backend.get(key) {
                Ok(Some(value)) => {
                    debug!(resource, key = %key, "cache hit");
                    return Ok(value);
                }
                Ok(None) => debug!(resource, key = %key, "cache miss"),
                Err(e) => warn!(resource, error = %e, "cache read failed, treating as miss"),
            }
        }

        let request = self.build_request(resource, method, payload);
        debug!(method = %method, url = %request.url, "sending request");
        let response = self.transport.send(&request)?;
        let data = self.parse_response(response)?;

        if let Some((layer, key)) = &cache {
            let expires_at = SystemTime::now() + layer.ttl;
            match layer.backend.set(key, &data, expires_at) {
                Ok(()) => debug!(resource, key = %key, "cached response"),
                Err(e) => warn!(resource, error = %e, "cache write failed"),
            }
        }

        Ok(data)
    }

    /// `{base_url}/{API_VERSION}/{resource}` with JSON body and basic auth.
    pub fn build_request(&self, resource: &str, method: HttpMethod, payload: &Payload) -> HttpRequest {
        let credentials = STANDARD.encode(format!("{}:{}", self.username, self.password));
        HttpRequest {
            method,
            url: format!("{}/{API_VERSION}/{resource}", self.base_url),
            headers: vec![
                ("Content-Type".to_string(), "application/json".to_string()),
                ("Authorization".to_string(), format!("Basic {credentials}")),
            ],
            body: payload.to_json(),
        }
    }

    /// Turn a response into the envelope's `data`, or the matching error.
    pub fn parse_response(&self, response: HttpResponse) -> AkhetResult<Value> {
        match response.status {
            200 => {
                let body = response.body.ok_or(AkhetError::ServerNotAvailable)?;
                let envelope: Envelope = serde_json::from_str(&body)
                    .map_err(|e| AkhetError::InvalidResponse(e.to_string()))?;

                if envelope.version.as_str() != Some(API_VERSION) {
                    let actual = match envelope.version {
                        Value::String(s) => s,
                        other => other.to_string(),
                    };
                    return Err(AkhetError::VersionMismatch {
                        expected: API_VERSION.to_string(),
                        actual,
                    });
                }
                match envelope.data.get("error") {
                    Some(error) if !error.is_null() => {
                        return Err(server_side_error(error, envelope.data.get("errorno")));
                    }
                    _ => {}
                }
                Ok(envelope.data)
            }
            401 => Err(AkhetError::Unauthorized),
            status => Err(AkhetError::InvalidHttpStatus {
                status,
                body: response.body.unwrap_or_default(),
            }),
        }
    }
}

fn server_side_error(error: &Value, errorno: Option<&Value>) -> AkhetError {
    let message = match error {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let errorno = match errorno {
        Some(Value::Number(n)) => n.as_i64().unwrap_or_default(),
        Some(Value::String(s)) => s.parse().unwrap_or_default(),
        _ => 0,
    };
    AkhetError::ServerSideError { message, errorno }
}
