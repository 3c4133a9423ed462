//! Blocking client for the Akhet instance management API.
//!
//! # Overview
//! Every call funnels through `AkhetClient::execute`, which validates the
//! method, optionally serves GETs from a cache, sends one authenticated JSON
//! request, and turns the response envelope into either its `data` or a
//! typed `AkhetError`.
//!
//! # Design
//! - Connection settings are immutable after construction; the only
//!   shared mutable state is the optional cache backend.
//! - The transport and the cache are injected behind the `Transport` and
//!   `Cache` traits, so both can be replaced with fakes.
//! - `build_request` / `parse_response` keep the pure halves of the
//!   pipeline available to hosts that perform I/O themselves.
//! - Nothing is retried. Each failure surfaces once to the caller.

pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod memcached;
mod operations;
pub mod payload;
pub mod types;

pub use cache::{cache_key, Cache, CacheConfig, MemoryCache};
pub use client::AkhetClient;
pub use config::{ClientConfig, Protocol, API_VERSION};
pub use error::{AkhetError, AkhetResult, CacheError, TransportError};
pub use http::{HttpMethod, HttpRequest, HttpResponse, Transport, UreqTransport};
pub use memcached::MemcachedCache;
pub use payload::Payload;
pub use types::{CreatedInstance, InstanceConfig, ResolutionRequest};
