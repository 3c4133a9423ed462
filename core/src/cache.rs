//! Read-through caching for GET results.
//!
//! # Design
//! The cache is an optional dependency of `AkhetClient`. When none is
//! attached the pipeline never reads or writes one. Backends implement
//! `Cache`; errors they return are logged by the client and treated as a
//! miss (on read) or ignored (on write), so a dead cache degrades to
//! "caching disabled" rather than failing calls.
//!
//! Two backends ship with the crate: `MemoryCache` for in-process use and
//! `MemcachedCache` (see `memcached`) for a shared memcached server.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::CacheError;
use crate::payload::Payload;

/// Prefix shared by every key the client writes.
pub const KEY_PREFIX: &str = "AKHETCLIENT:";

/// Default lifetime of a cached value, in seconds.
pub const DEFAULT_TTL_SECS: u64 = 30;

/// Key/value store with absolute expiry. Must tolerate concurrent callers.
pub trait Cache: Send + Sync {
    /// `Ok(None)` is a miss, including an expired entry.
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError>;

    fn set(&self, key: &str, value: &Value, expires_at: SystemTime) -> Result<(), CacheError>;
}

/// Key for a GET of `resource` with `payload`.
pub fn cache_key(resource: &str, payload: &Payload) -> String {
    format!("{KEY_PREFIX}{resource}{}", payload.digest())
}

/// Location and lifetime settings for a memcached-backed cache.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CacheConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,
}

fn default_ttl_secs() -> u64 {
    DEFAULT_TTL_SECS
}

impl CacheConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_secs = ttl.as_secs();
        self
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// In-process cache. Expired entries read as a miss and are evicted on read.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: DashMap<String, (Value, SystemTime)>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Cache for MemoryCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let now = SystemTime::now();
        let hit = match self.entries.get(key) {
            Some(entry) if entry.1 > now => return Ok(Some(entry.0.clone())),
            Some(_) => true,
            None => false,
        };
        if hit {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &Value, expires_at: SystemTime) -> Result<(), CacheError> {
        self.entries
            .insert(key.to_string(), (value.clone(), expires_at));
        Ok(())
    }
}
