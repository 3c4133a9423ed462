//! Client configuration.
//!
//! `ClientConfig` is immutable once a client is built from it. It can be
//! deserialized (e.g. from a section of an application's own config file)
//! or read from `AKHET_*` environment variables.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

use crate::cache::{CacheConfig, DEFAULT_TTL_SECS};
use crate::error::{AkhetError, AkhetResult};

/// Protocol revision this client speaks. Responses carrying any other
/// version are rejected.
pub const API_VERSION: &str = "0.8";

/// URL scheme used to reach the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Case-insensitive: `"HTTPS"` and `"https"` are the same protocol.
impl FromStr for Protocol {
    type Err = AkhetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(AkhetError::InvalidProtocol(s.to_string())),
        }
    }
}

impl TryFrom<String> for Protocol {
    type Error = AkhetError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    pub host: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default)]
    pub cache: Option<CacheConfig>,
}

impl ClientConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            protocol: Protocol::Http,
            cache: None,
        }
    }

    /// Read configuration from `AKHET_*` environment variables.
    pub fn from_env() -> AkhetResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, using the same keys as `from_env`.
    ///
    /// Caching is configured only when both `AKHET_MEMCACHED_HOST` and
    /// `AKHET_MEMCACHED_PORT` are present.
    pub fn from_lookup<F>(lookup: F) -> AkhetResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| AkhetError::Config(format!("{key} is not set")))
        };

        let protocol = match lookup("AKHET_PROTOCOL") {
            Some(p) => p.parse()?,
            None => Protocol::Http,
        };

        let cache = match (lookup("AKHET_MEMCACHED_HOST"), lookup("AKHET_MEMCACHED_PORT")) {
            (Some(host), Some(port)) => {
                let port = parse_number::<u16>("AKHET_MEMCACHED_PORT", &port)?;
                let ttl_secs = match lookup("AKHET_MEMCACHED_TTL") {
                    Some(ttl) => parse_number::<u64>("AKHET_MEMCACHED_TTL", &ttl)?,
                    None => DEFAULT_TTL_SECS,
                };
                Some(CacheConfig {
                    host,
                    port,
                    ttl_secs,
                })
            }
            _ => None,
        };

        Ok(Self {
            host: required("AKHET_HOST")?,
            username: required("AKHET_USERNAME")?,
            password: required("AKHET_PASSWORD")?,
            protocol,
            cache,
        })
    }

    /// `{protocol}://{host}`.
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.host)
    }
}

fn parse_number<T: FromStr>(key: &str, value: &str) -> AkhetResult<T> {
    value
        .trim()
        .parse()
        .map_err(|_| AkhetError::Config(format!("{key} must be a number, got {value:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const BASE: [(&str, &str); 3] = [
        ("AKHET_HOST", "akhet.example.org"),
        ("AKHET_USERNAME", "admin"),
        ("AKHET_PASSWORD", "secret"),
    ];

    #[test]
    fn protocol_parsing_is_case_insensitive() {
        assert_eq!("http".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("HTTP".parse::<Protocol>().unwrap(), Protocol::Http);
        assert_eq!("HTTPS".parse::<Protocol>().unwrap(), Protocol::Https);
        assert_eq!("hTtPs".parse::<Protocol>().unwrap().to_string(), "https");
    }

    #[test]
    fn other_protocols_are_rejected() {
        for bad in ["ftp", "ws", "", "https ", "http2"] {
            let err = bad.parse::<Protocol>().unwrap_err();
            assert!(matches!(err, AkhetError::InvalidProtocol(_)), "{bad:?}");
        }
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: ClientConfig = serde_json::from_str(
            r#"{"host":"akhet","username":"u","password":"p"}"#,
        )
        .unwrap();
        assert_eq!(config.protocol, Protocol::Http);
        assert!(config.cache.is_none());
        assert_eq!(config.base_url(), "http://akhet");
    }

    #[test]
    fn deserialization_rejects_unknown_protocol() {
        let result: Result<ClientConfig, _> = serde_json::from_str(
            r#"{"host":"akhet","username":"u","password":"p","protocol":"gopher"}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn lookup_reads_required_keys() {
        let config = ClientConfig::from_lookup(lookup(&BASE)).unwrap();
        assert_eq!(config.host, "akhet.example.org");
        assert_eq!(config.username, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.protocol, Protocol::Http);
        assert!(config.cache.is_none());
    }

    #[test]
    fn lookup_reports_missing_host() {
        let err = ClientConfig::from_lookup(lookup(&BASE[1..])).unwrap_err();
        assert!(matches!(err, AkhetError::Config(ref m) if m.contains("AKHET_HOST")));
    }

    #[test]
    fn lookup_configures_cache_with_default_ttl() {
        let mut vars = BASE.to_vec();
        vars.push(("AKHET_PROTOCOL", "HTTPS"));
        vars.push(("AKHET_MEMCACHED_HOST", "127.0.0.1"));
        vars.push(("AKHET_MEMCACHED_PORT", "11211"));
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert_eq!(config.base_url(), "https://akhet.example.org");
        assert_eq!(config.cache, Some(CacheConfig::new("127.0.0.1", 11211)));
    }

    #[test]
    fn lookup_rejects_bad_port() {
        let mut vars = BASE.to_vec();
        vars.push(("AKHET_MEMCACHED_HOST", "127.0.0.1"));
        vars.push(("AKHET_MEMCACHED_PORT", "eleven"));
        let err = ClientConfig::from_lookup(lookup(&vars)).unwrap_err();
        assert!(matches!(err, AkhetError::Config(_)));
    }

    #[test]
    fn cache_needs_both_host_and_port() {
        let mut vars = BASE.to_vec();
        vars.push(("AKHET_MEMCACHED_HOST", "127.0.0.1"));
        let config = ClientConfig::from_lookup(lookup(&vars)).unwrap();
        assert!(config.cache.is_none());
    }
}
