//! Memcached cache backend speaking the ASCII protocol.
//!
//! Each operation opens a short-lived TCP connection, issues one command and
//! reads one reply. Values are stored as JSON text with flags `0` and an
//! absolute unix expiry, which memcached accepts for any timestamp past
//! thirty days since the epoch.

use std::io::{BufRead, BufReader, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde_json::Value;
use tracing::debug;

use crate::cache::{Cache, CacheConfig};
use crate::error::CacheError;

const MAX_KEY_LEN: usize = 250;
const DEFAULT_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct MemcachedCache {
    host: String,
    port: u16,
    timeout: Duration,
}

impl MemcachedCache {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }

    /// Connect, read and write deadline for every operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connect(&self) -> Result<TcpStream, CacheError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| {
                CacheError::Protocol(format!("{}:{} did not resolve", self.host, self.port))
            })?;
        let stream = TcpStream::connect_timeout(&addr, self.timeout)?;
        stream.set_read_timeout(Some(self.timeout))?;
        stream.set_write_timeout(Some(self.timeout))?;
        Ok(stream)
    }
}

impl Cache for MemcachedCache {
    fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        check_key(key)?;
        let mut stream = self.connect()?;
        stream.write_all(format!("get {key}\r\n").as_bytes())?;

        let mut reader = BufReader::new(stream);
        match read_value(&mut reader)? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| CacheError::Corrupt(e.to_string()))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value, expires_at: SystemTime) -> Result<(), CacheError> {
        check_key(key)?;
        let data = value.to_string();
        let exptime = expires_at
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
            .max(1);

        let mut stream = self.connect()?;
        let mut command = format!("set {key} 0 {exptime} {}\r\n", data.len()).into_bytes();
        command.extend_from_slice(data.as_bytes());
        command.extend_from_slice(b"\r\n");
        stream.write_all(&command)?;

        let mut reader = BufReader::new(stream);
        read_stored(&mut reader)?;
        debug!(key, exptime, "memcached value stored");
        Ok(())
    }
}

fn check_key(key: &str) -> Result<(), CacheError> {
    if key.is_empty() || key.len() > MAX_KEY_LEN {
        return Err(CacheError::Protocol(format!(
            "key length {} outside 1..={MAX_KEY_LEN}",
            key.len()
        )));
    }
    if key.bytes().any(|b| b.is_ascii_whitespace() || b.is_ascii_control()) {
        return Err(CacheError::Protocol(format!("key {key:?} contains whitespace")));
    }
    Ok(())
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, CacheError> {
    let mut line = String::new();
    if reader.read_line(&mut line)? == 0 {
        return Err(CacheError::Protocol("connection closed".to_string()));
    }
    Ok(line.trim_end_matches(|c: char| c == '\r' || c == '\n').to_string())
}

/// Parse a `get` reply: either `END`, or one `VALUE` block followed by `END`.
fn read_value<R: BufRead>(reader: &mut R) -> Result<Option<Vec<u8>>, CacheError> {
    let header = read_line(reader)?;
    if header == "END" {
        return Ok(None);
    }

    let mut parts = header.split(' ');
    let len = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some("VALUE"), Some(_key), Some(_flags), Some(len)) => len
            .parse::<usize>()
            .map_err(|_| CacheError::Protocol(header.clone()))?,
        _ => return Err(CacheError::Protocol(header.clone())),
    };

    let mut data = vec![0u8; len + 2];
    reader.read_exact(&mut data)?;
    if !data.ends_with(b"\r\n") {
        return Err(CacheError::Protocol("value block not terminated".to_string()));
    }
    data.truncate(len);

    let trailer = read_line(reader)?;
    if trailer != "END" {
        return Err(CacheError::Protocol(trailer));
    }
    Ok(Some(data))
}

fn read_stored<R: BufRead>(reader: &mut R) -> Result<(), CacheError> {
    match read_line(reader)?.as_str() {
        "STORED" => Ok(()),
        other => Err(CacheError::Protocol(other.to_string())),
    }
}
