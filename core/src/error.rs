//! Error types for the Akhet API client.
//!
//! # Design
//! Every failure a call can produce is a variant of `AkhetError`, and every
//! variant is terminal: the client never retries. Server-reported errors and
//! unexpected statuses keep their structured fields (`errorno`, `status`,
//! raw `body`) so callers can branch on them without parsing messages.
//!
//! Cache and transport backends have their own error types. Cache errors
//! never reach callers of `execute`; transport errors surface once as
//! `AkhetError::Transport`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type AkhetResult<T> = Result<T, AkhetError>;

/// Errors returned by `AkhetClient`.
#[derive(Debug, Error)]
pub enum AkhetError {
    /// Construction asked for a scheme other than http or https.
    #[error("invalid protocol {0:?}: only http and https are supported")]
    InvalidProtocol(String),

    /// `execute` was called with a method other than GET or POST.
    #[error("method {0:?} not supported")]
    MethodNotSupported(String),

    /// The server answered 200 but the transport delivered no body.
    #[error("the server is not available")]
    ServerNotAvailable,

    /// The envelope was produced by a different protocol revision.
    #[error("server API version {actual:?} not allowed (expected {expected:?})")]
    VersionMismatch { expected: String, actual: String },

    /// The server reported an application-level error inside `data`.
    #[error("server error {errorno}: {message}")]
    ServerSideError { message: String, errorno: i64 },

    /// The server returned 401.
    #[error("user not authorized")]
    Unauthorized,

    /// The server returned a status other than 200 or 401.
    #[error("invalid HTTP status {status}: {body}")]
    InvalidHttpStatus { status: u16, body: String },

    /// The request never produced an HTTP status (refused, reset, DNS).
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),

    /// A 200 body could not be read as the expected envelope or value.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A request payload could not be serialized to a JSON object.
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Client configuration is missing or malformed.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Failures raised by a `Transport` before any HTTP status was received.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request to {url} failed: {reason}")]
    Request { url: String, reason: String },
}

/// Failures raised by a `Cache` backend.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The backend answered with something outside its protocol.
    #[error("unexpected cache reply: {0}")]
    Protocol(String),

    /// A stored value was not valid JSON.
    #[error("cached value is corrupt: {0}")]
    Corrupt(String),
}
