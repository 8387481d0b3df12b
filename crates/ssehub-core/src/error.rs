//! Error types for the SSE hub.

use thiserror::Error;

use crate::SessionKey;

/// Main error type for hub operations.
#[derive(Debug, Error)]
pub enum Error {
    /// No live session is registered under the key
    #[error("Session not found: {0}")]
    SessionNotFound(SessionKey),

    /// Malformed request: missing stream accept header, bad body, unresolvable session
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Command rejected by the whitelist or the metacharacter check
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Delivery to a session timed out; the session has been torn down
    #[error("Slow consumer: session {0} did not drain its queue in time")]
    SlowConsumer(SessionKey),

    /// Session was cancelled before the event could be queued
    #[error("Session already closed")]
    SessionClosed,

    /// Two plugins registered under one name
    #[error("Duplicate plugin name: {0}")]
    DuplicatePlugin(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error with custom message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the error means the target session is gone for good.
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Error::SlowConsumer(_) | Error::SessionClosed)
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
