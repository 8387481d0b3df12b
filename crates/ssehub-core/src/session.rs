//! Session identity types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Resumption key of a session.
///
/// Either echoed by a reconnecting client or minted by [`KeyGenerator`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionKey(String);

impl SessionKey {
    /// Parse a client-supplied key.
    ///
    /// Returns `None` for values that are empty after trimming or that could
    /// not be written back into an SSE `id:` field.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.is_empty() || value.contains(['\n', '\r', '\0']) {
            return None;
        }
        Some(Self(value.to_string()))
    }

    /// Get the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Mints fresh random session keys.
///
/// Constructed once at startup and owned by the registry.
#[derive(Debug, Default)]
pub struct KeyGenerator;

impl KeyGenerator {
    /// Create a new generator.
    pub fn new() -> Self {
        Self
    }

    /// A random 128-bit key rendered as 32 lowercase hex digits.
    pub fn generate(&self) -> SessionKey {
        SessionKey(Uuid::new_v4().simple().to_string())
    }
}

/// Metadata about the client behind a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    /// Client IP address, as best resolved
    pub client_ip: String,
    /// `User-Agent` header value
    pub user_agent: String,
}

impl ClientInfo {
    /// Create client metadata.
    pub fn new(client_ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        Self {
            client_ip: client_ip.into(),
            user_agent: user_agent.into(),
        }
    }
}

/// Public view of a live session, as listed by `/stream/sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Session key
    pub id: SessionKey,
    /// Client IP address
    pub client_ip: String,
    /// Client user agent
    pub user_agent: String,
    /// When the stream was accepted
    pub connected_at: DateTime<Utc>,
}
