//! Events pushed to a session and the JSON payload plugins carry in them.

use serde::{Deserialize, Serialize};

use crate::{Result, SessionKey};

/// Name of the first event on every stream.
pub const ESTABLISH_EVENT: &str = "establish";

/// One server-sent event.
///
/// Immutable once built. `event` and `id` never contain line breaks, so the
/// event always renders as a single well-formed frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event type (`event:` field)
    pub event: String,
    /// Optional event id (`id:` field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Optional reconnection delay in milliseconds (`retry:` field)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_ms: Option<u64>,
    /// Event body (`data:` field, may span lines)
    pub data: String,
}

impl Event {
    /// Create an event with a type and body.
    pub fn new(event: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event: single_line(event.into()),
            id: None,
            retry_ms: None,
            data: data.into(),
        }
    }

    /// Attach an event id.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(single_line(id.into()));
        self
    }

    /// Attach a reconnection delay.
    pub fn with_retry(mut self, retry_ms: u64) -> Self {
        self.retry_ms = Some(retry_ms);
        self
    }

    /// The synthetic first event of a stream.
    ///
    /// Carries the session key as both id and body so the browser echoes it
    /// back as `Last-Event-ID` when it reconnects.
    pub fn establish(key: &SessionKey, retry_ms: u64) -> Self {
        Self::new(ESTABLISH_EVENT, key.as_str())
            .with_id(key.as_str())
            .with_retry(retry_ms)
    }

    /// Build an event whose body is a JSON-encoded plugin payload.
    pub fn from_payload(event: impl Into<String>, payload: &PluginPayload) -> Result<Self> {
        Ok(Self::new(event, serde_json::to_string(payload)?))
    }
}

fn single_line(mut value: String) -> String {
    value.retain(|c| c != '\n' && c != '\r');
    value
}

/// Kind of a plugin payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadKind {
    /// Output to append to the client terminal
    Data,
    /// End of a run; `data` holds the text that finishes it (usually a prompt)
    Eof,
    /// Clear the client terminal
    Clear,
}

/// JSON body of plugin events: `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginPayload {
    /// Payload kind
    #[serde(rename = "type")]
    pub kind: PayloadKind,
    /// Payload text
    pub data: String,
    /// Run sequence number, for plugins that number their runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl PluginPayload {
    /// Output text.
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Data,
            data: data.into(),
            id: None,
        }
    }

    /// End-of-run marker carrying closing text.
    pub fn eof(data: impl Into<String>) -> Self {
        Self {
            kind: PayloadKind::Eof,
            data: data.into(),
            id: None,
        }
    }

    /// Clear-screen marker.
    pub fn clear() -> Self {
        Self {
            kind: PayloadKind::Clear,
            data: String::new(),
            id: None,
        }
    }

    /// Tag the payload with a run sequence number.
    pub fn with_id(mut self, id: u64) -> Self {
        self.id = Some(id);
        self
    }
}
