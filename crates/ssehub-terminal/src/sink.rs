//! Outbound side of the terminal.

use async_trait::async_trait;
use ssehub_core::{PluginPayload, Result};

/// Destination of terminal output frames.
///
/// The server implements this on top of a session; tests collect frames in
/// memory. An error whose [`is_disconnect`](ssehub_core::Error::is_disconnect)
/// is true means nobody is listening any more.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Deliver one frame, in order.
    async fn emit(&self, payload: PluginPayload) -> Result<()>;
}
