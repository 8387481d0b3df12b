//! Per-session plugin state.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use ssehub_core::Result;

use crate::session::Session;

/// A request routed to a plugin instance.
#[derive(Debug, Clone, PartialEq)]
pub enum PluginRequest {
    /// Request body as posted by the client
    Payload(Value),
    /// Stop whatever the instance is doing; a no-op when idle
    Cancel,
}

/// The state one plugin keeps for one session.
///
/// Created when the session opens and disposed, in reverse creation order,
/// when it closes. Instances that do background work start it on creation
/// and stop it in [`dispose`](PluginInstance::dispose).
#[async_trait]
pub trait PluginInstance: Send + Sync {
    /// Handle a request from the session's client.
    ///
    /// Returns [`BadRequest`](ssehub_core::Error::BadRequest) for a payload
    /// of the wrong shape. Everything the user should see travels as events
    /// on the session instead.
    async fn handle(&self, session: &Arc<Session>, request: PluginRequest) -> Result<()>;

    /// Release the instance's resources. Called once.
    fn dispose(&self);
}
