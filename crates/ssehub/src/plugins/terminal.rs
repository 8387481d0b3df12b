//! An interactive line-editing terminal per session.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Bytes, http::StatusCode, routing::post, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use ssehub_core::{Error, Result, TerminalSettings};
use ssehub_session::{PluginInstance, PluginRequest, Session, SessionRegistry};
use ssehub_terminal::{Executor, TerminalInput, TerminalMachine};

use crate::error::ApiResult;
use crate::plugin::{decode_payload, dispatch, parse_body, Plugin, SessionSink};
use crate::state::{AppState, CurrentSession};

/// Plugin name.
pub const NAME: &str = "terminal";

/// Event name of terminal frames.
pub const EVENT: &str = "terminal";

/// Gives each session its own terminal.
pub struct TerminalPlugin {
    settings: TerminalSettings,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for TerminalPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalPlugin")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl TerminalPlugin {
    /// Create the plugin.
    pub fn new(settings: TerminalSettings, executor: Arc<dyn Executor>) -> Self {
        Self { settings, executor }
    }
}

#[async_trait]
impl Plugin for TerminalPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route("/terminal", post(send_input))
            .route("/terminal/cancel", post(cancel_program))
    }

    fn instantiate(
        &self,
        registry: &Arc<SessionRegistry>,
        session: &Arc<Session>,
    ) -> Option<Arc<dyn PluginInstance>> {
        let (inbox, keys) = mpsc::channel(1);
        let cancel = session.cancellation().child_token();
        let sink = SessionSink::new(EVENT, Arc::clone(registry), Arc::clone(session));
        let machine = TerminalMachine::new(
            &self.settings,
            Arc::clone(&self.executor),
            Arc::new(sink),
        );
        tokio::spawn(machine.run(keys, cancel.clone()));

        Some(Arc::new(TerminalInstance { inbox, cancel }))
    }
}

#[instrument(skip_all)]
async fn send_input(CurrentSession(session): CurrentSession, body: Bytes) -> ApiResult<StatusCode> {
    let payload = parse_body(&body)?;
    dispatch(&session, NAME, PluginRequest::Payload(payload)).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
async fn cancel_program(CurrentSession(session): CurrentSession) -> ApiResult<StatusCode> {
    dispatch(&session, NAME, PluginRequest::Cancel).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct TerminalRequest {
    input: String,
}

struct TerminalInstance {
    inbox: mpsc::Sender<TerminalInput>,
    cancel: CancellationToken,
}

#[async_trait]
impl PluginInstance for TerminalInstance {
    async fn handle(&self, _session: &Arc<Session>, request: PluginRequest) -> Result<()> {
        let input = match request {
            PluginRequest::Payload(payload) => {
                TerminalInput::Keys(decode_payload::<TerminalRequest>(payload)?.input)
            }
            PluginRequest::Cancel => TerminalInput::Cancel,
        };
        self.inbox.send(input).await.map_err(|_| Error::SessionClosed)
    }

    fn dispose(&self) {
        self.cancel.cancel();
    }
}
