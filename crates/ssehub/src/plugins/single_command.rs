//! Runs one whitelisted program per request and streams its output.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{body::Bytes, http::StatusCode, routing::post, Router};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use ssehub_core::{CommandSettings, Error, PluginPayload, Result};
use ssehub_session::{PluginInstance, PluginRequest, Session, SessionRegistry};
use ssehub_terminal::{run_to_sink, CommandPolicy, ExecRequest, Executor, FrameSink};

use crate::error::ApiResult;
use crate::plugin::{decode_payload, dispatch, parse_body, Plugin, SessionSink};
use crate::state::{AppState, CurrentSession};

/// Plugin name.
pub const NAME: &str = "single_command";

/// Event name of command output.
pub const EVENT: &str = "command";

/// Prompt the client prints after each command.
pub fn command_prompt(host: &str) -> String {
    format!("\r\x1b[K\x1b[40m\x1b[32m {host} \x1b[30m\x1b[104m\x1b[30m root \x1b[40m\x1b[94m\x1b[0m ")
}

/// Runs whitelisted programs on request, one at a time per session.
pub struct SingleCommandPlugin {
    policy: CommandPolicy,
    prompt: String,
    executor: Arc<dyn Executor>,
}

impl std::fmt::Debug for SingleCommandPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingleCommandPlugin")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl SingleCommandPlugin {
    /// Create the plugin. `host` labels the prompt.
    pub fn new(settings: &CommandSettings, host: &str, executor: Arc<dyn Executor>) -> Self {
        Self {
            policy: CommandPolicy::new(settings.allowed_commands.clone()),
            prompt: command_prompt(host),
            executor,
        }
    }
}

#[async_trait]
impl Plugin for SingleCommandPlugin {
    fn name(&self) -> &'static str {
        NAME
    }

    fn routes(&self) -> Router<AppState> {
        Router::new()
            .route("/command", post(run_command))
            .route("/command/cancel", post(cancel_command))
    }

    fn instantiate(
        &self,
        registry: &Arc<SessionRegistry>,
        session: &Arc<Session>,
    ) -> Option<Arc<dyn PluginInstance>> {
        let (queue, inbox) = mpsc::channel(1);
        let cancel = session.cancellation().child_token();
        let sink = Arc::new(SessionSink::new(
            EVENT,
            Arc::clone(registry),
            Arc::clone(session),
        ));

        let worker = Worker {
            executor: Arc::clone(&self.executor),
            sink: Arc::clone(&sink),
            prompt: self.prompt.clone(),
            cancel: cancel.clone(),
        };
        tokio::spawn(worker.run(inbox));

        Some(Arc::new(CommandInstance {
            queue,
            policy: self.policy.clone(),
            prompt: self.prompt.clone(),
            sink,
            cancel,
        }))
    }
}

#[instrument(skip_all)]
async fn run_command(
    CurrentSession(session): CurrentSession,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let payload = parse_body(&body)?;
    dispatch(&session, NAME, PluginRequest::Payload(payload)).await?;
    Ok(StatusCode::OK)
}

#[instrument(skip_all)]
async fn cancel_command(CurrentSession(session): CurrentSession) -> ApiResult<StatusCode> {
    dispatch(&session, NAME, PluginRequest::Cancel).await?;
    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
struct CommandRequest {
    name: String,
    #[serde(default)]
    args: Vec<String>,
}

#[derive(Debug)]
enum CommandMessage {
    Run(ExecRequest),
    Cancel,
}

struct CommandInstance {
    queue: mpsc::Sender<CommandMessage>,
    policy: CommandPolicy,
    prompt: String,
    sink: Arc<SessionSink>,
    cancel: CancellationToken,
}

#[async_trait]
impl PluginInstance for CommandInstance {
    async fn handle(&self, session: &Arc<Session>, request: PluginRequest) -> Result<()> {
        let message = match request {
            PluginRequest::Payload(payload) => {
                let CommandRequest { name, args } = decode_payload(payload)?;
                if let Err(e) = self.policy.check(&name, &args) {
                    warn!("Rejected command for session {}: {}", session.key(), e);
                    let denial = format!("permission denied: {name}\r\n{}", self.prompt);
                    return self.sink.emit(PluginPayload::eof(denial)).await;
                }
                CommandMessage::Run(ExecRequest::new(name, args))
            }
            PluginRequest::Cancel => CommandMessage::Cancel,
        };

        self.queue
            .send(message)
            .await
            .map_err(|_| Error::SessionClosed)
    }

    fn dispose(&self) {
        self.cancel.cancel();
    }
}

/// Owns the session's current run. Only this task touches the cancel handle.
struct Worker {
    executor: Arc<dyn Executor>,
    sink: Arc<SessionSink>,
    prompt: String,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(self, mut inbox: mpsc::Receiver<CommandMessage>) {
        let mut sequence: u64 = 0;
        let mut current: Option<CancellationToken> = None;

        loop {
            let message = tokio::select! {
                _ = self.cancel.cancelled() => break,
                message = inbox.recv() => message,
            };
            let Some(message) = message else { break };

            if let Some(running) = current.take() {
                running.cancel();
            }

            match message {
                CommandMessage::Cancel => debug!("Command cancel requested"),
                CommandMessage::Run(request) => {
                    sequence += 1;
                    let scope = self.cancel.child_token();
                    current = Some(scope.clone());
                    tokio::spawn(execute(
                        Arc::clone(&self.executor),
                        Arc::clone(&self.sink),
                        self.prompt.clone(),
                        request,
                        scope,
                        sequence,
                    ));
                }
            }
        }

        if let Some(running) = current {
            running.cancel();
        }
    }
}

async fn execute(
    executor: Arc<dyn Executor>,
    sink: Arc<SessionSink>,
    prompt: String,
    request: ExecRequest,
    cancel: CancellationToken,
    id: u64,
) {
    let program = request.program.clone();

    if !executor.is_available(&program) {
        warn!("Command '{}' is not installed", program);
        let _ = sink
            .emit(PluginPayload::data(format!("command not found: {program}\r\n")).with_id(id))
            .await;
    } else {
        let code = run_to_sink(
            executor.as_ref(),
            request,
            None,
            cancel,
            sink.as_ref(),
            Some(id),
        )
        .await;
        info!("Command '{}' (#{}) exited with {}", program, id, code);
    }

    if let Err(e) = sink.emit(PluginPayload::eof(prompt).with_id(id)).await {
        debug!("Command #{} finished after its session closed: {}", id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use ssehub_core::{ClientInfo, Event, PayloadKind};
    use ssehub_terminal::testing::ScriptedExecutor;
    use std::time::Duration;

    struct Fixture {
        executor: Arc<ScriptedExecutor>,
        session: Arc<Session>,
        events: mpsc::Receiver<Event>,
        instance: Arc<dyn PluginInstance>,
        _registry: Arc<SessionRegistry>,
    }

    fn fixture(executor: ScriptedExecutor) -> Fixture {
        let executor = Arc::new(executor);
        let plugin = SingleCommandPlugin::new(
            &CommandSettings::default(),
            "helloworld",
            Arc::clone(&executor) as Arc<dyn Executor>,
        );
        let registry = Arc::new(SessionRegistry::new());
        let (session, events) = registry.open(None, ClientInfo::default());
        let instance = plugin.instantiate(&registry, &session).unwrap();
        Fixture {
            executor,
            session,
            events,
            instance,
            _registry: registry,
        }
    }

    async fn next_payload(events: &mut mpsc::Receiver<Event>) -> PluginPayload {
        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.event, EVENT);
        assert!(event.id.is_none());
        serde_json::from_str(&event.data).unwrap()
    }

    fn command(name: &str, args: &[&str]) -> PluginRequest {
        PluginRequest::Payload(json!({ "name": name, "args": args }))
    }

    #[tokio::test]
    async fn test_output_then_prompt_share_sequence_id() {
        let mut f = fixture(ScriptedExecutor::new().with_output("ping", &["PONG\n"], 0));

        f.instance
            .handle(&f.session, command("ping", &["-c", "1", "127.0.0.1"]))
            .await
            .unwrap();
        assert_eq!(next_payload(&mut f.events).await, PluginPayload::data("PONG\n").with_id(1));
        let done = next_payload(&mut f.events).await;
        assert_eq!(done.kind, PayloadKind::Eof);
        assert_eq!(done.id, Some(1));
        assert_eq!(done.data, command_prompt("helloworld"));

        f.instance
            .handle(&f.session, command("ping", &[]))
            .await
            .unwrap();
        assert_eq!(next_payload(&mut f.events).await.id, Some(2));

        let runs = f.executor.runs();
        assert_eq!(runs[0].args, vec!["-c", "1", "127.0.0.1"]);
    }

    #[tokio::test]
    async fn test_rejections_start_nothing() {
        let mut f = fixture(ScriptedExecutor::new().with_output("rm", &["gone"], 0));

        for (name, args) in [
            ("rm", vec!["-rf", "/"]),
            ("", vec![]),
            ("echo", vec!["hi", "|", "sh"]),
            ("echo", vec![">out"]),
        ] {
            f.instance.handle(&f.session, command(name, &args)).await.unwrap();
            let denial = next_payload(&mut f.events).await;
            assert_eq!(denial.kind, PayloadKind::Eof);
            assert!(denial.data.starts_with(&format!("permission denied: {name}\r\n")));
        }
        assert_eq!(f.executor.run_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_program_reports_in_band() {
        let mut f = fixture(ScriptedExecutor::new());

        f.instance.handle(&f.session, command("nslookup", &[])).await.unwrap();
        let missing = next_payload(&mut f.events).await;
        assert_eq!(missing.data, "command not found: nslookup\r\n");
        assert_eq!(missing.kind, PayloadKind::Data);
        assert_eq!(next_payload(&mut f.events).await.kind, PayloadKind::Eof);
        assert_eq!(f.executor.run_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_stops_running_command() {
        let mut f = fixture(ScriptedExecutor::new().with_blocking("traceroute"));

        f.instance
            .handle(&f.session, command("traceroute", &["example.com"]))
            .await
            .unwrap();
        f.instance
            .handle(&f.session, PluginRequest::Cancel)
            .await
            .unwrap();

        let done = next_payload(&mut f.events).await;
        assert_eq!(done.kind, PayloadKind::Eof);
        assert_eq!(done.id, Some(1));
    }

    #[tokio::test]
    async fn test_new_command_cancels_previous() {
        let mut f = fixture(
            ScriptedExecutor::new()
                .with_blocking("traceroute")
                .with_output("ping", &["PONG\n"], 0),
        );

        f.instance
            .handle(&f.session, command("traceroute", &[]))
            .await
            .unwrap();
        f.instance.handle(&f.session, command("ping", &[])).await.unwrap();

        let mut ids = Vec::new();
        for _ in 0..3 {
            ids.push(next_payload(&mut f.events).await);
        }
        assert!(ids
            .iter()
            .any(|p| p.kind == PayloadKind::Eof && p.id == Some(1)));
        assert!(ids.iter().any(|p| p.data == "PONG\n" && p.id == Some(2)));
    }

    #[tokio::test]
    async fn test_cancel_when_idle_is_silent() {
        let mut f = fixture(ScriptedExecutor::new());

        f.instance.handle(&f.session, PluginRequest::Cancel).await.unwrap();
        f.instance.handle(&f.session, PluginRequest::Cancel).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(f.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_malformed_payload() {
        let f = fixture(ScriptedExecutor::new());
        let err = f
            .instance
            .handle(&f.session, PluginRequest::Payload(json!({ "args": [] })))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_dispose_kills_running_command() {
        let mut f = fixture(ScriptedExecutor::new().with_blocking("ping"));

        f.instance.handle(&f.session, command("ping", &[])).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        f.instance.dispose();

        // The eof is still queued since the session itself is open.
        let done = next_payload(&mut f.events).await;
        assert_eq!(done.kind, PayloadKind::Eof);
    }
}
