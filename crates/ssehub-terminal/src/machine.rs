//! The terminal owner loop.
//!
//! One task owns a [`TerminalMachine`] and everything in it: the line being
//! edited, the history, the last exit code and the handle of the running
//! program. HTTP handlers only push [`TerminalInput`] into its inbox, so none
//! of that state is ever shared.
//!
//! The machine alternates between two modes:
//!
//! - **Reading a line**: keys are decoded and applied to the editor, echoes
//!   go out as `data` frames, and Enter dispatches the line.
//! - **Running**: typed bytes go to the program's stdin (Ctrl-C cancels the
//!   program instead), output is streamed as `data` frames, and the exit is
//!   answered with an `eof` frame carrying a fresh prompt.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use ssehub_core::{PluginPayload, Result, TerminalSettings};

use crate::editor::{Edit, LineEditor};
use crate::exec::{run_to_sink, ExecRequest, Executor};
use crate::key::KeyDecoder;
use crate::policy::{CommandPolicy, ParsedLine};
use crate::sink::FrameSink;

/// Typed bytes buffered for a running program's stdin.
const STDIN_QUEUE: usize = 64;

/// Message to the terminal owner task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TerminalInput {
    /// Raw keystrokes as posted by the client
    Keys(String),
    /// Stop the running program, if any
    Cancel,
}

/// Render the prompt for the given host and last exit code.
///
/// Starts by returning to column 0 and erasing the line. A red cross marks a
/// non-zero exit code.
pub fn render_prompt(host: &str, last_exit: i32) -> String {
    let marker = if last_exit != 0 {
        "\x1b[40m\x1b[0;31m✘ "
    } else {
        ""
    };
    format!("\r\x1b[K\x1b[40m\x1b[1;32m{marker}\x1b[40m\x1b[1;32m{host}\x1b[0m ~ $\x1b[0m ")
}

/// A program started from the terminal.
struct Running {
    stdin: mpsc::Sender<Vec<u8>>,
    cancel: CancellationToken,
    done: oneshot::Receiver<i32>,
}

enum Step {
    Input(TerminalInput),
    Exited(i32),
    Stop,
}

/// State of one interactive terminal.
pub struct TerminalMachine {
    host: String,
    policy: CommandPolicy,
    working_dir: Option<PathBuf>,
    editor: LineEditor,
    decoder: KeyDecoder,
    last_exit: i32,
    executor: Arc<dyn Executor>,
    sink: Arc<dyn FrameSink>,
}

impl std::fmt::Debug for TerminalMachine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminalMachine")
            .field("host", &self.host)
            .field("line", &self.editor.line())
            .field("last_exit", &self.last_exit)
            .finish_non_exhaustive()
    }
}

impl TerminalMachine {
    /// Create a terminal writing its frames to `sink`.
    pub fn new(
        settings: &TerminalSettings,
        executor: Arc<dyn Executor>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let working_dir = settings
            .working_directory
            .clone()
            .or_else(dirs::home_dir);

        Self {
            host: settings.host.clone(),
            policy: CommandPolicy::new(settings.allowed_commands.clone()),
            working_dir,
            editor: LineEditor::new(settings.history_capacity),
            decoder: KeyDecoder::new(),
            last_exit: 0,
            executor,
            sink,
        }
    }

    /// Current prompt.
    pub fn prompt(&self) -> String {
        render_prompt(&self.host, self.last_exit)
    }

    /// Process input until the inbox closes, `cancel` fires or the sink goes
    /// away. A program still running at that point is killed and reaped.
    pub async fn run(mut self, mut inbox: mpsc::Receiver<TerminalInput>, cancel: CancellationToken) {
        let mut running: Option<Running> = None;

        loop {
            let step = tokio::select! {
                _ = cancel.cancelled() => Step::Stop,
                input = inbox.recv() => input.map_or(Step::Stop, Step::Input),
                code = wait_exit(&mut running) => Step::Exited(code),
            };

            let result = match step {
                Step::Stop => break,
                Step::Exited(code) => {
                    running = None;
                    self.last_exit = code;
                    self.emit(PluginPayload::eof(self.prompt())).await
                }
                Step::Input(TerminalInput::Cancel) => {
                    if let Some(run) = &running {
                        debug!("Terminal cancel requested");
                        run.cancel.cancel();
                    }
                    Ok(())
                }
                Step::Input(TerminalInput::Keys(keys)) => {
                    self.handle_keys(&keys, &mut running, &cancel).await
                }
            };

            if let Err(e) = result {
                if e.is_disconnect() {
                    debug!("Terminal output closed: {}", e);
                    break;
                }
                warn!("Terminal frame dropped: {}", e);
            }
        }

        if let Some(run) = running.take() {
            run.cancel.cancel();
            let _ = run.done.await;
        }
        debug!("Terminal loop finished");
    }

    async fn handle_keys(
        &mut self,
        keys: &str,
        running: &mut Option<Running>,
        session: &CancellationToken,
    ) -> Result<()> {
        if keys.is_empty() && running.is_none() {
            // Initial prompt request
            self.last_exit = 0;
            self.editor.move_to_end();
            let frame = format!("{}{}", self.prompt(), self.editor.line());
            return self.emit(PluginPayload::eof(frame)).await;
        }

        let mut echo = String::new();
        let mut typed = Vec::new();
        let mut interrupted = false;

        for ch in keys.chars() {
            if running.is_some() {
                // Whatever follows an interrupt is dropped.
                if ch == '\x03' {
                    interrupted = true;
                    break;
                }
                let ch = if ch == '\r' { '\n' } else { ch };
                let mut buf = [0u8; 4];
                typed.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                continue;
            }

            let Some(key) = self.decoder.feed(ch) else {
                continue;
            };

            match self.editor.apply(key) {
                Edit::Echo(text) => echo.push_str(&text),
                Edit::None => {}
                Edit::Submit(line) => {
                    self.flush_echo(&mut echo).await?;
                    self.emit(PluginPayload::data("\r\n")).await?;
                    self.dispatch(&line, running, session).await?;
                }
                Edit::Interrupt => {
                    self.flush_echo(&mut echo).await?;
                    self.last_exit = 1;
                    self.emit(PluginPayload::data("\r\n")).await?;
                    self.emit(PluginPayload::eof(self.prompt())).await?;
                }
                Edit::Clear => {
                    self.flush_echo(&mut echo).await?;
                    self.emit(PluginPayload::clear()).await?;
                    self.editor.move_to_end();
                    let frame = format!("{}{}", self.prompt(), self.editor.line());
                    self.emit(PluginPayload::eof(frame)).await?;
                }
            }
        }

        self.flush_echo(&mut echo).await?;

        if let Some(run) = running.as_ref() {
            if !typed.is_empty() {
                if let Err(e) = run.stdin.try_send(typed) {
                    debug!("Dropping typed input: {}", e);
                }
            }
            if interrupted {
                debug!("Terminal interrupt typed");
                run.cancel.cancel();
            }
        }

        Ok(())
    }

    async fn dispatch(
        &mut self,
        line: &str,
        running: &mut Option<Running>,
        session: &CancellationToken,
    ) -> Result<()> {
        let command = match self.policy.parse_line(line) {
            ParsedLine::Empty => return self.emit(PluginPayload::eof(self.prompt())).await,
            ParsedLine::Rejected { program } => return self.deny(&program).await,
            ParsedLine::Command(command) => command,
        };

        if !self.executor.is_available(&command.program) {
            return self.deny(&command.program).await;
        }

        // Keys are not decoded while the program runs.
        self.decoder = KeyDecoder::new();

        info!("Terminal running: {} {:?}", command.program, command.args);

        let request = ExecRequest::new(command.program, command.args)
            .with_working_dir(self.working_dir.clone());
        let (stdin, stdin_rx) = mpsc::channel(STDIN_QUEUE);
        let (done_tx, done) = oneshot::channel();
        let run_cancel = session.child_token();

        let executor = Arc::clone(&self.executor);
        let sink = Arc::clone(&self.sink);
        let token = run_cancel.clone();
        tokio::spawn(async move {
            let code = run_to_sink(
                executor.as_ref(),
                request,
                Some(stdin_rx),
                token,
                sink.as_ref(),
                None,
            )
            .await;
            let _ = done_tx.send(code);
        });

        *running = Some(Running {
            stdin,
            cancel: run_cancel,
            done,
        });
        Ok(())
    }

    async fn deny(&mut self, program: &str) -> Result<()> {
        warn!("Terminal rejected command: {:?}", program);
        self.last_exit = 1;
        let frame = format!("command not found: {program}\r\n{}", self.prompt());
        self.emit(PluginPayload::eof(frame)).await
    }

    async fn flush_echo(&self, echo: &mut String) -> Result<()> {
        if echo.is_empty() {
            return Ok(());
        }
        self.emit(PluginPayload::data(std::mem::take(echo))).await
    }

    async fn emit(&self, payload: PluginPayload) -> Result<()> {
        self.sink.emit(payload).await
    }
}

/// Resolve when the running program exits; pending forever while idle.
async fn wait_exit(running: &mut Option<Running>) -> i32 {
    match running {
        Some(run) => (&mut run.done).await.unwrap_or(-1),
        None => std::future::pending().await,
    }
}
