//! Process execution.
//!
//! Programs run directly (no shell) with piped stdio. Output from stdout and
//! stderr is interleaved into one stream of text chunks. A run ends when the
//! program exits or its cancellation token fires; either way the output pipes
//! are drained before the exit code is returned. Pipes still held open by a
//! leftover grandchild are abandoned after a short grace period.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use ssehub_core::PluginPayload;

use crate::sink::FrameSink;

/// Read buffer size for output pipes.
const READ_CHUNK: usize = 4096;
/// Output chunks buffered between the pipes and the sink.
const OUTPUT_QUEUE: usize = 64;
/// How long the output pipes may stay open once the program is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// What to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program name, resolved on `PATH`
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Working directory, inherited when `None`
    pub working_dir: Option<PathBuf>,
}

impl ExecRequest {
    /// Create a request.
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            working_dir: None,
        }
    }

    /// Set the working directory.
    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

/// Channels a run is wired to.
#[derive(Debug)]
pub struct ExecIo {
    /// Bytes for the program's stdin. `None` gives the program a null stdin.
    pub stdin: Option<mpsc::Receiver<Vec<u8>>>,
    /// Combined stdout and stderr text
    pub output: mpsc::Sender<String>,
    /// Fires to kill the program
    pub cancel: CancellationToken,
}

/// Runs external programs.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Whether `program` resolves to an executable.
    fn is_available(&self, program: &str) -> bool;

    /// Run to completion or cancellation and return the exit code.
    ///
    /// Failures are reported as text on `io.output`, never as an error: a
    /// program that cannot be started yields `1`, one killed by a signal
    /// yields `-1`.
    async fn run(&self, request: ExecRequest, io: ExecIo) -> i32;
}

/// [`Executor`] backed by real OS processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    /// Create an executor.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn is_available(&self, program: &str) -> bool {
        which::which(program).is_ok()
    }

    async fn run(&self, request: ExecRequest, io: ExecIo) -> i32 {
        let ExecIo {
            stdin,
            output,
            cancel,
        } = io;

        info!(
            "Spawning process: command='{}' args={:?}, cwd={:?}",
            request.program, request.args, request.working_dir
        );

        let mut command = Command::new(&request.program);
        command
            .args(&request.args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &request.working_dir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                error!("Failed to spawn '{}': {}", request.program, e);
                let text = if e.kind() == std::io::ErrorKind::NotFound {
                    format!("command not found: {}\r\n", request.program)
                } else {
                    format!("{}: {e}\r\n", request.program)
                };
                let _ = output.send(text).await;
                return 1;
            }
        };

        let pid = child.id();
        debug!("Process '{}' started with pid {:?}", request.program, pid);

        let mut drains: Vec<_> = [
            child
                .stdout
                .take()
                .map(|pipe| tokio::spawn(drain(pipe, output.clone()))),
            child
                .stderr
                .take()
                .map(|pipe| tokio::spawn(drain(pipe, output.clone()))),
        ]
        .into_iter()
        .flatten()
        .collect();

        let pump = match (child.stdin.take(), stdin) {
            (Some(pipe), Some(input)) => Some(tokio::spawn(pump(pipe, input))),
            _ => None,
        };

        let waited = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let status = match waited {
            Some(status) => status,
            None => {
                debug!("Cancelling process '{}' (pid {:?})", request.program, pid);
                if let Err(e) = child.start_kill() {
                    warn!("Failed to kill pid {:?}: {}", pid, e);
                }
                child.wait().await
            }
        };

        let deadline = Instant::now() + DRAIN_GRACE;
        for task in &mut drains {
            if timeout_at(deadline, &mut *task).await.is_err() {
                warn!(
                    "Output of '{}' still open after exit, abandoning it",
                    request.program
                );
                break;
            }
        }
        for task in &drains {
            task.abort();
        }
        if let Some(pump) = pump {
            pump.abort();
        }

        match status {
            Ok(status) => {
                let code = exit_code(&status);
                if let Some(signal) = termination_signal(&status) {
                    let _ = output
                        .send(format!("process terminated by signal {signal}\r\n"))
                        .await;
                }
                info!("Process '{}' exited with code {}", request.program, code);
                code
            }
            Err(e) => {
                error!("Failed to wait for '{}': {}", request.program, e);
                let _ = output.send(format!("{}: {e}\r\n", request.program)).await;
                -1
            }
        }
    }
}

fn exit_code(status: &ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

#[cfg(unix)]
fn termination_signal(status: &ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn termination_signal(_status: &ExitStatus) -> Option<i32> {
    None
}

/// Forward a pipe to the output channel until EOF.
async fn drain<R>(mut reader: R, output: mpsc::Sender<String>)
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; READ_CHUNK];
    let mut pending = Vec::new();
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                pending.extend_from_slice(&buf[..n]);
                let text = take_utf8(&mut pending);
                if !text.is_empty() && output.send(text).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!("Output pipe read failed: {}", e);
                break;
            }
        }
    }
    if !pending.is_empty() {
        let _ = output
            .send(String::from_utf8_lossy(&pending).into_owned())
            .await;
    }
}

/// Decode the longest decodable prefix of `pending`, keeping a trailing
/// incomplete UTF-8 sequence for the next read.
fn take_utf8(pending: &mut Vec<u8>) -> String {
    let keep = match std::str::from_utf8(pending) {
        Ok(_) => 0,
        Err(e) if e.error_len().is_none() => pending.len() - e.valid_up_to(),
        Err(_) => 0,
    };
    let rest = pending.split_off(pending.len() - keep);
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = rest;
    text
}

/// Copy typed input into the program's stdin until either side closes.
async fn pump(mut stdin: ChildStdin, mut input: mpsc::Receiver<Vec<u8>>) {
    while let Some(bytes) = input.recv().await {
        if stdin.write_all(&bytes).await.is_err() || stdin.flush().await.is_err() {
            break;
        }
    }
}

/// Run a request and stream its output to a sink as `data` payloads.
///
/// Payloads are tagged with `id` when given. Sink errors do not stop the
/// run; a departed listener is handled by cancelling `cancel`.
pub async fn run_to_sink(
    executor: &dyn Executor,
    request: ExecRequest,
    stdin: Option<mpsc::Receiver<Vec<u8>>>,
    cancel: CancellationToken,
    sink: &dyn FrameSink,
    id: Option<u64>,
) -> i32 {
    let (output, mut chunks) = mpsc::channel(OUTPUT_QUEUE);
    let io = ExecIo {
        stdin,
        output,
        cancel,
    };

    let forward = async {
        while let Some(chunk) = chunks.recv().await {
            let mut payload = PluginPayload::data(chunk);
            if let Some(id) = id {
                payload = payload.with_id(id);
            }
            if let Err(e) = sink.emit(payload).await {
                debug!("Dropping process output: {}", e);
            }
        }
    };

    let (code, ()) = tokio::join!(executor.run(request, io), forward);
    code
}
