//! Testing utilities: a scripted executor and an in-memory sink.
//!
//! Used by this crate's tests and by the server's integration tests to drive
//! the terminal and command plugins without spawning real processes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use ssehub_core::{Error, PluginPayload, Result};

use crate::exec::{ExecIo, ExecRequest, Executor};
use crate::sink::FrameSink;

/// Behaviour of a scripted program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    /// Print the chunks, then exit
    Output {
        /// Output chunks, in order
        chunks: Vec<String>,
        /// Exit code
        exit_code: i32,
    },
    /// Copy stdin to output until stdin closes (exit 0) or the run is cancelled (exit -1)
    Echo,
    /// Print nothing until cancelled, then exit -1
    UntilCancelled,
}

/// [`Executor`] that plays scripts instead of spawning processes.
///
/// Programs without a script are unavailable. Every run is recorded.
#[derive(Debug, Default)]
pub struct ScriptedExecutor {
    scripts: HashMap<String, Script>,
    runs: Mutex<Vec<ExecRequest>>,
}

impl ScriptedExecutor {
    /// An executor that knows no programs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script `program` to print `chunks` and exit with `exit_code`.
    pub fn with_output(mut self, program: &str, chunks: &[&str], exit_code: i32) -> Self {
        let chunks = chunks.iter().map(|chunk| chunk.to_string()).collect();
        self.scripts
            .insert(program.to_string(), Script::Output { chunks, exit_code });
        self
    }

    /// Script `program` to echo its stdin.
    pub fn with_echo(mut self, program: &str) -> Self {
        self.scripts.insert(program.to_string(), Script::Echo);
        self
    }

    /// Script `program` to block until cancelled.
    pub fn with_blocking(mut self, program: &str) -> Self {
        self.scripts
            .insert(program.to_string(), Script::UntilCancelled);
        self
    }

    /// Requests run so far.
    pub fn runs(&self) -> Vec<ExecRequest> {
        self.runs.lock().clone()
    }

    /// Number of runs so far.
    pub fn run_count(&self) -> usize {
        self.runs.lock().len()
    }
}

#[async_trait]
impl Executor for ScriptedExecutor {
    fn is_available(&self, program: &str) -> bool {
        self.scripts.contains_key(program)
    }

    async fn run(&self, request: ExecRequest, io: ExecIo) -> i32 {
        let script = self.scripts.get(&request.program).cloned();
        let program = request.program.clone();
        self.runs.lock().push(request);

        let ExecIo {
            stdin,
            output,
            cancel,
        } = io;

        match script {
            None => {
                let _ = output.send(format!("command not found: {program}\r\n")).await;
                1
            }
            Some(Script::Output { chunks, exit_code }) => {
                for chunk in chunks {
                    if cancel.is_cancelled() {
                        return -1;
                    }
                    let _ = output.send(chunk).await;
                }
                exit_code
            }
            Some(Script::Echo) => {
                let Some(mut stdin) = stdin else {
                    return 0;
                };
                loop {
                    let received = tokio::select! {
                        _ = cancel.cancelled() => return -1,
                        received = stdin.recv() => received,
                    };
                    match received {
                        Some(bytes) => {
                            let _ = output
                                .send(String::from_utf8_lossy(&bytes).into_owned())
                                .await;
                        }
                        None => return 0,
                    }
                }
            }
            Some(Script::UntilCancelled) => {
                cancel.cancelled().await;
                -1
            }
        }
    }
}

/// [`FrameSink`] that keeps every frame in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    frames: Mutex<Vec<PluginPayload>>,
    closed: AtomicBool,
}

impl CollectingSink {
    /// An empty, open sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far.
    pub fn frames(&self) -> Vec<PluginPayload> {
        self.frames.lock().clone()
    }

    /// Make further emits fail as if the listener had left.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl FrameSink for CollectingSink {
    async fn emit(&self, payload: PluginPayload) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::SessionClosed);
        }
        self.frames.lock().push(payload);
        Ok(())
    }
}
