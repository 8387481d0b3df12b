//! # ssehub-terminal
//!
//! Terminal state machine for the SSE hub.
//!
//! This crate provides:
//! - Keystroke decoding (control bytes and ANSI arrow/delete escapes)
//! - Line editing with cursor tracking and a bounded history ring
//! - Command policy: shell-style tokenizing, metacharacter and whitelist checks
//! - Cancellable process execution with streamed stdout/stderr
//! - The single-owner terminal loop tying it all together
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on ssehub-core only and
//! knows nothing about HTTP or sessions. Output leaves through a [`FrameSink`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod editor;
pub mod exec;
pub mod history;
pub mod key;
pub mod machine;
pub mod policy;
pub mod sink;
pub mod testing;

// Re-export commonly used types
pub use editor::{Edit, LineEditor};
pub use exec::{run_to_sink, ExecIo, ExecRequest, Executor, ProcessExecutor};
pub use history::History;
pub use key::{Key, KeyDecoder};
pub use machine::{render_prompt, TerminalInput, TerminalMachine};
pub use policy::{CommandLine, CommandPolicy, ParsedLine};
pub use sink::FrameSink;
