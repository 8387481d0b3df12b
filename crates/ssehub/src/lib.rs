//! # ssehub
//!
//! Server-Sent Events push hub.
//!
//! ## Overview
//!
//! Clients open one long-lived event stream and receive everything the hub
//! pushes to them on it. Features are plugins that provide:
//! - HTTP routes the client calls to drive them
//! - Per-session state, created and disposed with the stream
//! - Optional background work shared by every session
//!
//! The hub ships with three plugins: a ticking counter, a single command
//! runner and an interactive terminal.
//!
//! ## Architecture
//!
//! This is Layer 2 - the HTTP server binary that ties together:
//! - ssehub-core: Core types
//! - ssehub-session: Session lifecycle
//! - ssehub-terminal: Terminal emulation and process execution

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod plugin;
pub mod plugins;
pub mod routes;
pub mod state;

// Re-export commonly used types
pub use error::{ApiError, ApiResult};
pub use plugin::{Plugin, PluginRuntime, SessionSink};
pub use plugins::default_plugins;
pub use routes::build_app;
pub use state::{AppState, CurrentSession};
