//! # ssehub-core
//!
//! Core types for the SSE push hub.
//!
//! This crate contains all fundamental types with **no internal dependencies**
//! on other ssehub crates. It provides:
//!
//! - Events and the JSON payload plugins put inside them
//! - Session keys, the key generator and client metadata
//! - Error types
//! - Server configuration
//!
//! ## Architecture
//!
//! This is Layer 0 in the architecture - all other crates depend on this one,
//! but this crate has no dependencies on other ssehub crates.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod session;

// Re-export commonly used types
pub use config::{
    CommandSettings, ServerConfig, ServerSettings, StreamSettings, TerminalSettings,
    TimeCountSettings,
};
pub use error::{Error, Result};
pub use event::{Event, PayloadKind, PluginPayload};
pub use session::{ClientInfo, KeyGenerator, SessionInfo, SessionKey};
