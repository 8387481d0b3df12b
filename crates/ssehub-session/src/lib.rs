//! # ssehub-session
//!
//! Session lifecycle management for the SSE hub.
//!
//! This crate provides:
//! - Sessions: one per open event stream, with a bounded outbound queue
//! - The session registry: keyed lookup, broadcast and shutdown
//! - The event stream that writes a session's queue to the wire
//! - The capability trait plugins implement per session
//!
//! ## Architecture
//!
//! This is Layer 1 in the architecture - it depends on ssehub-core only.
//! Plugins live above it and reach sessions through [`SessionRegistry`].

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod instance;
pub mod registry;
pub mod session;
pub mod stream;

// Re-export commonly used types
pub use instance::{PluginInstance, PluginRequest};
pub use registry::SessionRegistry;
pub use session::Session;
pub use stream::{accepts_event_stream, EventStream};
