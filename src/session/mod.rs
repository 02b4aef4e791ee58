//! Voice session management
//!
//! This module provides the `SessionController` abstraction that manages:
//! - Lifecycle of the logical live session (epoch-tagged connect/disconnect)
//! - Fan-out of inbound messages to playback scheduling and tool mediation
//! - Fan-in of captured audio chunks to the transport send queue
//! - Strength extraction via tool calls and the volume envelope tap

mod config;
mod controller;
mod tools;

pub use config::SessionConfig;
pub use controller::{
    CaptureFactory, SessionController, SessionSnapshot, SessionState,
};
pub use tools::{
    SaveStrengthHandler, StrengthRecord, ToolCallError, ToolHandler, ToolMediator,
};
