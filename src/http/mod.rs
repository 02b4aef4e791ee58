//! HTTP API server for the presentation layer
//!
//! This module provides a REST API for driving the voice session:
//! - POST /session/connect - Open the live session and start capture
//! - POST /session/disconnect - Tear the session down
//! - POST /session/language - Switch conversation language
//! - GET /session - State, volume envelope, strengths, last error
//! - GET /session/strengths - Recorded strengths only
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
