//! Live-session wire protocol and transport.
//!
//! The remote conversational agent is an external collaborator; this module
//! pins down its interface boundary: the message shapes exchanged with it
//! and the transport seam the session controller opens connections through.

pub mod messages;
pub mod transport;

pub use messages::{
    AudioPayload, ClientMessage, ServerMessage, SessionSetup, ToolCallMessage, ToolDeclaration,
    ToolResponseMessage,
};
pub use transport::{ConnectionError, LiveConnection, LiveTransport, WsLiveTransport};
