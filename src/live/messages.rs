use serde::{Deserialize, Serialize};

/// Base64 PCM16 audio fragment, tagged with the rate it was produced at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioPayload {
    /// Base64-encoded little-endian PCM16 bytes
    pub data: String,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Function-call request emitted by the remote agent mid-conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallMessage {
    /// Correlation id echoed back in the response
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: serde_json::Value,
}

/// Answer to one tool call; must carry the triggering correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResponseMessage {
    pub id: String,
    pub name: String,
    pub result: serde_json::Value,
}

/// Message sent to the live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One captured audio chunk, wire-encoded
    Audio { media: AudioPayload },
    /// Batched answers to tool calls, in the order they arrived
    ToolResponse { responses: Vec<ToolResponseMessage> },
}

/// Message received from the live session.
///
/// Any subset of the fields may be present in one message; absent fields
/// deserialize to their defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerMessage {
    #[serde(default)]
    pub tool_calls: Vec<ToolCallMessage>,
    /// Fragment of synthesized audio addressed to the current turn
    #[serde(default)]
    pub audio: Option<AudioPayload>,
    /// Barge-in: the user started speaking, stop playback now
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub turn_complete: bool,
    /// Terminal transport-level failure
    #[serde(default)]
    pub error: Option<String>,
}

/// Declaration of a callable tool, advertised at session open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    /// JSON schema of the expected arguments
    pub parameters: serde_json::Value,
}

/// Configuration bundle sent when opening a live session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSetup {
    pub model: String,
    pub response_modalities: Vec<String>,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub voice: String,
}
