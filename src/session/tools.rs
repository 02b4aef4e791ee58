//! Tool-call mediation.
//!
//! Decodes function-call requests arriving from the live session, invokes
//! the registered handler, and produces correlated responses. Every request
//! gets exactly one answer — including unknown names and bad arguments —
//! because the remote conversation stalls until a response arrives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::live::messages::{ToolCallMessage, ToolDeclaration, ToolResponseMessage};
use crate::locale::{self, Language};

/// A strength extracted from the conversation, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthRecord {
    /// Opaque unique id
    pub id: String,
    /// Short label, e.g. "Strategic Vision"
    pub title: String,
    /// One-sentence explanation
    pub description: String,
    /// When the strength was recorded
    pub recorded_at: DateTime<Utc>,
}

/// Tool invocation failed in a way that is answered, never propagated.
#[derive(Debug, Error)]
pub enum ToolCallError {
    #[error("unknown tool: {0}")]
    Unknown(String),

    #[error("invalid arguments for {0}: {1}")]
    InvalidArgs(String, String),
}

/// A locally registered tool the remote agent may call.
pub trait ToolHandler: Send + Sync {
    fn name(&self) -> &str;

    fn call(
        &self,
        args: &serde_json::Value,
        language: Language,
    ) -> Result<serde_json::Value, ToolCallError>;
}

/// Routes tool-call requests to registered handlers.
pub struct ToolMediator {
    handlers: HashMap<String, Box<dyn ToolHandler>>,
}

impl ToolMediator {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Box<dyn ToolHandler>) {
        self.handlers.insert(handler.name().to_string(), handler);
    }

    /// Answer one request. Unknown names and handler failures become
    /// error-result payloads carrying the original correlation id.
    pub fn handle(&self, request: &ToolCallMessage, language: Language) -> ToolResponseMessage {
        let result = match self.handlers.get(&request.name) {
            Some(handler) => handler.call(&request.args, language),
            None => Err(ToolCallError::Unknown(request.name.clone())),
        };

        let result = match result {
            Ok(payload) => payload,
            Err(e) => {
                warn!(tool = %request.name, "tool call failed: {}", e);
                serde_json::json!({ "error": e.to_string() })
            }
        };

        ToolResponseMessage {
            id: request.id.clone(),
            name: request.name.clone(),
            result,
        }
    }

    /// Answer a batch in arrival order, preserving every correlation id.
    pub fn handle_batch(
        &self,
        requests: &[ToolCallMessage],
        language: Language,
    ) -> Vec<ToolResponseMessage> {
        requests
            .iter()
            .map(|request| self.handle(request, language))
            .collect()
    }
}

impl Default for ToolMediator {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments the remote agent supplies to `save_strength`.
#[derive(Debug, Deserialize)]
struct SaveStrengthArgs {
    title: String,
    description: String,
}

/// Records detected strengths into the shared profile list.
pub struct SaveStrengthHandler {
    strengths: Arc<Mutex<Vec<StrengthRecord>>>,
}

impl SaveStrengthHandler {
    pub const NAME: &'static str = "save_strength";

    pub fn new(strengths: Arc<Mutex<Vec<StrengthRecord>>>) -> Self {
        Self { strengths }
    }

    /// Declaration advertised to the live session at open.
    pub fn declaration() -> ToolDeclaration {
        ToolDeclaration {
            name: Self::NAME.to_string(),
            description: "Records a detected user strength, talent, or personality trait \
                          to their visual profile. The text content MUST match the \
                          conversation language."
                .to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "title": {
                        "type": "string",
                        "description": "The name of the strength. Keep it short (2-3 words)."
                    },
                    "description": {
                        "type": "string",
                        "description": "A concise 1-sentence explanation of why this strength fits the user."
                    }
                },
                "required": ["title", "description"]
            }),
        }
    }
}

impl ToolHandler for SaveStrengthHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn call(
        &self,
        args: &serde_json::Value,
        language: Language,
    ) -> Result<serde_json::Value, ToolCallError> {
        let args: SaveStrengthArgs = serde_json::from_value(args.clone())
            .map_err(|e| ToolCallError::InvalidArgs(Self::NAME.to_string(), e.to_string()))?;

        let record = StrengthRecord {
            id: uuid::Uuid::new_v4().to_string(),
            title: args.title,
            description: args.description,
            recorded_at: Utc::now(),
        };
        info!(title = %record.title, "strength recorded");

        let mut strengths = self.strengths.lock().unwrap();
        strengths.push(record);

        Ok(serde_json::json!({
            "result": locale::translations(language).strength_recorded
        }))
    }
}
