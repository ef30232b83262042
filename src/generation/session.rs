//! Generation session types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use tokio::sync::watch;
use uuid::Uuid;

use super::error::GenerationError;
use crate::fields::{FieldKey, FieldNode, FieldType};

/// What the author asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    #[default]
    Compose,
    Rephrase,
    Expand,
    Simplify,
    Summarize,
    Proofread,
    Translate,
    Custom,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Compose => "compose",
            Action::Rephrase => "rephrase",
            Action::Expand => "expand",
            Action::Simplify => "simplify",
            Action::Summarize => "summarize",
            Action::Proofread => "proofread",
            Action::Translate => "translate",
            Action::Custom => "custom",
        };
        f.write_str(name)
    }
}

/// Shape of the output a session produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Raw text accumulated from deltas
    Text,
    /// A rich text document validated against the compiled schema
    StructuredObject,
    /// One atomic request returning an asset reference
    AssetUpload,
}

impl GenerationMode {
    /// Default mode for a resolved field
    pub fn for_field(field: &FieldNode) -> Self {
        match field.field_type() {
            Some(FieldType::RichText) => GenerationMode::StructuredObject,
            Some(FieldType::Upload) => GenerationMode::AssetUpload,
            _ => GenerationMode::Text,
        }
    }
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GenerationMode::Text => "text",
            GenerationMode::StructuredObject => "structured_object",
            GenerationMode::AssetUpload => "asset_upload",
        };
        f.write_str(name)
    }
}

/// Lifecycle of a session. `Cancelled`, `Committed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Streaming,
    Cancelled,
    Committed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Cancelled | SessionState::Committed | SessionState::Failed)
    }
}

/// Observable state of one session
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub state: SessionState,
    /// Last value that parsed and validated
    pub last_valid: Option<Value>,
    pub error: Option<GenerationError>,
}

impl SessionSnapshot {
    pub(crate) fn streaming() -> Self {
        Self {
            state: SessionState::Streaming,
            last_valid: None,
            error: None,
        }
    }
}

/// Request to start a session
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub key: FieldKey,
    /// Collection whose field tree describes `key.field_path`
    pub collection: String,
    pub action: Action,
    /// `None` picks the mode from the resolved field type
    pub mode: Option<GenerationMode>,
    pub prompt_template: Option<String>,
    pub instructions: Option<String>,
}

impl GenerationRequest {
    pub fn new(collection: impl Into<String>, key: FieldKey, action: Action) -> Self {
        Self {
            key,
            collection: collection.into(),
            action,
            mode: None,
            prompt_template: None,
            instructions: None,
        }
    }

    pub fn with_mode(mut self, mode: GenerationMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }
}

/// Progress notifications for indicators and failure toasts
#[derive(Debug, Clone)]
pub enum GenerationEvent {
    Started { key: FieldKey, session_id: Uuid, mode: GenerationMode },
    Preview { key: FieldKey, session_id: Uuid },
    Committed { key: FieldKey, session_id: Uuid },
    Cancelled { key: FieldKey, session_id: Uuid },
    Failed { key: FieldKey, session_id: Uuid, error: GenerationError },
}

/// Caller's handle on a running session
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: Uuid,
    pub key: FieldKey,
    pub mode: GenerationMode,
    pub(crate) state: watch::Receiver<SessionSnapshot>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    /// Wait for the session to reach a terminal state
    pub async fn wait(&mut self) -> SessionSnapshot {
        loop {
            {
                let current = self.state.borrow_and_update();
                if current.state.is_terminal() {
                    return current.clone();
                }
            }
            if self.state.changed().await.is_err() {
                return self.state.borrow().clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_for_field() {
        assert_eq!(
            GenerationMode::for_field(&FieldNode::rich_text("body", &[])),
            GenerationMode::StructuredObject
        );
        assert_eq!(
            GenerationMode::for_field(&FieldNode::leaf("cover", FieldType::Upload)),
            GenerationMode::AssetUpload
        );
        assert_eq!(
            GenerationMode::for_field(&FieldNode::leaf("title", FieldType::Text)),
            GenerationMode::Text
        );
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SessionState::Idle.is_terminal());
        assert!(!SessionState::Streaming.is_terminal());
        assert!(SessionState::Cancelled.is_terminal());
        assert!(SessionState::Committed.is_terminal());
        assert!(SessionState::Failed.is_terminal());
    }
}
