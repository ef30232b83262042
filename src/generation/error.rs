//! Error types for the generation pipeline

use thiserror::Error;

use crate::schema::SchemaViolation;

/// Failures reported by a transport; surfaced verbatim, never retried here
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Provider reported an error
    #[error("Provider error: {0}")]
    Provider(String),

    /// Connection or network failure
    #[error("Network error: {0}")]
    Network(String),

    /// Stream ended abnormally
    #[error("Streaming error: {0}")]
    Streaming(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,
}

/// Errors that end a generation session
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    /// Target field could not be resolved and the mode needs a concrete target
    #[error("Field not found: {collection}.{path}")]
    FieldNotFound { collection: String, path: String },

    /// Resolved field cannot receive this kind of generation
    #[error("Field {path} cannot be generated in {mode} mode")]
    UnsupportedField { path: String, mode: String },

    /// Transport failed
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Final payload is not valid JSON
    #[error("Malformed output: {0}")]
    Malformed(String),

    /// Final payload does not satisfy the field schema
    #[error("Output violates schema: {}", format_violations(.0))]
    SchemaViolation(Vec<SchemaViolation>),

    /// History could not be updated
    #[error("History error: {0}")]
    History(String),
}

fn format_violations(violations: &[SchemaViolation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<crate::history::HistoryError> for GenerationError {
    fn from(err: crate::history::HistoryError) -> Self {
        GenerationError::History(err.to_string())
    }
}

/// Result type alias for transport operations
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type alias for generation operations
pub type GenerationResult<T> = Result<T, GenerationError>;
