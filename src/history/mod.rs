//! Per-field undo/redo history
//!
//! - `log` - the bounded, reversible log and its persisted snapshot
//! - `backend` - storage backends (in-memory, file)
//! - `store` - the shared, debounced service used by the orchestrator

pub mod backend;
pub mod log;
pub mod store;

pub use backend::{FileHistoryBackend, HistoryBackend, InMemoryHistoryBackend};
pub use log::{HistoryEntry, HistoryLog, HistorySnapshot, DEFAULT_CAPACITY};
pub use store::{HistoryStore, DEFAULT_DEBOUNCE};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{HistoryBackendKind, HistorySettings};

/// Errors raised by history storage
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for HistoryError {
    fn from(err: serde_json::Error) -> Self {
        HistoryError::Serialization(err.to_string())
    }
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Create a history store from configuration
pub fn create_store(settings: &HistorySettings) -> HistoryResult<HistoryStore> {
    let backend: Arc<dyn HistoryBackend> = match settings.backend {
        HistoryBackendKind::Memory => Arc::new(InMemoryHistoryBackend::new()),
        HistoryBackendKind::File => Arc::new(FileHistoryBackend::new(&settings.path)?),
    };

    Ok(HistoryStore::new(
        backend,
        settings.capacity,
        Duration::from_millis(settings.debounce_ms),
    ))
}
