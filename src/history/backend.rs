//! Durable storage for field histories

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;

use super::log::HistorySnapshot;
use super::{HistoryError, HistoryResult};

/// Key-value surface keyed by `{documentId}.{fieldPath}`
#[async_trait]
pub trait HistoryBackend: Send + Sync {
    async fn load(&self, key: &str) -> HistoryResult<Option<HistorySnapshot>>;

    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> HistoryResult<()>;

    async fn delete(&self, key: &str) -> HistoryResult<()>;
}

/// In-memory backend, lost on restart
#[derive(Clone, Default)]
pub struct InMemoryHistoryBackend {
    entries: Arc<RwLock<HashMap<String, HistorySnapshot>>>,
    writes: Arc<std::sync::atomic::AtomicUsize>,
}

impl InMemoryHistoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `save` calls served so far
    pub fn write_count(&self) -> usize {
        self.writes.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryBackend for InMemoryHistoryBackend {
    async fn load(&self, key: &str) -> HistoryResult<Option<HistorySnapshot>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> HistoryResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), snapshot.clone());
        self.writes.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Ok(())
    }

    async fn delete(&self, key: &str) -> HistoryResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }
}

/// File backend: one JSON document per key
pub struct FileHistoryBackend {
    base_path: PathBuf,
}

impl FileHistoryBackend {
    pub fn new(base_path: impl Into<PathBuf>) -> HistoryResult<Self> {
        let base_path = base_path.into();

        std::fs::create_dir_all(&base_path).map_err(|e| {
            HistoryError::Storage(format!("Failed to create directory: {}", e))
        })?;

        Ok(Self { base_path })
    }

    /// File for `key`. Bytes outside `[A-Za-z0-9._-]` are written as `%XX`,
    /// so distinct keys always get distinct files.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut file_name = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'-' | b'_') {
                file_name.push(byte as char);
            } else {
                file_name.push_str(&format!("%{:02X}", byte));
            }
        }
        self.base_path.join(format!("{}.json", file_name))
    }
}

#[async_trait]
impl HistoryBackend for FileHistoryBackend {
    async fn load(&self, key: &str) -> HistoryResult<Option<HistorySnapshot>> {
        let path = self.entry_path(key);

        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&path).await.map_err(|e| {
            HistoryError::Storage(format!("Failed to read history file: {}", e))
        })?;

        let snapshot: HistorySnapshot = serde_json::from_str(&content)?;
        Ok(Some(snapshot))
    }

    async fn save(&self, key: &str, snapshot: &HistorySnapshot) -> HistoryResult<()> {
        let path = self.entry_path(key);
        let content = serde_json::to_string_pretty(snapshot)?;

        fs::write(&path, content).await.map_err(|e| {
            HistoryError::Storage(format!("Failed to write history file: {}", e))
        })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> HistoryResult<()> {
        let path = self.entry_path(key);

        if path.exists() {
            fs::remove_file(&path).await.map_err(|e| {
                HistoryError::Storage(format!("Failed to delete history file: {}", e))
            })?;
        }

        Ok(())
    }
}
