//! Shared history service
//!
//! One `HistoryLog` per field key, cached in memory and shared by every
//! clone of the store. Durable writes are debounced per key: a burst of
//! changes inside the debounce window collapses into a single `save`.
//!
//! A cached log stays in memory until `clear` or `release` drops it.
//! `release` writes any pending change first, so a released key reloads
//! from the backend on its next use.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::backend::HistoryBackend;
use super::log::{HistoryLog, HistorySnapshot, DEFAULT_CAPACITY};
use super::HistoryResult;
use crate::fields::FieldKey;

/// Reference debounce window for durable writes
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

struct PendingWrite {
    generation: u64,
    handle: JoinHandle<()>,
}

struct Inner {
    backend: Arc<dyn HistoryBackend>,
    capacity: usize,
    debounce: Duration,
    logs: Mutex<HashMap<String, HistoryLog>>,
    pending: Mutex<HashMap<String, PendingWrite>>,
    generation: std::sync::atomic::AtomicU64,
}

impl Inner {
    async fn persist(&self, storage_key: &str) -> HistoryResult<()> {
        let snapshot = {
            let logs = self.logs.lock().await;
            match logs.get(storage_key) {
                Some(log) => log.snapshot(),
                None => return Ok(()),
            }
        };

        self.backend.save(storage_key, &snapshot).await?;
        debug!(key = %storage_key, entries = snapshot.history.len(), "History persisted");
        Ok(())
    }
}

/// Per-field bounded undo/redo history with debounced persistence
#[derive(Clone)]
pub struct HistoryStore {
    inner: Arc<Inner>,
}

impl HistoryStore {
    pub fn new(backend: Arc<dyn HistoryBackend>, capacity: usize, debounce: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                capacity: capacity.max(1),
                debounce,
                logs: Mutex::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                generation: std::sync::atomic::AtomicU64::new(0),
            }),
        }
    }

    /// Store with the reference capacity (50) and debounce (500 ms)
    pub fn with_defaults(backend: Arc<dyn HistoryBackend>) -> Self {
        Self::new(backend, DEFAULT_CAPACITY, DEFAULT_DEBOUNCE)
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Make sure the log for `key` is cached, reading the backend on first use
    async fn ensure_loaded(&self, storage_key: &str) -> HistoryResult<()> {
        {
            let logs = self.inner.logs.lock().await;
            if logs.contains_key(storage_key) {
                return Ok(());
            }
        }

        let log = match self.inner.backend.load(storage_key).await? {
            Some(snapshot) => HistoryLog::from_snapshot(snapshot, self.inner.capacity),
            None => HistoryLog::new(self.inner.capacity),
        };

        let mut logs = self.inner.logs.lock().await;
        logs.entry(storage_key.to_string()).or_insert(log);
        Ok(())
    }

    /// Load persisted history for `key` and return its current value
    pub async fn load(&self, key: &FieldKey) -> HistoryResult<Option<Value>> {
        let storage_key = key.storage_key();
        self.ensure_loaded(&storage_key).await?;

        let logs = self.inner.logs.lock().await;
        Ok(logs.get(&storage_key).and_then(|log| log.current().cloned()))
    }

    /// Record a committed value; returns the new cursor position
    pub async fn set(&self, key: &FieldKey, value: Value) -> HistoryResult<usize> {
        let storage_key = key.storage_key();
        self.ensure_loaded(&storage_key).await?;

        let index = {
            let mut logs = self.inner.logs.lock().await;
            let log = logs
                .entry(storage_key.clone())
                .or_insert_with(|| HistoryLog::new(self.inner.capacity));
            log.set(value)
        };

        self.schedule_persist(storage_key).await;
        Ok(index)
    }

    pub async fn undo(&self, key: &FieldKey) -> HistoryResult<Option<Value>> {
        self.step(key, |log| log.undo().cloned()).await
    }

    pub async fn redo(&self, key: &FieldKey) -> HistoryResult<Option<Value>> {
        self.step(key, |log| log.redo().cloned()).await
    }

    async fn step<F>(&self, key: &FieldKey, f: F) -> HistoryResult<Option<Value>>
    where
        F: FnOnce(&mut HistoryLog) -> Option<Value>,
    {
        let storage_key = key.storage_key();
        self.ensure_loaded(&storage_key).await?;

        let moved = {
            let mut logs = self.inner.logs.lock().await;
            logs.get_mut(&storage_key).and_then(f)
        };

        if moved.is_some() {
            self.schedule_persist(storage_key).await;
        }
        Ok(moved)
    }

    /// Current value, from the cache only
    pub async fn current(&self, key: &FieldKey) -> Option<Value> {
        let logs = self.inner.logs.lock().await;
        logs.get(&key.storage_key()).and_then(|log| log.current().cloned())
    }

    pub async fn can_undo(&self, key: &FieldKey) -> bool {
        let logs = self.inner.logs.lock().await;
        logs.get(&key.storage_key()).map_or(false, HistoryLog::can_undo)
    }

    pub async fn can_redo(&self, key: &FieldKey) -> bool {
        let logs = self.inner.logs.lock().await;
        logs.get(&key.storage_key()).map_or(false, HistoryLog::can_redo)
    }

    pub async fn snapshot(&self, key: &FieldKey) -> Option<HistorySnapshot> {
        let logs = self.inner.logs.lock().await;
        logs.get(&key.storage_key()).map(HistoryLog::snapshot)
    }

    /// Drop the history of `key`, in memory and in the backend
    pub async fn clear(&self, key: &FieldKey) -> HistoryResult<()> {
        let storage_key = key.storage_key();

        if let Some(pending) = self.inner.pending.lock().await.remove(&storage_key) {
            pending.handle.abort();
        }
        self.inner.logs.lock().await.remove(&storage_key);
        self.inner.backend.delete(&storage_key).await
    }

    /// Drop the cached log of `key`, writing a pending change to the backend first
    pub async fn release(&self, key: &FieldKey) -> HistoryResult<()> {
        let storage_key = key.storage_key();

        let pending = self.inner.pending.lock().await.remove(&storage_key);
        let log = self.inner.logs.lock().await.remove(&storage_key);

        match (pending, log) {
            (Some(pending), Some(log)) => {
                pending.handle.abort();
                self.inner.backend.save(&storage_key, &log.snapshot()).await?;
                debug!(key = %storage_key, "History released after final write");
            }
            (Some(pending), None) => pending.handle.abort(),
            _ => {}
        }
        Ok(())
    }

    /// Number of logs held in memory
    pub async fn cached(&self) -> usize {
        self.inner.logs.lock().await.len()
    }

    /// Persist every pending write now instead of waiting for the debounce window
    pub async fn flush(&self) -> HistoryResult<()> {
        let keys: Vec<String> = {
            let mut pending = self.inner.pending.lock().await;
            pending
                .drain()
                .map(|(key, write)| {
                    write.handle.abort();
                    key
                })
                .collect()
        };

        for key in keys {
            self.inner.persist(&key).await?;
        }
        Ok(())
    }

    async fn schedule_persist(&self, storage_key: String) {
        let generation = self
            .inner
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);

        let mut pending = self.inner.pending.lock().await;
        if let Some(previous) = pending.remove(&storage_key) {
            previous.handle.abort();
        }

        let inner = self.inner.clone();
        let key = storage_key.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(inner.debounce).await;

            {
                let mut pending = inner.pending.lock().await;
                match pending.get(&key) {
                    Some(write) if write.generation == generation => {
                        pending.remove(&key);
                    }
                    _ => return,
                }
            }

            if let Err(e) = inner.persist(&key).await {
                error!(key = %key, "Failed to persist history: {}", e);
            }
        });

        pending.insert(storage_key, PendingWrite { generation, handle });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::InMemoryHistoryBackend;
    use serde_json::json;

    fn key() -> FieldKey {
        FieldKey::parse("doc-1", "articleBody.content").unwrap()
    }

    fn store(backend: &InMemoryHistoryBackend, debounce: Duration) -> HistoryStore {
        HistoryStore::new(Arc::new(backend.clone()), DEFAULT_CAPACITY, debounce)
    }

    #[tokio::test]
    async fn test_set_undo_redo() {
        let backend = InMemoryHistoryBackend::new();
        let history = store(&backend, Duration::from_secs(60));
        let key = key();

        history.set(&key, json!("a")).await.unwrap();
        history.set(&key, json!("b")).await.unwrap();
        history.set(&key, json!("c")).await.unwrap();

        assert_eq!(history.undo(&key).await.unwrap(), Some(json!("b")));
        assert_eq!(history.undo(&key).await.unwrap(), Some(json!("a")));
        assert_eq!(history.redo(&key).await.unwrap(), Some(json!("b")));

        history.set(&key, json!("d")).await.unwrap();
        assert!(!history.can_redo(&key).await);
        assert_eq!(history.current(&key).await, Some(json!("d")));
    }

    #[tokio::test]
    async fn test_burst_of_writes_is_coalesced() {
        let backend = InMemoryHistoryBackend::new();
        let history = store(&backend, Duration::from_millis(40));
        let key = key();

        for i in 0..5 {
            history.set(&key, json!(i)).await.unwrap();
        }
        assert_eq!(backend.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.write_count(), 1);

        let stored = backend.load(&key.storage_key()).await.unwrap().unwrap();
        assert_eq!(stored.current_index, 4);
        assert_eq!(stored.history.len(), 5);
    }

    #[tokio::test]
    async fn test_flush_persists_immediately() {
        let backend = InMemoryHistoryBackend::new();
        let history = store(&backend, Duration::from_secs(60));
        let key = key();

        history.set(&key, json!("a")).await.unwrap();
        history.set(&key, json!("b")).await.unwrap();
        history.flush().await.unwrap();

        assert_eq!(backend.write_count(), 1);
        history.flush().await.unwrap();
        assert_eq!(backend.write_count(), 1);
    }

    #[tokio::test]
    async fn test_history_resumes_after_reload() {
        let backend = InMemoryHistoryBackend::new();
        let key = key();

        let first = store(&backend, Duration::from_secs(60));
        first.set(&key, json!("a")).await.unwrap();
        first.set(&key, json!("b")).await.unwrap();
        first.flush().await.unwrap();

        let second = store(&backend, Duration::from_secs(60));
        assert_eq!(second.load(&key).await.unwrap(), Some(json!("b")));
        assert_eq!(second.undo(&key).await.unwrap(), Some(json!("a")));

        second.set(&key, json!("c")).await.unwrap();
        let snapshot = second.snapshot(&key).await.unwrap();
        assert_eq!(snapshot.history, vec![json!("a"), json!("c")]);
    }

    #[tokio::test]
    async fn test_release_writes_pending_change_and_evicts() {
        let backend = InMemoryHistoryBackend::new();
        let history = store(&backend, Duration::from_secs(60));
        let key = key();

        history.set(&key, json!("a")).await.unwrap();
        history.set(&key, json!("b")).await.unwrap();
        assert_eq!(history.cached().await, 1);
        assert_eq!(backend.write_count(), 0);

        history.release(&key).await.unwrap();
        assert_eq!(history.cached().await, 0);
        assert_eq!(history.current(&key).await, None);
        assert_eq!(backend.write_count(), 1);

        assert_eq!(history.load(&key).await.unwrap(), Some(json!("b")));
        assert_eq!(history.undo(&key).await.unwrap(), Some(json!("a")));

        history.release(&key).await.unwrap();
        history.release(&key).await.unwrap();
        assert_eq!(history.cached().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = InMemoryHistoryBackend::new();
        let history = store(&backend, Duration::from_secs(60));
        let other = history.clone();
        let key = key();

        history.set(&key, json!(1)).await.unwrap();
        assert_eq!(other.current(&key).await, Some(json!(1)));

        other.clear(&key).await.unwrap();
        assert_eq!(history.current(&key).await, None);
    }
}
