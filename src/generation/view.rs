//! Document view seam: where generated values become visible

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::fields::FieldKey;

/// Live document state the orchestrator writes into
#[async_trait]
pub trait DocumentView: Send + Sync {
    /// Show `value` in the field; called for previews and on commit
    async fn apply_value(&self, key: &FieldKey, value: Value);

    /// Put back what the field showed before a failed session
    async fn restore_value(&self, key: &FieldKey, previous: Option<Value>) {
        self.apply_value(key, previous.unwrap_or(Value::Null)).await
    }

    /// Value the field currently shows
    async fn current_value(&self, key: &FieldKey) -> Option<Value>;

    /// Data of the whole document, handed to the prompt context
    async fn document_data(&self, document_id: &str) -> Value;
}

/// Document view backed by a map; records every applied value
#[derive(Clone, Default)]
pub struct InMemoryDocumentView {
    values: Arc<RwLock<HashMap<FieldKey, Value>>>,
    applied: Arc<RwLock<Vec<(FieldKey, Value)>>>,
}

impl InMemoryDocumentView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `apply_value` call in order
    pub async fn applied(&self) -> Vec<(FieldKey, Value)> {
        self.applied.read().await.clone()
    }

    /// Values applied to one field, in order
    pub async fn applied_to(&self, key: &FieldKey) -> Vec<Value> {
        self.applied
            .read()
            .await
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }
}

#[async_trait]
impl DocumentView for InMemoryDocumentView {
    async fn apply_value(&self, key: &FieldKey, value: Value) {
        self.applied.write().await.push((key.clone(), value.clone()));
        self.values.write().await.insert(key.clone(), value);
    }

    async fn restore_value(&self, key: &FieldKey, previous: Option<Value>) {
        match previous {
            Some(value) => self.apply_value(key, value).await,
            None => {
                self.values.write().await.remove(key);
            }
        }
    }

    async fn current_value(&self, key: &FieldKey) -> Option<Value> {
        self.values.read().await.get(key).cloned()
    }

    async fn document_data(&self, document_id: &str) -> Value {
        let values = self.values.read().await;
        let mut data = Map::new();
        for (key, value) in values.iter().filter(|(k, _)| k.document_id == document_id) {
            data.insert(key.field_path.to_string(), value.clone());
        }
        Value::Object(data)
    }
}
