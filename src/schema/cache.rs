use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::compiler::{cache_key, compile, CompiledSchema};

/// Shared memo of compiled schemas, keyed by the sorted kind set.
///
/// `compile` is pure, so one entry can serve every field with the same kinds.
#[derive(Clone, Default)]
pub struct SchemaCache {
    schemas: Arc<RwLock<HashMap<String, Arc<CompiledSchema>>>>,
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_compile<S: AsRef<str>>(&self, enabled: &[S]) -> Arc<CompiledSchema> {
        let key = cache_key(enabled.iter().map(|s| s.as_ref()));

        {
            let schemas = self.schemas.read().await;
            if let Some(schema) = schemas.get(&key) {
                return schema.clone();
            }
        }

        let mut schemas = self.schemas.write().await;
        schemas
            .entry(key)
            .or_insert_with_key(|key| {
                debug!(kinds = %key, "Compiling schema");
                Arc::new(compile(enabled.iter().map(|s| s.as_ref())))
            })
            .clone()
    }

    pub async fn len(&self) -> usize {
        self.schemas.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn clear(&self) {
        self.schemas.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_same_kinds_share_an_entry() {
        let cache = SchemaCache::new();

        let a = cache.get_or_compile(&["heading", "quote"]).await;
        let b = cache.get_or_compile(&["quote", "heading", "paragraph"]).await;

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len().await, 1);

        cache.get_or_compile(&["list"]).await;
        assert_eq!(cache.len().await, 2);
    }
}
