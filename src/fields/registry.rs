use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use super::resolver::resolve;
use super::{CollectionSchema, FieldNode, FieldPath};

/// Lookup of field definitions by collection and path
pub trait FieldRegistry: Send + Sync {
    /// Resolve `path` (relative to the collection, row indices allowed) to a leaf
    fn lookup_field(&self, collection: &str, path: &FieldPath) -> Option<FieldNode>;
}

/// Field registry holding every collection tree in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryFieldRegistry {
    collections: HashMap<String, CollectionSchema>,
}

impl InMemoryFieldRegistry {
    pub fn new(collections: impl IntoIterator<Item = CollectionSchema>) -> Self {
        let mut registry = Self::default();
        for collection in collections {
            registry.insert(collection);
        }
        registry
    }

    /// Load every collection file (`json`, `yaml`, `yml`, `toml`) in a directory
    pub fn from_dir(dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        let collections: Vec<CollectionSchema> = crate::config::load_dir(dir.as_ref())?;
        for collection in &collections {
            debug!(collection = %collection.slug, "Loaded collection");
        }
        Ok(Self::new(collections))
    }

    pub fn insert(&mut self, collection: CollectionSchema) {
        if self.collections.contains_key(&collection.slug) {
            warn!(collection = %collection.slug, "Replacing existing collection definition");
        }
        self.collections.insert(collection.slug.clone(), collection);
    }

    pub fn collection(&self, slug: &str) -> Option<&CollectionSchema> {
        self.collections.get(slug)
    }

    pub fn slugs(&self) -> Vec<&str> {
        let mut slugs: Vec<&str> = self.collections.keys().map(String::as_str).collect();
        slugs.sort_unstable();
        slugs
    }
}

impl FieldRegistry for InMemoryFieldRegistry {
    fn lookup_field(&self, collection: &str, path: &FieldPath) -> Option<FieldNode> {
        let tree = self.collections.get(collection)?;

        let mut full = Vec::with_capacity(path.segments().len() + 1);
        full.push(collection.to_string());
        full.extend(path.schema_path());

        resolve(tree, &full).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;
    use std::fs;
    use tempfile::TempDir;

    fn posts() -> CollectionSchema {
        CollectionSchema {
            slug: "posts".to_string(),
            fields: vec![FieldNode::array(
                "sections",
                vec![FieldNode::leaf("summary", FieldType::Textarea)],
            )],
        }
    }

    #[test]
    fn test_lookup_ignores_row_indices() {
        let registry = InMemoryFieldRegistry::new([posts()]);
        let path: FieldPath = "sections.4.summary".parse().unwrap();

        let field = registry.lookup_field("posts", &path).unwrap();
        assert_eq!(field.name(), Some("summary"));
        assert!(registry.lookup_field("pages", &path).is_none());
    }

    #[test]
    fn test_from_dir_reads_json_and_yaml() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        fs::write(
            dir.path().join("posts.json"),
            serde_json::to_string(&posts())?,
        )?;
        fs::write(
            dir.path().join("pages.yaml"),
            r#"
slug: pages
fields:
  - kind: leaf
    name: body
    fieldType: richText
    constraints:
      enabledKinds: [heading, quote]
"#,
        )?;
        fs::write(dir.path().join("notes.txt"), "ignored")?;

        let registry = InMemoryFieldRegistry::from_dir(dir.path())?;
        assert_eq!(registry.slugs(), vec!["pages", "posts"]);

        let body = registry
            .lookup_field("pages", &"body".parse().unwrap())
            .unwrap();
        let kinds = body.constraints().and_then(|c| c.enabled_kinds.clone());
        assert_eq!(kinds, Some(vec!["heading".to_string(), "quote".to_string()]));
        Ok(())
    }
}
