use std::collections::HashMap;
use thiserror::Error;

use crate::config::{GenerationSettings, HistoryBackendKind, HistorySettings, PromptConfig, Settings};
use crate::document::NodeKind;
use crate::fields::{resolve, CollectionSchema, FieldNode};

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Cross-reference error: {0}")]
    CrossReference(String),

    #[error("Duplicate entry: {0}")]
    Duplicate(String),
}

pub struct ConfigValidator;

impl ConfigValidator {
    pub fn validate(settings: &Settings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_history(&settings.history) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_generation(&settings.generation) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_collections(&settings.collections) {
            errors.extend(e);
        }

        if let Err(e) = Self::validate_prompts(&settings.prompts, &settings.collections) {
            errors.extend(e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_history(history: &HistorySettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if history.capacity == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "history.capacity".to_string(),
                reason: "Capacity must be greater than 0".to_string(),
            });
        }

        if history.backend == HistoryBackendKind::File && history.path.as_os_str().is_empty() {
            errors.push(ValidationError::MissingField("history.path".to_string()));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_generation(generation: &GenerationSettings) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();

        if generation.stream_buffer == 0 {
            errors.push(ValidationError::InvalidValue {
                field: "generation.stream_buffer".to_string(),
                reason: "Buffer must be greater than 0".to_string(),
            });
        }

        Self::check_kinds("generation.default_kinds", &generation.default_kinds, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_collections(collections: &[CollectionSchema]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen_slugs = HashMap::new();

        for (idx, collection) in collections.iter().enumerate() {
            if let Some(prev_idx) = seen_slugs.insert(&collection.slug, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Collection slug '{}' appears at indices {} and {}",
                    collection.slug, prev_idx, idx
                )));
            }

            if collection.slug.is_empty() {
                errors.push(ValidationError::MissingField(format!("collections[{}].slug", idx)));
            }

            Self::check_fields(&collection.slug, &collection.fields, &mut errors);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn check_fields(prefix: &str, fields: &[FieldNode], errors: &mut Vec<ValidationError>) {
        for field in fields {
            match field {
                FieldNode::Leaf { name, constraints, .. } => {
                    if let Some(kinds) = &constraints.enabled_kinds {
                        Self::check_kinds(&format!("{}.{}.enabledKinds", prefix, name), kinds, errors);
                    }
                }
                FieldNode::Group { name, children } => {
                    Self::check_fields(&format!("{}.{}", prefix, name), children, errors);
                }
                FieldNode::Array { name, item, .. } => {
                    Self::check_fields(&format!("{}.{}", prefix, name), item, errors);
                }
                FieldNode::Tabs { tabs } => {
                    for tab in tabs {
                        Self::check_fields(prefix, &tab.children, errors);
                    }
                }
                FieldNode::BlockUnion { variants, .. } => {
                    for variant in variants {
                        let path = format!("{}.{}", prefix, variant.tag);
                        Self::check_fields(&path, &variant.children, errors);
                    }
                }
            }
        }
    }

    fn check_kinds(field: &str, kinds: &[String], errors: &mut Vec<ValidationError>) {
        for kind in kinds {
            if NodeKind::parse(kind).is_none() {
                errors.push(ValidationError::InvalidValue {
                    field: field.to_string(),
                    reason: format!("Unknown node kind '{}'", kind),
                });
            }
        }
    }

    fn validate_prompts(prompts: &[PromptConfig], collections: &[CollectionSchema]) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        let mut seen_fields = HashMap::new();

        for (idx, prompt) in prompts.iter().enumerate() {
            if let Some(prev_idx) = seen_fields.insert(&prompt.field, idx) {
                errors.push(ValidationError::Duplicate(format!(
                    "Prompt for '{}' appears at indices {} and {}",
                    prompt.field, prev_idx, idx
                )));
            }

            if prompt.field.is_empty() {
                errors.push(ValidationError::MissingField(format!("prompts[{}].field", idx)));
                continue;
            }

            if prompt.template.is_empty() {
                errors.push(ValidationError::MissingField(format!("prompts[{}].template", idx)));
            }

            let segments: Vec<&str> = prompt.field.split('.').collect();
            let resolved = collections
                .iter()
                .filter(|c| c.slug == segments[0])
                .any(|c| resolve(c, &segments).is_some());
            if !resolved {
                errors.push(ValidationError::CrossReference(format!(
                    "Prompt '{}' does not match any collection field",
                    prompt.field
                )));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldType;

    fn posts() -> CollectionSchema {
        CollectionSchema {
            slug: "posts".to_string(),
            fields: vec![
                FieldNode::leaf("title", FieldType::Text),
                FieldNode::group("articleBody", vec![FieldNode::rich_text("content", &["heading"])]),
            ],
        }
    }

    fn prompt(field: &str) -> PromptConfig {
        PromptConfig {
            field: field.to_string(),
            template: "Write it".to_string(),
            description: None,
        }
    }

    #[test]
    fn test_valid_config() {
        let settings = Settings {
            collections: vec![posts()],
            prompts: vec![prompt("posts.articleBody.content")],
            ..Default::default()
        };

        assert!(ConfigValidator::validate(&settings).is_ok());
    }

    #[test]
    fn test_zero_capacity() {
        let mut settings = Settings::default();
        settings.history.capacity = 0;

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_duplicate_collection_slugs() {
        let settings = Settings {
            collections: vec![posts(), posts()],
            ..Default::default()
        };

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert!(errors.iter().any(|e| matches!(e, ValidationError::Duplicate(_))));
    }

    #[test]
    fn test_unknown_kinds() {
        let mut settings = Settings {
            collections: vec![CollectionSchema {
                slug: "posts".to_string(),
                fields: vec![FieldNode::rich_text("body", &["heading", "table"])],
            }],
            ..Default::default()
        };
        settings.generation.default_kinds.push("video".to_string());

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().any(|e| e.to_string().contains("posts.body.enabledKinds")));
    }

    #[test]
    fn test_prompt_cross_reference() {
        let settings = Settings {
            collections: vec![posts()],
            prompts: vec![prompt("posts.summary"), prompt("pages.title")],
            ..Default::default()
        };

        let errors = ConfigValidator::validate(&settings).unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.iter().all(|e| matches!(e, ValidationError::CrossReference(_))));
    }
}
