//! Validation of JSON values against a compiled schema.
//!
//! Checking is done by the `jsonschema` crate. Before a schema is handed to
//! it, every `anyOf` union whose members are tagged by a `type` constant is
//! rewritten into `if`/`then` branches keyed on that tag, so a node is only
//! ever checked against the one definition its tag names.

use jsonschema::Validator;
use serde_json::{json, Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use super::compiler::CompiledSchema;

/// Deepest nesting of objects and arrays accepted in a value
pub const MAX_DEPTH: usize = 128;

const DRAFT: &str = "http://json-schema.org/draft-07/schema#";

/// A single validation failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation {
    /// JSON-pointer style location of the offending value
    pub path: String,
    pub message: String,
}

impl SchemaViolation {
    fn at_root(message: String) -> Self {
        Self {
            path: String::new(),
            message,
        }
    }
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = if self.path.is_empty() { "/" } else { &self.path };
        write!(f, "{}: {}", path, self.message)
    }
}

/// Validate a value against a compiled schema
pub fn validate(schema: &CompiledSchema, value: &Value) -> Result<(), Vec<SchemaViolation>> {
    check_depth(value)?;
    match schema.validator() {
        Some(validator) => collect(validator, value),
        None => Err(vec![SchemaViolation::at_root(format!(
            "schema for kinds '{}' could not be compiled",
            schema.cache_key
        ))]),
    }
}

/// Validate a value against any schema document carrying its own `definitions`
pub fn validate_document(document: &Value, value: &Value) -> Result<(), Vec<SchemaViolation>> {
    check_depth(value)?;
    let validator = jsonschema::validator_for(&discriminate(document))
        .map_err(|e| vec![SchemaViolation::at_root(format!("invalid schema: {}", e))])?;
    collect(&validator, value)
}

/// Build the validator for a schema document
pub(crate) fn compile_validator(document: &Value) -> Option<Arc<Validator>> {
    match jsonschema::validator_for(&discriminate(document)) {
        Ok(validator) => Some(Arc::new(validator)),
        Err(e) => {
            warn!(error = %e, "Schema rejected by validator");
            None
        }
    }
}

fn collect(validator: &Validator, value: &Value) -> Result<(), Vec<SchemaViolation>> {
    let errors: Vec<SchemaViolation> = validator
        .iter_errors(value)
        .map(|e| SchemaViolation {
            path: e.instance_path.to_string(),
            message: e.to_string(),
        })
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Reject values nested deeper than `MAX_DEPTH` before they reach the validator
fn check_depth(value: &Value) -> Result<(), Vec<SchemaViolation>> {
    let mut stack = vec![(value, 0usize)];

    while let Some((value, depth)) = stack.pop() {
        let children: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            Value::Object(map) => map.values().collect(),
            _ => continue,
        };
        if depth >= MAX_DEPTH {
            return Err(vec![SchemaViolation::at_root(format!(
                "value nested deeper than {} levels",
                MAX_DEPTH
            ))]);
        }
        stack.extend(children.into_iter().map(|child| (child, depth + 1)));
    }

    Ok(())
}

/// Copy of `document` with tagged unions turned into tag dispatch
fn discriminate(document: &Value) -> Value {
    let mut document = document.clone();

    let dispatched: Map<String, Value> = match document.get("definitions").and_then(Value::as_object) {
        Some(definitions) => definitions
            .iter()
            .filter_map(|(name, definition)| Some((name.clone(), dispatch(definitions, definition)?)))
            .collect(),
        None => Map::new(),
    };

    if let Some(definitions) = document.get_mut("definitions").and_then(Value::as_object_mut) {
        definitions.extend(dispatched);
    }
    if let Some(root) = document.as_object_mut() {
        root.entry("$schema").or_insert_with(|| json!(DRAFT));
    }
    document
}

/// `if`/`then` form of an `anyOf` over local refs that all carry a `type` const
fn dispatch(definitions: &Map<String, Value>, definition: &Value) -> Option<Value> {
    let members = definition.get("anyOf")?.as_array()?;
    if members.is_empty() {
        return None;
    }

    let mut tags = Vec::with_capacity(members.len());
    let mut branches = Vec::with_capacity(members.len());
    for member in members {
        let reference = member.get("$ref")?.as_str()?;
        let target = definitions.get(reference.strip_prefix("#/definitions/")?)?;
        let tag = target.pointer("/properties/type/const")?;

        tags.push(tag.clone());
        branches.push(json!({
            "if": { "properties": { "type": { "const": tag } }, "required": ["type"] },
            "then": { "$ref": reference },
        }));
    }

    Some(json!({
        "type": "object",
        "required": ["type"],
        "properties": { "type": { "enum": tags } },
        "allOf": branches,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::compiler::compile;
    use serde_json::json;

    fn paragraph(text: &str) -> Value {
        json!({ "type": "paragraph", "children": [
            { "type": "text", "content": text, "style": 0 }
        ]})
    }

    #[test]
    fn test_valid_document() {
        let schema = compile(["heading"]);
        let value = json!({ "root": { "type": "root", "children": [
            { "type": "heading", "level": 1, "children": [
                { "type": "text", "content": "Title", "style": 1 },
                { "type": "tab" }
            ]},
            paragraph("Body")
        ]}});

        assert!(validate(&schema, &value).is_ok());
    }

    #[test]
    fn test_empty_root_is_valid() {
        let schema = compile(Vec::<&str>::new());
        let value = json!({ "root": { "type": "root", "children": [] } });
        assert!(validate(&schema, &value).is_ok());
    }

    #[test]
    fn test_disabled_kind_rejected() {
        let schema = compile(["heading"]);
        let value = json!({ "root": { "type": "root", "children": [
            { "type": "quote", "children": [] }
        ]}});

        let errors = validate(&schema, &value).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "/root/children/0/type");
        assert!(errors[0].message.contains("quote"));
    }

    #[test]
    fn test_violation_inside_discriminated_node() {
        let schema = compile(["heading"]);
        let value = json!({ "root": { "type": "root", "children": [
            { "type": "heading", "level": 9, "children": [] }
        ]}});

        let errors = validate(&schema, &value).unwrap_err();
        assert!(errors.iter().all(|e| e.path == "/root/children/0/level"), "{:?}", errors);
    }

    #[test]
    fn test_unknown_property_rejected() {
        let schema = compile(Vec::<&str>::new());
        let value = json!({ "root": { "type": "root", "children": [], "direction": "ltr" } });

        let errors = validate(&schema, &value).unwrap_err();
        assert!(errors.iter().any(|e| e.message.contains("'direction'")));
    }

    #[test]
    fn test_missing_root() {
        let schema = compile(Vec::<&str>::new());
        let errors = validate(&schema, &json!({})).unwrap_err();
        assert!(errors[0].message.contains("\"root\""));
    }

    #[test]
    fn test_block_in_inline_position() {
        let schema = compile(Vec::<&str>::new());
        let value = json!({ "root": { "type": "root", "children": [
            { "type": "paragraph", "children": [ paragraph("nested") ] }
        ]}});

        assert!(validate(&schema, &value).is_err());
    }

    /// `depth` lists, each holding one item that holds the next list
    fn nested_list(depth: usize) -> Value {
        let mut node = paragraph("leaf");
        for _ in 0..depth {
            node = json!({ "type": "list", "listKind": "bullet", "children": [
                { "type": "listitem", "checked": false, "children": [ node, paragraph("sibling") ] }
            ]});
        }
        json!({ "root": { "type": "root", "children": [node] } })
    }

    #[test]
    fn test_deep_lists_validate_in_linear_time() {
        let schema = compile(["list", "heading", "quote", "code", "link"]);

        let started = std::time::Instant::now();
        for depth in [4, 8, 12, 16] {
            assert!(validate(&schema, &nested_list(depth)).is_ok(), "depth {}", depth);
        }
        assert!(
            started.elapsed() < std::time::Duration::from_millis(500),
            "took {:?}",
            started.elapsed()
        );
    }

    #[test]
    fn test_depth_limit_counts_value_levels() {
        let schema = compile(["list"]);

        // 16 lists are 64 levels of objects and arrays plus the root wrapper
        assert!(validate(&schema, &nested_list(16)).is_ok());

        let mut value = json!("bottom");
        for _ in 0..MAX_DEPTH + 1 {
            value = json!([value]);
        }
        let errors = validate(&schema, &value).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("nested deeper than 128 levels"));

        let mut value = json!("bottom");
        for _ in 0..MAX_DEPTH {
            value = json!([value]);
        }
        let errors = validate(&schema, &value).unwrap_err();
        assert!(!errors[0].message.contains("nested deeper"));
    }

    #[test]
    fn test_validate_document_dispatches_any_tagged_union() {
        let document = json!({
            "definitions": {
                "Cat": { "type": "object", "properties": { "type": { "const": "cat" }, "lives": { "type": "integer" } } },
                "Dog": { "type": "object", "properties": { "type": { "const": "dog" }, "good": { "type": "boolean" } } },
                "Pet": { "anyOf": [{ "$ref": "#/definitions/Cat" }, { "$ref": "#/definitions/Dog" }] }
            },
            "$ref": "#/definitions/Pet"
        });

        assert!(validate_document(&document, &json!({ "type": "dog", "good": true })).is_ok());

        let errors = validate_document(&document, &json!({ "type": "cat", "lives": "nine" })).unwrap_err();
        assert_eq!(errors[0].path, "/lives");
        assert!(validate_document(&document, &json!({ "type": "fish" })).is_err());
    }
}
