//! Compiles an enabled-kind set into a closed-world JSON Schema document.
//!
//! Each included kind is materialised once under `definitions` and children
//! only ever reference the two synthetic unions, so the schema size does not
//! depend on document depth and a new kind never edits existing definitions.
//! The matching `jsonschema` validator is built once here and shared by
//! every clone.

use jsonschema::Validator;
use serde_json::{json, Map, Value};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use super::validator::compile_validator;
use crate::document::registry::{describe, NodeKind, StructuralRole, BLOCK_UNION, INLINE_UNION};

/// Name of the document entry point definition
pub const ROOT_DEFINITION: &str = "RootNode";

/// A compiled, self-consistent schema for one enabled-kind set
#[derive(Clone)]
pub struct CompiledSchema {
    /// Every kind the schema admits, after mandatory and dependency expansion
    pub kinds: BTreeSet<NodeKind>,
    /// Sorted, comma-joined kind names; stable across input orderings
    pub cache_key: String,
    /// The JSON Schema document
    pub document: Value,
    validator: Option<Arc<Validator>>,
}

impl fmt::Debug for CompiledSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledSchema")
            .field("kinds", &self.kinds)
            .field("cache_key", &self.cache_key)
            .field("document", &self.document)
            .finish_non_exhaustive()
    }
}

impl PartialEq for CompiledSchema {
    fn eq(&self, other: &Self) -> bool {
        self.kinds == other.kinds && self.cache_key == other.cache_key && self.document == other.document
    }
}

impl CompiledSchema {
    /// Validator built from `document`; `None` only if `jsonschema` rejected it
    pub(crate) fn validator(&self) -> Option<&Validator> {
        self.validator.as_deref()
    }

    /// Look up a definition by name
    pub fn definition(&self, name: &str) -> Option<&Value> {
        self.document.get("definitions").and_then(|defs| defs.get(name))
    }

    /// Definition names listed in the `InlineNode` union
    pub fn inline_variants(&self) -> Vec<String> {
        self.union_members(INLINE_UNION)
    }

    /// Definition names listed in the `BlockNode` union
    pub fn block_variants(&self) -> Vec<String> {
        self.union_members(BLOCK_UNION)
    }

    fn union_members(&self, union: &str) -> Vec<String> {
        self.definition(union)
            .and_then(|def| def.get("anyOf"))
            .and_then(|any_of| any_of.as_array())
            .map(|refs| {
                refs.iter()
                    .filter_map(|r| r.get("$ref").and_then(|v| v.as_str()))
                    .filter_map(|r| r.strip_prefix("#/definitions/"))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// Normalise kind names into the full set the schema must admit.
///
/// Unknown names are ignored. Mandatory kinds are always added and
/// dependencies are expanded to a fixed point.
pub fn expand_kinds<I, S>(enabled: I) -> BTreeSet<NodeKind>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut kinds: BTreeSet<NodeKind> = enabled
        .into_iter()
        .filter_map(|name| NodeKind::parse(name.as_ref()))
        .collect();
    kinds.extend(NodeKind::MANDATORY);

    loop {
        let missing: Vec<NodeKind> = kinds
            .iter()
            .flat_map(|kind| describe(*kind).depends_on.iter().copied())
            .filter(|dep| !kinds.contains(dep))
            .collect();
        if missing.is_empty() {
            break;
        }
        kinds.extend(missing);
    }

    kinds
}

/// Cache key for an enabled-kind set; identical for any ordering of the same names
pub fn cache_key<I, S>(enabled: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    key_for(&expand_kinds(enabled))
}

fn key_for(kinds: &BTreeSet<NodeKind>) -> String {
    kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>().join(",")
}

fn union_of(kinds: &BTreeSet<NodeKind>, role: StructuralRole) -> Value {
    let variants: Vec<Value> = kinds
        .iter()
        .map(|kind| describe(*kind))
        .filter(|descriptor| descriptor.role == role)
        .map(|descriptor| json!({ "$ref": format!("#/definitions/{}", descriptor.definition_name) }))
        .collect();
    json!({ "anyOf": variants })
}

/// Compile the schema for an enabled-kind set. Pure and order-independent.
pub fn compile<I, S>(enabled: I) -> CompiledSchema
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let kinds = expand_kinds(enabled);

    let mut definitions = Map::new();
    for kind in &kinds {
        let descriptor = describe(*kind);
        definitions.insert(descriptor.definition_name.to_string(), descriptor.schema);
    }
    definitions.insert(INLINE_UNION.to_string(), union_of(&kinds, StructuralRole::Inline));
    definitions.insert(BLOCK_UNION.to_string(), union_of(&kinds, StructuralRole::Block));

    let document = json!({
        "type": "object",
        "properties": {
            "root": { "$ref": format!("#/definitions/{}", ROOT_DEFINITION) }
        },
        "required": ["root"],
        "additionalProperties": false,
        "definitions": definitions,
    });

    CompiledSchema {
        cache_key: key_for(&kinds),
        kinds,
        validator: compile_validator(&document),
        document,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mandatory_kinds_for_empty_set() {
        let schema = compile(Vec::<String>::new());

        for kind in NodeKind::MANDATORY {
            assert!(schema.kinds.contains(&kind), "{} missing", kind);
        }
        assert!(schema.definition("RootNode").is_some());
        assert!(schema.definition("TextNode").is_some());
        assert_eq!(schema.block_variants(), vec!["ParagraphNode"]);
        assert_eq!(
            schema.inline_variants(),
            vec!["TextNode", "LineBreakNode", "TabNode"]
        );
    }

    #[test]
    fn test_order_independence() {
        let a = compile(["heading", "list", "quote"]);
        let b = compile(["quote", "heading", "list"]);
        assert_eq!(a, b);
        assert_eq!(cache_key(["list", "heading"]), cache_key(["heading", "list"]));
    }

    #[test]
    fn test_heading_and_paragraph_block_union() {
        let schema = compile(["heading", "paragraph"]);
        let blocks = schema.block_variants();

        assert_eq!(blocks.len(), 2);
        assert!(blocks.contains(&"HeadingNode".to_string()));
        assert!(blocks.contains(&"ParagraphNode".to_string()));
        assert!(!blocks.contains(&"ListNode".to_string()));
        assert!(schema.definition("ListNode").is_none());
    }

    #[test]
    fn test_dependencies_are_expanded() {
        let schema = compile(["list"]);
        assert!(schema.kinds.contains(&NodeKind::ListItem));
        assert!(schema.block_variants().contains(&"ListItemNode".to_string()));
    }

    #[test]
    fn test_unknown_kinds_are_ignored() {
        assert_eq!(compile(["table", "heading"]), compile(["heading"]));
    }

    #[test]
    fn test_entry_point_shape() {
        let schema = compile(["link"]);
        let doc = &schema.document;

        assert_eq!(doc["properties"]["root"]["$ref"], "#/definitions/RootNode");
        assert_eq!(doc["additionalProperties"], false);
        assert_eq!(
            doc["definitions"]["RootNode"]["properties"]["children"]["items"]["$ref"],
            "#/definitions/BlockNode"
        );
        assert!(schema.inline_variants().contains(&"LinkNode".to_string()));
    }

    #[test]
    fn test_every_kind_set_builds_a_validator() {
        assert!(compile(Vec::<&str>::new()).validator().is_some());

        let names: Vec<&str> = NodeKind::ALL.iter().map(|k| k.as_str()).collect();
        let schema = compile(&names);
        assert!(schema.validator().is_some());
        assert_eq!(schema.clone(), schema);
    }
}
