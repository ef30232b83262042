//! Node type registry
//!
//! Every node kind is described exactly once here. The schema compiler
//! derives the `InlineNode` / `BlockNode` unions from the `role` column, so
//! adding a kind only needs a new `NodeKind` variant and a `describe` arm.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::str::FromStr;

/// Reference to the synthetic union of every enabled inline kind
pub const INLINE_UNION: &str = "InlineNode";
/// Reference to the synthetic union of every enabled block kind
pub const BLOCK_UNION: &str = "BlockNode";

/// Discriminant of a document node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Root,
    Paragraph,
    Heading,
    Quote,
    Code,
    List,
    ListItem,
    HorizontalRule,
    Link,
    Text,
    LineBreak,
    Tab,
}

impl NodeKind {
    /// Every registered kind
    pub const ALL: [NodeKind; 12] = [
        NodeKind::Root,
        NodeKind::Paragraph,
        NodeKind::Heading,
        NodeKind::Quote,
        NodeKind::Code,
        NodeKind::List,
        NodeKind::ListItem,
        NodeKind::HorizontalRule,
        NodeKind::Link,
        NodeKind::Text,
        NodeKind::LineBreak,
        NodeKind::Tab,
    ];

    /// Kinds present in every compiled schema. An empty or inline-only
    /// document must still be representable.
    pub const MANDATORY: [NodeKind; 5] = [
        NodeKind::Root,
        NodeKind::Text,
        NodeKind::Paragraph,
        NodeKind::LineBreak,
        NodeKind::Tab,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Root => "root",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::Quote => "quote",
            NodeKind::Code => "code",
            NodeKind::List => "list",
            NodeKind::ListItem => "listitem",
            NodeKind::HorizontalRule => "horizontalrule",
            NodeKind::Link => "link",
            NodeKind::Text => "text",
            NodeKind::LineBreak => "linebreak",
            NodeKind::Tab => "tab",
        }
    }

    /// Parse a kind name, returning `None` for names this registry does not know
    pub fn parse(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown node kind: {}", s))
    }
}

/// Where a kind may appear in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuralRole {
    /// Entry point of a document, never a child
    Root,
    /// Child of root, list or list item
    Block,
    /// Child of paragraph, heading, quote, code or link
    Inline,
}

/// Registry entry for one node kind
#[derive(Debug, Clone)]
pub struct NodeDescriptor {
    pub kind: NodeKind,
    pub role: StructuralRole,
    /// Name of the definition in the compiled schema (e.g. `HeadingNode`)
    pub definition_name: &'static str,
    /// Closed-world object schema for this kind
    pub schema: Value,
    /// Kinds that must be enabled whenever this one is
    pub depends_on: &'static [NodeKind],
}

fn union_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/definitions/{}", name) })
}

fn children_of(union: &str) -> Value {
    json!({ "type": "array", "items": union_ref(union) })
}

/// Build a closed object schema where every declared property is required
fn node_object(kind: NodeKind, extra: Vec<(&str, Value)>) -> Value {
    let mut properties = serde_json::Map::new();
    properties.insert("type".to_string(), json!({ "type": "string", "const": kind.as_str() }));
    let mut required = vec![Value::String("type".to_string())];
    for (name, schema) in extra {
        properties.insert(name.to_string(), schema);
        required.push(Value::String(name.to_string()));
    }

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Look up the descriptor of a node kind. Pure; no side effects.
pub fn describe(kind: NodeKind) -> NodeDescriptor {
    let inline_children = || children_of(INLINE_UNION);
    let block_children = || children_of(BLOCK_UNION);

    let (role, definition_name, schema, depends_on): (_, _, _, &'static [NodeKind]) = match kind {
        NodeKind::Root => (
            StructuralRole::Root,
            "RootNode",
            node_object(kind, vec![("children", block_children())]),
            &[],
        ),
        NodeKind::Paragraph => (
            StructuralRole::Block,
            "ParagraphNode",
            node_object(kind, vec![("children", inline_children())]),
            &[],
        ),
        NodeKind::Heading => (
            StructuralRole::Block,
            "HeadingNode",
            node_object(
                kind,
                vec![
                    ("level", json!({ "type": "integer", "minimum": 1, "maximum": 6 })),
                    ("children", inline_children()),
                ],
            ),
            &[],
        ),
        NodeKind::Quote => (
            StructuralRole::Block,
            "QuoteNode",
            node_object(kind, vec![("children", inline_children())]),
            &[],
        ),
        NodeKind::Code => (
            StructuralRole::Block,
            "CodeNode",
            node_object(
                kind,
                vec![
                    ("language", json!({ "type": "string" })),
                    ("children", inline_children()),
                ],
            ),
            &[],
        ),
        NodeKind::List => (
            StructuralRole::Block,
            "ListNode",
            node_object(
                kind,
                vec![
                    ("listKind", json!({ "type": "string", "enum": ["bullet", "ordered", "checklist"] })),
                    ("children", block_children()),
                ],
            ),
            &[NodeKind::ListItem],
        ),
        NodeKind::ListItem => (
            StructuralRole::Block,
            "ListItemNode",
            node_object(
                kind,
                vec![
                    ("checked", json!({ "type": "boolean" })),
                    ("children", block_children()),
                ],
            ),
            &[],
        ),
        NodeKind::HorizontalRule => (
            StructuralRole::Block,
            "HorizontalRuleNode",
            node_object(kind, vec![]),
            &[],
        ),
        NodeKind::Link => (
            StructuralRole::Inline,
            "LinkNode",
            node_object(
                kind,
                vec![
                    ("url", json!({ "type": "string" })),
                    ("children", inline_children()),
                ],
            ),
            &[],
        ),
        NodeKind::Text => (
            StructuralRole::Inline,
            "TextNode",
            node_object(
                kind,
                vec![
                    ("content", json!({ "type": "string" })),
                    ("style", json!({ "type": "integer", "minimum": 0 })),
                ],
            ),
            &[],
        ),
        NodeKind::LineBreak => (
            StructuralRole::Inline,
            "LineBreakNode",
            node_object(kind, vec![]),
            &[],
        ),
        NodeKind::Tab => (StructuralRole::Inline, "TabNode", node_object(kind, vec![]), &[]),
    };

    NodeDescriptor {
        kind,
        role,
        definition_name,
        schema,
        depends_on,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_round_trips_names() {
        for kind in NodeKind::ALL {
            assert_eq!(NodeKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(NodeKind::parse("ListItem"), Some(NodeKind::ListItem));
        assert_eq!(NodeKind::parse("table"), None);
    }

    #[test]
    fn test_list_depends_on_listitem() {
        assert_eq!(describe(NodeKind::List).depends_on, &[NodeKind::ListItem]);
        assert!(describe(NodeKind::Paragraph).depends_on.is_empty());
    }

    #[test]
    fn test_roles() {
        assert_eq!(describe(NodeKind::Root).role, StructuralRole::Root);
        assert_eq!(describe(NodeKind::Heading).role, StructuralRole::Block);
        assert_eq!(describe(NodeKind::Link).role, StructuralRole::Inline);
        assert_eq!(describe(NodeKind::Tab).role, StructuralRole::Inline);
    }

    #[test]
    fn test_schemas_are_closed() {
        for kind in NodeKind::ALL {
            let schema = describe(kind).schema;
            assert_eq!(schema["additionalProperties"], false, "{} must be closed", kind);
            assert_eq!(schema["properties"]["type"]["const"], kind.as_str());

            let declared = schema["properties"].as_object().unwrap().len();
            let required = schema["required"].as_array().unwrap().len();
            assert_eq!(declared, required, "{} must require every property", kind);
        }
    }

    #[test]
    fn test_children_reference_unions_by_name() {
        let heading = describe(NodeKind::Heading).schema;
        assert_eq!(
            heading["properties"]["children"]["items"]["$ref"],
            "#/definitions/InlineNode"
        );

        let list = describe(NodeKind::List).schema;
        assert_eq!(
            list["properties"]["children"]["items"]["$ref"],
            "#/definitions/BlockNode"
        );
    }
}
