//! Field tree model
//!
//! A collection describes its content fields as a tree of heterogeneous
//! nodes. The tree is immutable once loaded; `resolver` walks it by dotted
//! path and `registry` serves lookups by collection.

pub mod registry;
pub mod resolver;

pub use registry::{FieldRegistry, InMemoryFieldRegistry};
pub use resolver::{resolve, resolve_in};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Leaf field data type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    Text,
    Textarea,
    RichText,
    Number,
    Checkbox,
    Select,
    Upload,
    Relationship,
}

/// Constraints attached to a leaf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct FieldConstraints {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    /// Node kinds enabled for a rich text leaf; `None` means the configured default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled_kinds: Option<Vec<String>>,
    /// Target collection for upload and relationship leaves
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation_to: Option<String>,
}

/// One tab of a `Tabs` layout node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Tab {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub children: Vec<FieldNode>,
}

/// One variant of a `BlockUnion`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct BlockVariant {
    pub tag: String,
    pub children: Vec<FieldNode>,
}

/// A node of a collection's field tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum FieldNode {
    Leaf {
        name: String,
        #[serde(rename = "fieldType")]
        field_type: FieldType,
        #[serde(default)]
        constraints: FieldConstraints,
    },
    Group {
        name: String,
        children: Vec<FieldNode>,
    },
    /// Repeating rows sharing one item template
    Array {
        name: String,
        item: Vec<FieldNode>,
        #[serde(default, rename = "minItems", skip_serializing_if = "Option::is_none")]
        min_items: Option<usize>,
        #[serde(default, rename = "maxItems", skip_serializing_if = "Option::is_none")]
        max_items: Option<usize>,
    },
    /// Layout only; does not take part in addressing
    Tabs { tabs: Vec<Tab> },
    /// Polymorphic blocks selected by a variant tag. The tag segment alone
    /// addresses a variant; `name`, when set, may optionally precede it.
    BlockUnion {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        variants: Vec<BlockVariant>,
    },
}

impl FieldNode {
    pub fn leaf(name: impl Into<String>, field_type: FieldType) -> Self {
        FieldNode::Leaf {
            name: name.into(),
            field_type,
            constraints: FieldConstraints::default(),
        }
    }

    pub fn rich_text(name: impl Into<String>, enabled_kinds: &[&str]) -> Self {
        FieldNode::Leaf {
            name: name.into(),
            field_type: FieldType::RichText,
            constraints: FieldConstraints {
                enabled_kinds: Some(enabled_kinds.iter().map(|k| k.to_string()).collect()),
                ..Default::default()
            },
        }
    }

    pub fn group(name: impl Into<String>, children: Vec<FieldNode>) -> Self {
        FieldNode::Group {
            name: name.into(),
            children,
        }
    }

    pub fn array(name: impl Into<String>, item: Vec<FieldNode>) -> Self {
        FieldNode::Array {
            name: name.into(),
            item,
            min_items: None,
            max_items: None,
        }
    }

    /// Name used in paths; `Tabs` and unnamed unions have none
    pub fn name(&self) -> Option<&str> {
        match self {
            FieldNode::Leaf { name, .. }
            | FieldNode::Group { name, .. }
            | FieldNode::Array { name, .. } => Some(name),
            FieldNode::BlockUnion { name, .. } => name.as_deref(),
            FieldNode::Tabs { .. } => None,
        }
    }

    pub fn field_type(&self) -> Option<FieldType> {
        match self {
            FieldNode::Leaf { field_type, .. } => Some(*field_type),
            _ => None,
        }
    }

    pub fn constraints(&self) -> Option<&FieldConstraints> {
        match self {
            FieldNode::Leaf { constraints, .. } => Some(constraints),
            _ => None,
        }
    }
}

/// Root of a field tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CollectionSchema {
    pub slug: String,
    pub fields: Vec<FieldNode>,
}

/// Dotted path of a field inside a document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct FieldPath(Vec<String>);

impl FieldPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Segments with array row indices removed. Schema addressing never
    /// encodes rows, so `layout.0.body` and `layout.3.body` share `layout.body`.
    pub fn schema_path(&self) -> Vec<String> {
        self.0
            .iter()
            .filter(|segment| segment.parse::<usize>().is_err())
            .cloned()
            .collect()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

impl FromStr for FieldPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let segments: Vec<String> = s.split('.').map(|seg| seg.trim().to_string()).collect();
        if segments.iter().any(|seg| seg.is_empty()) {
            return Err(format!("invalid field path '{}'", s));
        }
        Ok(Self(segments))
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl TryFrom<String> for FieldPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// Composite identifier scoping history and generation state: one field of one document
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldKey {
    pub document_id: String,
    pub field_path: FieldPath,
}

impl FieldKey {
    pub fn new(document_id: impl Into<String>, field_path: FieldPath) -> Self {
        Self {
            document_id: document_id.into(),
            field_path,
        }
    }

    /// Parse `field_path` from its dotted form
    pub fn parse(document_id: impl Into<String>, field_path: &str) -> Result<Self, String> {
        Ok(Self::new(document_id, field_path.parse()?))
    }

    /// Key under which the history of this field is persisted
    pub fn storage_key(&self) -> String {
        format!("{}.{}", self.document_id, self.field_path)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.storage_key())
    }
}
