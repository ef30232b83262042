//! Typed document tree

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::registry::{describe, NodeKind, StructuralRole};

/// Bits of `DocumentNode::Text::style`
pub mod text_style {
    pub const BOLD: u32 = 1;
    pub const ITALIC: u32 = 1 << 1;
    pub const STRIKETHROUGH: u32 = 1 << 2;
    pub const UNDERLINE: u32 = 1 << 3;
    pub const CODE: u32 = 1 << 4;
    pub const SUBSCRIPT: u32 = 1 << 5;
    pub const SUPERSCRIPT: u32 = 1 << 6;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListKind {
    Bullet,
    Ordered,
    Checklist,
}

/// One node of a rich document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DocumentNode {
    Root {
        children: Vec<DocumentNode>,
    },
    Paragraph {
        children: Vec<DocumentNode>,
    },
    Heading {
        level: u8,
        children: Vec<DocumentNode>,
    },
    Quote {
        children: Vec<DocumentNode>,
    },
    Code {
        #[serde(default)]
        language: String,
        children: Vec<DocumentNode>,
    },
    List {
        #[serde(rename = "listKind")]
        list_kind: ListKind,
        children: Vec<DocumentNode>,
    },
    #[serde(rename = "listitem")]
    ListItem {
        #[serde(default)]
        checked: bool,
        children: Vec<DocumentNode>,
    },
    #[serde(rename = "horizontalrule")]
    HorizontalRule,
    Link {
        url: String,
        children: Vec<DocumentNode>,
    },
    Text {
        content: String,
        #[serde(default)]
        style: u32,
    },
    #[serde(rename = "linebreak")]
    LineBreak,
    Tab,
}

/// The value stored in a rich text field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RichTextValue {
    pub root: DocumentNode,
}

/// A broken structural invariant, located by a `/`-separated path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructureViolation {
    pub path: String,
    pub message: String,
}

impl DocumentNode {
    pub fn kind(&self) -> NodeKind {
        match self {
            DocumentNode::Root { .. } => NodeKind::Root,
            DocumentNode::Paragraph { .. } => NodeKind::Paragraph,
            DocumentNode::Heading { .. } => NodeKind::Heading,
            DocumentNode::Quote { .. } => NodeKind::Quote,
            DocumentNode::Code { .. } => NodeKind::Code,
            DocumentNode::List { .. } => NodeKind::List,
            DocumentNode::ListItem { .. } => NodeKind::ListItem,
            DocumentNode::HorizontalRule => NodeKind::HorizontalRule,
            DocumentNode::Link { .. } => NodeKind::Link,
            DocumentNode::Text { .. } => NodeKind::Text,
            DocumentNode::LineBreak => NodeKind::LineBreak,
            DocumentNode::Tab => NodeKind::Tab,
        }
    }

    /// Children of a container node; leaves have none
    pub fn children(&self) -> Option<&[DocumentNode]> {
        match self {
            DocumentNode::Root { children }
            | DocumentNode::Paragraph { children }
            | DocumentNode::Heading { children, .. }
            | DocumentNode::Quote { children }
            | DocumentNode::Code { children, .. }
            | DocumentNode::List { children, .. }
            | DocumentNode::ListItem { children, .. }
            | DocumentNode::Link { children, .. } => Some(children),
            DocumentNode::HorizontalRule
            | DocumentNode::Text { .. }
            | DocumentNode::LineBreak
            | DocumentNode::Tab => None,
        }
    }

    /// Concatenated text content of this subtree
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            DocumentNode::Text { content, .. } => out.push_str(content),
            DocumentNode::LineBreak => out.push('\n'),
            DocumentNode::Tab => out.push('\t'),
            _ => {
                if let Some(children) = self.children() {
                    for child in children {
                        child.collect_text(out);
                    }
                }
            }
        }
    }

    /// Check the structural invariants of this subtree against an enabled-kind set.
    ///
    /// Root, list and list item only hold block kinds; paragraph, heading,
    /// quote, code and link only hold inline kinds; every kind must be enabled.
    pub fn check_structure(&self, enabled: &BTreeSet<NodeKind>) -> Vec<StructureViolation> {
        let mut violations = Vec::new();
        self.check_at("", enabled, &mut violations);
        violations
    }

    fn check_at(&self, path: &str, enabled: &BTreeSet<NodeKind>, out: &mut Vec<StructureViolation>) {
        let kind = self.kind();
        if !enabled.contains(&kind) {
            out.push(StructureViolation {
                path: path.to_string(),
                message: format!("node kind '{}' is not enabled", kind),
            });
        }

        if let DocumentNode::Heading { level, .. } = self {
            if !(1..=6).contains(level) {
                out.push(StructureViolation {
                    path: format!("{}/level", path),
                    message: format!("heading level {} is outside 1..=6", level),
                });
            }
        }

        let Some(children) = self.children() else {
            return;
        };
        let expected = match kind {
            NodeKind::Root | NodeKind::List | NodeKind::ListItem => StructuralRole::Block,
            _ => StructuralRole::Inline,
        };

        for (idx, child) in children.iter().enumerate() {
            let child_path = format!("{}/children/{}", path, idx);
            let role = describe(child.kind()).role;
            if role != expected {
                out.push(StructureViolation {
                    path: child_path.clone(),
                    message: format!(
                        "'{}' cannot be a child of '{}' (expected a {:?} node)",
                        child.kind(),
                        kind,
                        expected
                    ),
                });
            }
            child.check_at(&child_path, enabled, out);
        }
    }
}
