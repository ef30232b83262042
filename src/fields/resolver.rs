//! Field path resolution
//!
//! Walks a collection's field tree along a dotted path:
//!
//! - `Leaf` matches when exactly one segment remains and equals its name
//! - `Group` / `Array` consume their own name; arrays descend into the item
//!   template regardless of row count
//! - `Tabs` consume nothing (a tab's own label or name may optionally appear)
//! - `BlockUnion` consumes one segment that must equal a variant tag; the
//!   union's own name may optionally come first
//!
//! A miss is `None`, never an error.

use super::{BlockVariant, CollectionSchema, FieldNode};

/// Resolve a full schema path whose first segment names the collection
pub fn resolve<'a, S: AsRef<str>>(collection: &'a CollectionSchema, path: &[S]) -> Option<&'a FieldNode> {
    let (first, rest) = path.split_first()?;
    if first.as_ref() != collection.slug {
        return None;
    }
    resolve_in(&collection.fields, rest)
}

/// Resolve a path relative to a list of sibling fields; the first match wins
pub fn resolve_in<'a, S: AsRef<str>>(fields: &'a [FieldNode], path: &[S]) -> Option<&'a FieldNode> {
    if path.is_empty() {
        return None;
    }
    fields.iter().find_map(|field| resolve_node(field, path))
}

fn resolve_node<'a, S: AsRef<str>>(node: &'a FieldNode, path: &[S]) -> Option<&'a FieldNode> {
    match node {
        FieldNode::Leaf { name, .. } => match path {
            [only] if only.as_ref() == name => Some(node),
            _ => None,
        },
        FieldNode::Group { name, children } => {
            let rest = consume(path, name)?;
            resolve_in(children, rest)
        }
        FieldNode::Array { name, item, .. } => {
            let rest = consume(path, name)?;
            resolve_in(item, rest)
        }
        FieldNode::Tabs { tabs } => tabs.iter().find_map(|tab| {
            resolve_in(&tab.children, path).or_else(|| {
                let (head, rest) = path.split_first()?;
                let head = head.as_ref();
                let names_tab = head == tab.label || tab.name.as_deref() == Some(head);
                if names_tab {
                    resolve_in(&tab.children, rest)
                } else {
                    None
                }
            })
        }),
        FieldNode::BlockUnion { name, variants } => resolve_variant(variants, path).or_else(|| {
            let rest = consume(path, name.as_deref()?)?;
            resolve_variant(variants, rest)
        }),
    }
}

fn resolve_variant<'a, S: AsRef<str>>(variants: &'a [BlockVariant], path: &[S]) -> Option<&'a FieldNode> {
    let (tag, rest) = path.split_first()?;
    variants
        .iter()
        .filter(|variant| variant.tag == tag.as_ref())
        .find_map(|variant| resolve_in(&variant.children, rest))
}

fn consume<'p, S: AsRef<str>>(path: &'p [S], name: &str) -> Option<&'p [S]> {
    match path.split_first() {
        Some((head, rest)) if head.as_ref() == name => Some(rest),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::{FieldType, Tab};

    fn posts() -> CollectionSchema {
        CollectionSchema {
            slug: "posts".to_string(),
            fields: vec![
                FieldNode::leaf("title", FieldType::Text),
                FieldNode::group(
                    "articleBody",
                    vec![FieldNode::rich_text("content", &["heading", "list"])],
                ),
                FieldNode::array("gallery", vec![FieldNode::leaf("image", FieldType::Upload)]),
                FieldNode::Tabs {
                    tabs: vec![
                        Tab {
                            label: "SEO".to_string(),
                            name: Some("meta".to_string()),
                            children: vec![FieldNode::leaf("description", FieldType::Textarea)],
                        },
                        Tab {
                            label: "Layout".to_string(),
                            name: None,
                            children: vec![FieldNode::BlockUnion {
                                name: Some("layout".to_string()),
                                variants: vec![
                                    BlockVariant {
                                        tag: "hero".to_string(),
                                        children: vec![FieldNode::leaf("headline", FieldType::Text)],
                                    },
                                    BlockVariant {
                                        tag: "quote".to_string(),
                                        children: vec![FieldNode::rich_text("body", &[])],
                                    },
                                ],
                            }],
                        },
                    ],
                },
            ],
        }
    }

    fn name_of(node: Option<&FieldNode>) -> Option<&str> {
        node.and_then(|n| n.name())
    }

    #[test]
    fn test_resolve_group_leaf() {
        let tree = posts();
        let found = resolve(&tree, &["posts", "articleBody", "content"]);
        assert_eq!(name_of(found), Some("content"));
        assert_eq!(found.and_then(|f| f.field_type()), Some(FieldType::RichText));
    }

    #[test]
    fn test_resolve_top_level_leaf() {
        let tree = posts();
        assert_eq!(name_of(resolve(&tree, &["posts", "title"])), Some("title"));
    }

    #[test]
    fn test_wrong_collection_misses() {
        let tree = posts();
        assert!(resolve(&tree, &["pages", "title"]).is_none());
        assert!(resolve::<&str>(&tree, &[]).is_none());
    }

    #[test]
    fn test_array_descends_into_template() {
        let tree = posts();
        assert_eq!(name_of(resolve(&tree, &["posts", "gallery", "image"])), Some("image"));
    }

    #[test]
    fn test_tabs_are_transparent() {
        let tree = posts();
        let without = resolve(&tree, &["posts", "description"]);
        let with_name = resolve(&tree, &["posts", "meta", "description"]);
        let with_label = resolve(&tree, &["posts", "SEO", "description"]);

        assert_eq!(name_of(without), Some("description"));
        assert_eq!(without, with_name);
        assert_eq!(without, with_label);
    }

    #[test]
    fn test_block_union_consumes_variant_tag() {
        let tree = posts();
        let tag_only = resolve(&tree, &["posts", "hero", "headline"]);
        assert_eq!(name_of(tag_only), Some("headline"));
        assert_eq!(name_of(resolve(&tree, &["posts", "quote", "body"])), Some("body"));
        assert!(resolve(&tree, &["posts", "video", "headline"]).is_none());
        assert!(resolve(&tree, &["posts", "quote", "headline"]).is_none());

        // The union's name may precede the tag
        assert_eq!(resolve(&tree, &["posts", "layout", "hero", "headline"]), tag_only);
        assert!(resolve(&tree, &["posts", "layout", "video", "headline"]).is_none());
        assert!(resolve(&tree, &["posts", "layout", "headline"]).is_none());
    }

    #[test]
    fn test_unnamed_block_union() {
        let tree = CollectionSchema {
            slug: "pages".to_string(),
            fields: vec![FieldNode::BlockUnion {
                name: None,
                variants: vec![BlockVariant {
                    tag: "cta".to_string(),
                    children: vec![FieldNode::leaf("label", FieldType::Text)],
                }],
            }],
        };

        assert_eq!(name_of(resolve(&tree, &["pages", "cta", "label"])), Some("label"));
        assert!(resolve(&tree, &["pages", "label"]).is_none());
        assert!(tree.fields[0].name().is_none());
    }

    #[test]
    fn test_path_must_end_at_leaf() {
        let tree = posts();
        assert!(resolve(&tree, &["posts", "articleBody"]).is_none());
        assert!(resolve(&tree, &["posts", "title", "extra"]).is_none());
        assert!(resolve(&tree, &["posts", "articleBody", "missing"]).is_none());
    }
}
