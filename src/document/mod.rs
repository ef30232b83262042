//! Rich document model
//!
//! - `node` - the typed document tree (`DocumentNode`) and its structural checks
//! - `registry` - static table describing every node kind: its role, its
//!   schema fragment and the kinds it depends on

pub mod node;
pub mod registry;

pub use node::*;
pub use registry::{describe, NodeDescriptor, NodeKind, StructuralRole};
