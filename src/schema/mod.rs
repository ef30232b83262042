//! Schema compilation and validation for rich text fields
//!
//! - `compiler` - enabled-kind set → closed-world JSON Schema
//! - `cache` - shared memo of compiled schemas
//! - `validator` - checks values against a compiled schema

pub mod cache;
pub mod compiler;
pub mod validator;

pub use cache::SchemaCache;
pub use compiler::{cache_key, compile, expand_kinds, CompiledSchema, ROOT_DEFINITION};
pub use validator::{validate, validate_document, SchemaViolation};
