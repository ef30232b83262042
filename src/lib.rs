//! # Scribe - streaming generation for structured content fields
//!
//! Scribe sits between a content editor and an LLM transport. It compiles a
//! rich text JSON Schema for whatever node kinds a field enables, resolves
//! dotted field paths against a collection's field tree, streams generated
//! output into the document with live previews, and keeps a bounded
//! per-field undo/redo history.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scribe::fields::FieldKey;
//! use scribe::generation::{
//!     Action, GenerationRequest, InMemoryDocumentView, Orchestrator, ScriptedTransport,
//! };
//! use scribe::config::Settings;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::new()?;
//!     let history = scribe::history::create_store(&settings.history)?;
//!
//!     let orchestrator = Orchestrator::from_settings(
//!         &settings.generation,
//!         settings.prompt_templates(),
//!         Arc::new(ScriptedTransport::new()),
//!         Arc::new(settings.field_registry()),
//!         Arc::new(InMemoryDocumentView::new()),
//!         history,
//!     );
//!
//!     let key = FieldKey::parse("doc-1", "articleBody.content").map_err(anyhow::Error::msg)?;
//!     let mut session = orchestrator
//!         .start(GenerationRequest::new("posts", key, Action::Compose))
//!         .await?;
//!     let outcome = session.wait().await;
//!     println!("{:?}", outcome.state);
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - **document**: rich text node kinds and the document model
//! - **schema**: schema compilation, caching and validation
//! - **fields**: collection field trees, path resolution and lookup
//! - **generation**: transport seam, streaming sessions and the orchestrator
//! - **history**: bounded undo/redo logs with debounced persistence
//! - **config**: settings, external config files and validation

pub mod cli;
pub mod config;
pub mod document;
pub mod fields;
pub mod generation;
pub mod history;
pub mod schema;
