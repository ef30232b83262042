//! Streaming generation into document fields
//!
//! - `transport` - the provider-neutral chunk stream and the `Transport` seam
//! - `parse` - partial and final parsing of streamed output
//! - `session` - requests, modes, states and handles
//! - `view` - the document view generated values are applied to
//! - `orchestrator` - the per-field state machine tying it together
//! - `scripted` - a transport replaying prepared scripts

pub mod error;
pub mod orchestrator;
pub mod parse;
pub mod scripted;
pub mod session;
pub mod transport;
pub mod view;

pub use error::{GenerationError, GenerationResult, TransportError, TransportResult};
pub use orchestrator::Orchestrator;
pub use parse::{parse_final, parse_partial, repair_json, ParseFailure};
pub use scripted::{Script, ScriptedTransport};
pub use session::{
    Action, GenerationEvent, GenerationMode, GenerationRequest, SessionHandle, SessionSnapshot, SessionState,
};
pub use transport::{
    AssetRef, FinishReason, GenerationStream, GenerationStreamSender, PromptContext, StreamChunk, Transport,
    TransportRequest,
};
pub use view::{DocumentView, InMemoryDocumentView};
