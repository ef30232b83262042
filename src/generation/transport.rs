//! Transport seam and streaming types
//!
//! A transport normalises every provider into one chunk shape; the
//! orchestrator never sees provider wire formats.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

use super::error::{TransportError, TransportResult};
use super::session::{Action, GenerationMode};
use crate::fields::FieldKey;

/// Everything a transport needs to build a prompt
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    /// Stored prompt template reference; substitution happens in the transport
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    /// Free-form instructions from the author
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Current document data
    pub document: Value,
    /// Schema the output must satisfy, for structured output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_schema: Option<Value>,
}

/// Request handed to the transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportRequest {
    pub action: Action,
    pub field_key: FieldKey,
    pub mode: GenerationMode,
    pub prompt_context: PromptContext,
}

/// Reason a stream finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Error,
}

/// A chunk of streamed output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamChunk {
    /// Text appended to the accumulated buffer
    #[serde(default)]
    pub delta: String,
    /// Structured snapshot replacing the accumulated value
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partial: Option<Value>,
    /// Set on the final chunk
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    /// Complete value, when the transport has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_value: Option<Value>,
    /// Provider message accompanying `FinishReason::Error`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StreamChunk {
    /// Create a text delta chunk
    pub fn text(delta: impl Into<String>) -> Self {
        Self {
            delta: delta.into(),
            ..Default::default()
        }
    }

    /// Create a structured snapshot chunk
    pub fn partial(value: Value) -> Self {
        Self {
            partial: Some(value),
            ..Default::default()
        }
    }

    /// Create a successful finish chunk
    pub fn finish(final_value: Option<Value>) -> Self {
        Self {
            finish_reason: Some(FinishReason::Stop),
            final_value,
            ..Default::default()
        }
    }

    /// Create a failed finish chunk
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            finish_reason: Some(FinishReason::Error),
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

/// Reference to an uploaded or generated asset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRef {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Stream of chunks from a transport
pub struct GenerationStream {
    receiver: mpsc::Receiver<TransportResult<StreamChunk>>,
}

impl GenerationStream {
    pub fn new(receiver: mpsc::Receiver<TransportResult<StreamChunk>>) -> Self {
        Self { receiver }
    }

    /// Create a channel pair for building a stream
    pub fn channel(buffer: usize) -> (GenerationStreamSender, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (GenerationStreamSender { sender: tx }, Self { receiver: rx })
    }
}

impl Stream for GenerationStream {
    type Item = TransportResult<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}

type SendResult = Result<(), mpsc::error::SendError<TransportResult<StreamChunk>>>;

/// Sender half used by transports. Dropping the `GenerationStream` closes
/// the channel, which is how a cancelled session aborts its transport.
#[derive(Clone)]
pub struct GenerationStreamSender {
    sender: mpsc::Sender<TransportResult<StreamChunk>>,
}

impl GenerationStreamSender {
    pub async fn send(&self, chunk: StreamChunk) -> SendResult {
        self.sender.send(Ok(chunk)).await
    }

    pub async fn send_error(&self, error: TransportError) -> SendResult {
        self.sender.send(Err(error)).await
    }

    /// Resolve once the consumer has gone away
    pub async fn closed(&self) {
        self.sender.closed().await
    }
}

/// Uniform generation transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a streaming generation
    fn open_stream(&self, request: TransportRequest) -> GenerationStream;

    /// One atomic request/response producing an asset
    async fn upload(&self, request: TransportRequest) -> TransportResult<AssetRef>;
}
