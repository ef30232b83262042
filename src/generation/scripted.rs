//! Transport that replays prepared chunk scripts.
//!
//! Each `open_stream` call consumes the next `Script` queued for its field
//! key, falling back to the shared queue; each `upload` consumes the next
//! queued upload result. Requests are recorded so callers
//! can inspect the prompt context they produced.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

use super::error::{TransportError, TransportResult};
use super::transport::{AssetRef, GenerationStream, StreamChunk, Transport, TransportRequest};
use crate::fields::FieldKey;

/// Chunks to replay for one stream
#[derive(Debug, Clone, Default)]
pub struct Script {
    items: Vec<TransportResult<StreamChunk>>,
    delay: Duration,
    hold_open: bool,
}

impl Script {
    pub fn new(chunks: impl IntoIterator<Item = StreamChunk>) -> Self {
        Self {
            items: chunks.into_iter().map(Ok).collect(),
            ..Default::default()
        }
    }

    /// Append a transport error after the chunks
    pub fn then_error(mut self, error: TransportError) -> Self {
        self.items.push(Err(error));
        self
    }

    /// Wait this long before every item
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Keep the stream open after the last item until the consumer leaves
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }
}

#[derive(Default)]
struct ScriptedState {
    scripts: VecDeque<Script>,
    keyed: HashMap<String, VecDeque<Script>>,
    uploads: VecDeque<TransportResult<AssetRef>>,
    requests: Vec<TransportRequest>,
}

/// Replaying transport
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptedState>>,
    aborted: Arc<AtomicUsize>,
    buffer: usize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self {
            buffer: 64,
            ..Default::default()
        }
    }

    pub fn push_script(&self, script: Script) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.scripts.push_back(script);
        }
        self
    }

    /// Queue a script for streams opened on `key` only
    pub fn push_script_for(&self, key: &FieldKey, script: Script) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.keyed.entry(key.storage_key()).or_default().push_back(script);
        }
        self
    }

    pub fn push_upload(&self, result: TransportResult<AssetRef>) -> &Self {
        if let Ok(mut state) = self.state.lock() {
            state.uploads.push_back(result);
        }
        self
    }

    /// Requests received so far, in order
    pub fn requests(&self) -> Vec<TransportRequest> {
        self.state.lock().map(|s| s.requests.clone()).unwrap_or_default()
    }

    /// Streams whose consumer went away before the script finished
    pub fn aborted_streams(&self) -> usize {
        self.aborted.load(Ordering::SeqCst)
    }

    fn record(&self, request: TransportRequest) {
        if let Ok(mut state) = self.state.lock() {
            state.requests.push(request);
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn open_stream(&self, request: TransportRequest) -> GenerationStream {
        let script = self
            .state
            .lock()
            .ok()
            .and_then(|mut s| {
                let keyed = s
                    .keyed
                    .get_mut(&request.field_key.storage_key())
                    .and_then(VecDeque::pop_front);
                keyed.or_else(|| s.scripts.pop_front())
            })
            .unwrap_or_else(|| Script::new([StreamChunk::finish(None)]));
        debug!(field_key = %request.field_key, items = script.items.len(), "Replaying script");
        self.record(request);

        let (sender, stream) = GenerationStream::channel(self.buffer.max(1));
        let aborted = self.aborted.clone();

        tokio::spawn(async move {
            for item in script.items {
                if !script.delay.is_zero() {
                    tokio::time::sleep(script.delay).await;
                }
                let sent = match item {
                    Ok(chunk) => sender.send(chunk).await,
                    Err(error) => sender.send_error(error).await,
                };
                if sent.is_err() {
                    aborted.fetch_add(1, Ordering::SeqCst);
                    return;
                }
            }

            if script.hold_open {
                sender.closed().await;
                aborted.fetch_add(1, Ordering::SeqCst);
            }
        });

        stream
    }

    async fn upload(&self, request: TransportRequest) -> TransportResult<AssetRef> {
        self.record(request);
        self.state
            .lock()
            .ok()
            .and_then(|mut s| s.uploads.pop_front())
            .unwrap_or_else(|| Err(TransportError::Provider("no upload scripted".to_string())))
    }
}
