//! Generation orchestrator
//!
//! Runs one state machine per field key:
//! `Idle -> Streaming -> {Committed | Cancelled | Failed} -> Idle`.
//!
//! Each session is a spawned task. It reads chunks from the transport,
//! previews every new valid value in the document view, and records only
//! the final value in history. A superseding `start` or an explicit `stop`
//! flips the session's cancel signal and waits for the task to reach a
//! terminal state, so a key never has two live sessions.
//!
//! Every key owns a slot with its own lock. The shared map is locked only
//! to look a slot up, so a slow start on one key never holds up another.
//! Cancelling and committing race through one `Phase` cell: whichever
//! claims it first wins, and a cancelled session never writes history.

use futures::StreamExt;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::error::{GenerationError, GenerationResult, TransportError};
use super::parse::{check_final, parse_final, parse_partial, ParseFailure};
use super::session::{
    GenerationEvent, GenerationMode, GenerationRequest, SessionHandle, SessionSnapshot, SessionState,
};
use super::transport::{AssetRef, FinishReason, PromptContext, Transport, TransportRequest};
use super::view::DocumentView;
use crate::config::GenerationSettings;
use crate::fields::{FieldKey, FieldRegistry, FieldType};
use crate::history::HistoryStore;
use crate::schema::{CompiledSchema, SchemaCache};

/// Who owns the end of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Live,
    Cancelled,
    Committing,
}

/// Move `Live` to `to`; false if the other side got there first
fn claim(phase: &watch::Sender<Phase>, to: Phase) -> bool {
    phase.send_if_modified(|current| {
        if *current == Phase::Live {
            *current = to;
            true
        } else {
            false
        }
    })
}

struct ActiveSession {
    id: Uuid,
    phase: Arc<watch::Sender<Phase>>,
    state: watch::Receiver<SessionSnapshot>,
    task: JoinHandle<()>,
}

impl ActiveSession {
    fn state(&self) -> SessionState {
        self.state.borrow().state
    }

    /// Signal cancellation if still live, then wait for the task to settle
    async fn shut_down(self) -> SessionState {
        if !self.state().is_terminal() && claim(&self.phase, Phase::Cancelled) {
            debug!(session_id = %self.id, "Cancelling session");
        }

        let state = self.state.clone();
        if let Err(e) = self.task.await {
            warn!(session_id = %self.id, error = %e, "Session task ended abnormally");
        }
        let settled = state.borrow().state;
        settled
    }
}

type Slot = Arc<Mutex<Option<ActiveSession>>>;

/// Drives generation sessions for every field key
pub struct Orchestrator {
    transport: Arc<dyn Transport>,
    fields: Arc<dyn FieldRegistry>,
    view: Arc<dyn DocumentView>,
    history: HistoryStore,
    schemas: SchemaCache,
    default_kinds: Vec<String>,
    prompt_templates: HashMap<String, String>,
    events: broadcast::Sender<GenerationEvent>,
    sessions: Mutex<HashMap<FieldKey, Slot>>,
}

impl Orchestrator {
    pub fn new(
        transport: Arc<dyn Transport>,
        fields: Arc<dyn FieldRegistry>,
        view: Arc<dyn DocumentView>,
        history: HistoryStore,
    ) -> Self {
        Self::from_settings(&GenerationSettings::default(), HashMap::new(), transport, fields, view, history)
    }

    /// Create an orchestrator using configured defaults and prompt templates
    pub fn from_settings(
        settings: &GenerationSettings,
        prompt_templates: HashMap<String, String>,
        transport: Arc<dyn Transport>,
        fields: Arc<dyn FieldRegistry>,
        view: Arc<dyn DocumentView>,
        history: HistoryStore,
    ) -> Self {
        let (events, _) = broadcast::channel(settings.stream_buffer.max(1));

        Self {
            transport,
            fields,
            view,
            history,
            schemas: SchemaCache::new(),
            default_kinds: settings.default_kinds.clone(),
            prompt_templates,
            events,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn schemas(&self) -> &SchemaCache {
        &self.schemas
    }

    /// Progress events for every session
    pub fn subscribe(&self) -> broadcast::Receiver<GenerationEvent> {
        self.events.subscribe()
    }

    /// Slot for `key`, created on first use. Idle slots nobody else holds are
    /// dropped on the way so the map only tracks keys in use.
    async fn slot(&self, key: &FieldKey) -> Slot {
        let mut sessions = self.sessions.lock().await;
        sessions.retain(|k, slot| k == key || Arc::strong_count(slot) > 1 || !is_idle(slot));
        sessions.entry(key.clone()).or_default().clone()
    }

    async fn existing_slot(&self, key: &FieldKey) -> Option<Slot> {
        self.sessions.lock().await.get(key).cloned()
    }

    /// Start a session, cancelling any live session for the same key first
    pub async fn start(&self, request: GenerationRequest) -> GenerationResult<SessionHandle> {
        let slot = self.slot(&request.key).await;
        let mut active = slot.lock().await;

        if let Some(previous) = active.take() {
            let state = previous.shut_down().await;
            debug!(field_key = %request.key, state = ?state, "Previous session settled");
        }

        let (mode, schema) = self.plan(&request).await?;

        if let Err(e) = self.history.load(&request.key).await {
            warn!(field_key = %request.key, error = %e, "Could not resume history");
        }

        let original = self.view.current_value(&request.key).await;
        let transport_request = TransportRequest {
            action: request.action,
            field_key: request.key.clone(),
            mode,
            prompt_context: PromptContext {
                template: request
                    .prompt_template
                    .clone()
                    .or_else(|| self.template_for(&request)),
                instructions: request.instructions.clone(),
                document: self.view.document_data(&request.key.document_id).await,
                output_schema: schema.as_ref().map(|s| s.document.clone()),
            },
        };

        let id = Uuid::new_v4();
        let phase = Arc::new(watch::channel(Phase::Live).0);
        let (state_tx, state_rx) = watch::channel(SessionSnapshot::streaming());

        let run = SessionRun {
            id,
            key: request.key.clone(),
            mode,
            schema,
            original,
            transport: self.transport.clone(),
            view: self.view.clone(),
            history: self.history.clone(),
            events: self.events.clone(),
            phase: phase.clone(),
            state: state_tx,
        };

        info!(field_key = %request.key, session_id = %id, mode = %mode, action = %request.action, "Generation started");
        let _ = self.events.send(GenerationEvent::Started {
            key: request.key.clone(),
            session_id: id,
            mode,
        });

        let task = tokio::spawn(run.drive(transport_request));

        *active = Some(ActiveSession {
            id,
            phase,
            state: state_rx.clone(),
            task,
        });

        Ok(SessionHandle {
            id,
            key: request.key,
            mode,
            state: state_rx,
        })
    }

    /// Cancel the live session for `key`. Returns true only if the session
    /// ended `Cancelled`; one already committing finishes its commit.
    pub async fn stop(&self, key: &FieldKey) -> bool {
        let Some(slot) = self.existing_slot(key).await else {
            return false;
        };

        let mut active = slot.lock().await;
        match active.take() {
            Some(session) if !session.state().is_terminal() => session.shut_down().await == SessionState::Cancelled,
            _ => false,
        }
    }

    /// Current state for `key`; `Idle` once the last session has settled
    pub async fn state(&self, key: &FieldKey) -> SessionState {
        let Some(slot) = self.existing_slot(key).await else {
            return SessionState::Idle;
        };

        let active = slot.lock().await;
        match active.as_ref().map(ActiveSession::state) {
            Some(SessionState::Streaming) => SessionState::Streaming,
            _ => SessionState::Idle,
        }
    }

    /// Stop any session for `key` and drop its cached history, writing a
    /// pending change first
    pub async fn close(&self, key: &FieldKey) -> GenerationResult<()> {
        self.stop(key).await;
        {
            let mut sessions = self.sessions.lock().await;
            if sessions.get(key).is_some_and(|slot| Arc::strong_count(slot) == 1 && is_idle(slot)) {
                sessions.remove(key);
            }
        }
        self.history.release(key).await?;
        Ok(())
    }

    /// Keys with a session slot
    pub async fn tracked(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Upload an asset into `request.key` and wait for the outcome.
    /// `Ok(None)` means the upload was cancelled.
    pub async fn upload(&self, request: GenerationRequest) -> GenerationResult<Option<AssetRef>> {
        let mut handle = self.start(request.with_mode(GenerationMode::AssetUpload)).await?;
        let snapshot = handle.wait().await;

        match snapshot.state {
            SessionState::Committed => {
                let value = snapshot.last_valid.unwrap_or(Value::Null);
                serde_json::from_value(value)
                    .map(Some)
                    .map_err(|e| GenerationError::Malformed(e.to_string()))
            }
            SessionState::Failed => Err(snapshot
                .error
                .unwrap_or_else(|| GenerationError::Transport(TransportError::Streaming("upload failed".to_string())))),
            _ => Ok(None),
        }
    }

    /// Step back in history and show the restored value
    pub async fn undo(&self, key: &FieldKey) -> GenerationResult<Option<Value>> {
        self.stop(key).await;
        let value = self.history.undo(key).await?;
        if let Some(value) = &value {
            self.view.apply_value(key, value.clone()).await;
        }
        Ok(value)
    }

    /// Step forward in history and show the restored value
    pub async fn redo(&self, key: &FieldKey) -> GenerationResult<Option<Value>> {
        self.stop(key).await;
        let value = self.history.redo(key).await?;
        if let Some(value) = &value {
            self.view.apply_value(key, value.clone()).await;
        }
        Ok(value)
    }

    /// Load persisted history for `key` and show its current entry
    pub async fn resume(&self, key: &FieldKey) -> GenerationResult<Option<Value>> {
        let value = self.history.load(key).await?;
        if let Some(value) = &value {
            if self.view.current_value(key).await.as_ref() != Some(value) {
                self.view.apply_value(key, value.clone()).await;
            }
        }
        Ok(value)
    }

    /// Resolve the field and decide mode and schema
    async fn plan(&self, request: &GenerationRequest) -> GenerationResult<(GenerationMode, Option<Arc<CompiledSchema>>)> {
        let field = self.fields.lookup_field(&request.collection, &request.key.field_path);
        if field.is_none() {
            debug!(
                collection = %request.collection,
                field_path = %request.key.field_path,
                "Field not in registry, generating without field constraints"
            );
        }

        let mode = request
            .mode
            .or_else(|| field.as_ref().map(GenerationMode::for_field))
            .unwrap_or(GenerationMode::Text);

        let unsupported = || GenerationError::UnsupportedField {
            path: request.key.field_path.to_string(),
            mode: mode.to_string(),
        };

        match mode {
            GenerationMode::Text => Ok((mode, None)),
            GenerationMode::StructuredObject => {
                let kinds = match &field {
                    Some(field) if field.field_type() != Some(FieldType::RichText) => return Err(unsupported()),
                    Some(field) => field
                        .constraints()
                        .and_then(|c| c.enabled_kinds.clone())
                        .unwrap_or_else(|| self.default_kinds.clone()),
                    None => self.default_kinds.clone(),
                };
                Ok((mode, Some(self.schemas.get_or_compile(&kinds).await)))
            }
            GenerationMode::AssetUpload => match &field {
                Some(field) if field.field_type() == Some(FieldType::Upload) => Ok((mode, None)),
                Some(_) => Err(unsupported()),
                None => Err(GenerationError::FieldNotFound {
                    collection: request.collection.clone(),
                    path: request.key.field_path.to_string(),
                }),
            },
        }
    }

    fn template_for(&self, request: &GenerationRequest) -> Option<String> {
        let mut path = vec![request.collection.clone()];
        path.extend(request.key.field_path.schema_path());
        self.prompt_templates.get(&path.join(".")).cloned()
    }
}

/// True when nobody is using the slot and it holds no live session
fn is_idle(slot: &Slot) -> bool {
    match slot.try_lock() {
        Ok(active) => active.as_ref().map_or(true, |session| session.state().is_terminal()),
        Err(_) => false,
    }
}

/// Why a session stopped before committing
enum Interrupt {
    Cancelled,
    Failed(GenerationError),
}

/// State owned by one spawned session task
struct SessionRun {
    id: Uuid,
    key: FieldKey,
    mode: GenerationMode,
    schema: Option<Arc<CompiledSchema>>,
    /// What the view showed when the session started
    original: Option<Value>,
    transport: Arc<dyn Transport>,
    view: Arc<dyn DocumentView>,
    history: HistoryStore,
    events: broadcast::Sender<GenerationEvent>,
    phase: Arc<watch::Sender<Phase>>,
    state: watch::Sender<SessionSnapshot>,
}

impl SessionRun {
    async fn drive(self, request: TransportRequest) {
        let mut cancel = self.phase.subscribe();
        let mut previewed = false;
        let outcome = match self.mode {
            GenerationMode::AssetUpload => self.run_upload(request, &mut cancel).await,
            _ => self.run_stream(request, &mut cancel, &mut previewed).await,
        };

        match outcome {
            Ok(value) => self.commit(value, &mut cancel).await,
            Err(Interrupt::Cancelled) => self.on_cancelled(),
            Err(Interrupt::Failed(error)) => self.on_failed(error, previewed).await,
        }
    }

    async fn run_stream(
        &self,
        request: TransportRequest,
        cancel: &mut watch::Receiver<Phase>,
        previewed: &mut bool,
    ) -> Result<Value, Interrupt> {
        let mut stream = self.transport.open_stream(request);
        let mut buffer = String::new();
        let mut latest: Option<Value> = None;
        let mut last_valid: Option<Value> = None;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancelled(cancel) => return Err(Interrupt::Cancelled),
                item = stream.next() => item,
            };

            let chunk = match next {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => return Err(Interrupt::Failed(e.into())),
                None => return self.finalize(&buffer, latest, None),
            };

            buffer.push_str(&chunk.delta);
            if let Some(partial) = chunk.partial {
                latest = Some(partial);
            }

            match chunk.finish_reason {
                Some(FinishReason::Stop) => return self.finalize(&buffer, latest, chunk.final_value),
                Some(FinishReason::Error) => {
                    let message = chunk.error.unwrap_or_else(|| "generation failed".to_string());
                    return Err(Interrupt::Failed(TransportError::Provider(message).into()));
                }
                None => {}
            }

            let Some(value) = self.preview(&buffer, latest.as_ref()) else {
                continue;
            };
            if last_valid.as_ref() == Some(&value) {
                continue;
            }

            self.view.apply_value(&self.key, value.clone()).await;
            *previewed = true;
            self.state.send_modify(|s| s.last_valid = Some(value.clone()));
            last_valid = Some(value);
            let _ = self.events.send(GenerationEvent::Preview {
                key: self.key.clone(),
                session_id: self.id,
            });
        }
    }

    async fn run_upload(&self, request: TransportRequest, cancel: &mut watch::Receiver<Phase>) -> Result<Value, Interrupt> {
        let asset = tokio::select! {
            biased;
            _ = cancelled(cancel) => return Err(Interrupt::Cancelled),
            result = self.transport.upload(request) => result.map_err(|e| Interrupt::Failed(e.into()))?,
        };

        serde_json::to_value(asset).map_err(|e| Interrupt::Failed(GenerationError::Malformed(e.to_string())))
    }

    /// Value worth showing mid-stream, if any
    fn preview(&self, buffer: &str, latest: Option<&Value>) -> Option<Value> {
        match (&self.schema, latest) {
            (None, Some(Value::String(text))) => Some(Value::String(text.clone())),
            (None, _) if !buffer.is_empty() => Some(Value::String(buffer.to_string())),
            (None, _) => None,
            (Some(schema), Some(value)) => check_final(value.clone(), Some(&**schema)).ok(),
            (Some(schema), None) => parse_partial(buffer, Some(&**schema)).ok(),
        }
    }

    /// Final value once the transport reports success
    fn finalize(&self, buffer: &str, latest: Option<Value>, final_value: Option<Value>) -> Result<Value, Interrupt> {
        let result = match (&self.schema, final_value.or(latest)) {
            (None, Some(value)) => Ok(value),
            (None, None) => Ok(Value::String(buffer.to_string())),
            (Some(schema), Some(value)) => check_final(value, Some(&**schema)),
            (Some(schema), None) => parse_final(buffer, Some(&**schema)),
        };

        result.map_err(|failure| match failure {
            ParseFailure::Invalid(error) => Interrupt::Failed(error),
            ParseFailure::Incomplete => Interrupt::Failed(GenerationError::Malformed("output ended early".to_string())),
        })
    }

    async fn commit(&self, value: Value, cancel: &mut watch::Receiver<Phase>) {
        let shown = tokio::select! {
            biased;
            _ = cancelled(cancel) => false,
            _ = self.show(&value) => true,
        };

        // From here on a cancel request is refused.
        if !shown || !claim(&self.phase, Phase::Committing) {
            self.on_cancelled();
            return;
        }

        if let Err(e) = self.history.set(&self.key, value.clone()).await {
            warn!(field_key = %self.key, session_id = %self.id, error = %e, "History update failed");
            self.settle(SessionState::Failed, Some(value), Some(e.into()));
            return;
        }

        info!(field_key = %self.key, session_id = %self.id, "Generation committed");
        self.settle(SessionState::Committed, Some(value), None);
    }

    async fn show(&self, value: &Value) {
        if self.view.current_value(&self.key).await.as_ref() != Some(value) {
            self.view.apply_value(&self.key, value.clone()).await;
        }
    }

    fn on_cancelled(&self) {
        debug!(field_key = %self.key, session_id = %self.id, "Generation cancelled");
        let last_valid = self.state.borrow().last_valid.clone();
        self.settle(SessionState::Cancelled, last_valid, None);
    }

    async fn on_failed(&self, error: GenerationError, previewed: bool) {
        warn!(field_key = %self.key, session_id = %self.id, error = %error, "Generation failed");
        if previewed {
            self.view.restore_value(&self.key, self.original.clone()).await;
        }
        self.settle(SessionState::Failed, None, Some(error));
    }

    fn settle(&self, state: SessionState, last_valid: Option<Value>, error: Option<GenerationError>) {
        let key = self.key.clone();
        let session_id = self.id;
        let event = match (&state, &error) {
            (SessionState::Committed, _) => GenerationEvent::Committed { key, session_id },
            (SessionState::Cancelled, _) => GenerationEvent::Cancelled { key, session_id },
            (_, Some(error)) => GenerationEvent::Failed {
                key,
                session_id,
                error: error.clone(),
            },
            _ => GenerationEvent::Cancelled { key, session_id },
        };

        self.state.send_replace(SessionSnapshot {
            state,
            last_valid,
            error,
        });
        let _ = self.events.send(event);
    }
}

/// Resolve once cancellation is signalled; never resolves if the sender is gone
async fn cancelled(cancel: &mut watch::Receiver<Phase>) {
    loop {
        if *cancel.borrow_and_update() == Phase::Cancelled {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
