//! Task manager: blocking and streamed task execution.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt, stream};
use serde_json::Value;
use tracing::{Instrument, Span, debug, error, info, warn};

use super::store::{InMemoryTaskStore, TaskStore};
use super::types::{
    Artifact, JsonRpcError, JsonRpcResponse, Part, Task, TaskArtifactUpdateEvent, TaskMessage,
    TaskSendParams, TaskState, TaskStatus, TaskStatusUpdateEvent, TaskStreamEvent,
    TaskStreamResponse,
};
use super::{TaskError, TaskResult};
use crate::agent::{ConversationOrchestrator, FinalContent, HEARTBEAT_INTERVAL, StreamEvent};
use crate::observability::task_stream_span;

/// Output modes this agent can produce.
pub const SUPPORTED_CONTENT_TYPES: &[&str] = &["text", "text/plain"];

/// Sole message of the error response ending a failed stream.
pub const STREAM_ERROR_MESSAGE: &str = "An error occurred while streaming the response";

type EventStream = Pin<Box<dyn Stream<Item = crate::Result<StreamEvent>> + Send>>;

/// Runs tasks through a [`ConversationOrchestrator`] and records them in a
/// [`TaskStore`].
#[derive(Clone)]
pub struct TaskManager {
    orchestrator: Arc<ConversationOrchestrator>,
    store: Arc<dyn TaskStore>,
}

impl TaskManager {
    pub fn new(orchestrator: Arc<ConversationOrchestrator>) -> Self {
        Self {
            orchestrator,
            store: Arc::new(InMemoryTaskStore::new()),
        }
    }

    pub fn with_store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = store;
        self
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    /// Checks output modes and extracts the text query from the first part.
    pub fn validate(params: &TaskSendParams) -> TaskResult<String> {
        if let Some(modes) = &params.accepted_output_modes
            && !modes.is_empty()
            && !modes
                .iter()
                .any(|mode| SUPPORTED_CONTENT_TYPES.contains(&mode.as_str()))
        {
            warn!(
                task_id = %params.id,
                requested = ?modes,
                supported = ?SUPPORTED_CONTENT_TYPES,
                "Unsupported output mode"
            );
            return Err(TaskError::IncompatibleOutputModes {
                requested: modes.clone(),
            });
        }

        match params.message.parts.first() {
            Some(Part::Text { text }) => Ok(text.clone()),
            Some(_) => Err(TaskError::UnsupportedPart),
            None => Err(TaskError::EmptyMessage),
        }
    }

    /// Runs the task to completion and returns it, trimmed to the requested
    /// history length.
    pub async fn send_task(&self, params: TaskSendParams) -> crate::Result<Task> {
        let query = Self::validate(&params)?;
        let task = self.store.upsert(&params).await?;
        ensure_accepting(&task)?;
        self.store
            .update(&params.id, TaskStatus::new(TaskState::Working), None)
            .await?;

        let text = self.orchestrator.execute(&query).await?;

        let (state, parts) = resolve_final(&FinalContent::resolve(&text, text.clone()));
        let (status, artifacts) = match state {
            TaskState::InputRequired => (
                TaskStatus::new(state).with_message(TaskMessage::agent(vec![Part::text(&text)])),
                None,
            ),
            _ => (TaskStatus::new(state), Some(vec![Artifact::new(parts)])),
        };
        let task = self.store.update(&params.id, status, artifacts).await?;
        info!(task_id = %task.id, state = %task.status.state, "Task resolved");
        Ok(task.with_history_window(params.history_length))
    }

    /// Starts a streamed task.
    ///
    /// Validation and creation failures are returned directly, as is a
    /// message for an already completed task. Tool servers start on the
    /// first poll; heartbeat `WORKING` updates cover a slow start. Afterwards
    /// every outcome arrives on the stream: working status updates, text
    /// artifacts, then either one terminal status update (`final: true`) or
    /// a single internal-error response.
    pub async fn send_task_subscribe(
        &self,
        request_id: Value,
        params: TaskSendParams,
    ) -> crate::Result<impl Stream<Item = TaskStreamResponse> + Send + 'static> {
        let query = Self::validate(&params)?;
        let task = self.store.upsert(&params).await?;
        ensure_accepting(&task)?;

        let state = SubscribeState {
            span: task_stream_span(&task.id, &task.session_id),
            request_id,
            task_id: task.id,
            query,
            orchestrator: Arc::clone(&self.orchestrator),
            store: Arc::clone(&self.store),
            opening: None,
            events: None,
            streamed: String::new(),
            first_delta: true,
            pending: VecDeque::new(),
            done: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            let span = state.span.clone();
            let response = state.next_response().instrument(span).await;
            response.map(|response| (response, state))
        }))
    }

    pub async fn get_task(&self, id: &str, history_length: Option<usize>) -> crate::Result<Task> {
        Ok(self.store.get(id, history_length).await?)
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("orchestrator", &self.orchestrator)
            .field("store", &self.store.name())
            .finish()
    }
}

/// Refuses work on a task that can no longer move to `Working`.
fn ensure_accepting(task: &Task) -> TaskResult<()> {
    let from = task.status.state;
    if from.can_transition_to(TaskState::Working) {
        return Ok(());
    }
    warn!(task_id = %task.id, state = %from, "Task is closed to new messages");
    Err(TaskError::InvalidTransition {
        id: task.id.clone(),
        from,
        to: TaskState::Working,
    })
}

/// Terminal state and parts for a conversation's closing content.
///
/// A structured payload asks for more input when it carries
/// `response.result` (JSON-decoded when it is a string) or
/// `require_user_input: true`.
pub fn resolve_final(content: &FinalContent) -> (TaskState, Vec<Part>) {
    match content {
        FinalContent::Text(text) => (TaskState::Completed, vec![Part::text(text)]),
        FinalContent::Structured(payload) => {
            if let Some(result) = payload.get("response").and_then(|r| r.get("result")) {
                let data = match result {
                    Value::String(raw) => serde_json::from_str(raw).unwrap_or_else(|_| result.clone()),
                    other => other.clone(),
                };
                return (TaskState::InputRequired, vec![Part::data(data)]);
            }
            let state = match payload.get("require_user_input") {
                Some(Value::Bool(true)) => TaskState::InputRequired,
                _ => TaskState::Completed,
            };
            (state, vec![Part::data(payload.clone())])
        }
    }
}

struct SubscribeState {
    span: Span,
    request_id: Value,
    task_id: String,
    query: String,
    orchestrator: Arc<ConversationOrchestrator>,
    store: Arc<dyn TaskStore>,
    opening: Option<BoxFuture<'static, crate::Result<EventStream>>>,
    events: Option<EventStream>,
    streamed: String,
    first_delta: bool,
    pending: VecDeque<TaskStreamResponse>,
    done: bool,
}

impl SubscribeState {
    async fn next_response(&mut self) -> Option<TaskStreamResponse> {
        loop {
            if let Some(response) = self.pending.pop_front() {
                return Some(response);
            }
            if self.done {
                return None;
            }

            let next = match self.events.as_mut() {
                Some(events) => events.next().await,
                None => {
                    if let Err(e) = self.open().await {
                        return Some(self.fail(e));
                    }
                    continue;
                }
            };

            match next {
                Some(Ok(event)) => {
                    if let Err(e) = self.on_event(event).await {
                        return Some(self.fail(e));
                    }
                }
                Some(Err(e)) => return Some(self.fail(e)),
                None => {
                    return Some(self.fail(crate::Error::Stream(
                        "Conversation ended without a final event".into(),
                    )));
                }
            }
        }
    }

    /// Advances server start-up, queueing a heartbeat whenever it stays
    /// silent for [`HEARTBEAT_INTERVAL`].
    async fn open(&mut self) -> crate::Result<()> {
        let mut opening = match self.opening.take() {
            Some(opening) => opening,
            None => {
                let orchestrator = Arc::clone(&self.orchestrator);
                let query = self.query.clone();
                Box::pin(async move {
                    let events = orchestrator.execute_stream(&query).await?;
                    Ok(Box::pin(events) as EventStream)
                })
            }
        };

        let opened = tokio::select! {
            opened = &mut opening => Some(opened),
            _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => None,
        };
        match opened {
            Some(events) => self.events = Some(events?),
            None => {
                self.opening = Some(opening);
                self.on_event(StreamEvent::heartbeat()).await?;
            }
        }
        Ok(())
    }

    async fn on_event(&mut self, event: StreamEvent) -> crate::Result<()> {
        match event {
            StreamEvent::Reasoning(text) => self.push_working(Part::text(text)),
            StreamEvent::ToolCallAnnounced(payload) | StreamEvent::ToolResultReady(payload) => {
                self.push_working(Part::data(payload))
            }
            StreamEvent::TextDelta(text) => {
                let append = !self.first_delta;
                self.first_delta = false;
                self.streamed.push_str(&text);
                self.push_artifact(Artifact::chunk(vec![Part::text(text)], append, false));
            }
            StreamEvent::Final(content) => self.finish(content).await?,
        }
        Ok(())
    }

    async fn finish(&mut self, content: FinalContent) -> crate::Result<()> {
        let (state, parts) = resolve_final(&content);
        self.push_artifact(Artifact::chunk(parts.clone(), true, true));

        let mut persisted = Vec::new();
        match &content {
            FinalContent::Text(closing) => {
                self.streamed.push_str(closing);
                persisted.push(Part::text(std::mem::take(&mut self.streamed)));
            }
            FinalContent::Structured(_) => {
                if !self.streamed.is_empty() {
                    persisted.push(Part::text(std::mem::take(&mut self.streamed)));
                }
                persisted.extend(parts);
            }
        }

        self.store
            .update(
                &self.task_id,
                TaskStatus::new(state),
                Some(vec![Artifact::chunk(persisted, false, true)]),
            )
            .await?;

        self.span.record("state", tracing::field::display(state));
        info!(task_id = %self.task_id, state = %state, "Streamed task resolved");
        let terminal = self.status_event(TaskStatus::new(state), true);
        self.pending.push_back(terminal);
        self.done = true;
        self.events = None;
        Ok(())
    }

    fn fail(&mut self, e: crate::Error) -> TaskStreamResponse {
        error!(task_id = %self.task_id, error = %e, "{}", STREAM_ERROR_MESSAGE);
        self.done = true;
        self.opening = None;
        self.events = None;
        self.pending.clear();
        JsonRpcResponse::failure(
            self.request_id.clone(),
            JsonRpcError::internal(STREAM_ERROR_MESSAGE),
        )
    }

    fn push_working(&mut self, part: Part) {
        let status = TaskStatus::new(TaskState::Working).with_message(TaskMessage::agent(vec![part]));
        let response = self.status_event(status, false);
        self.pending.push_back(response);
    }

    fn push_artifact(&mut self, artifact: Artifact) {
        debug!(task_id = %self.task_id, append = artifact.append, last_chunk = artifact.last_chunk, "Artifact update");
        self.pending.push_back(JsonRpcResponse::success(
            self.request_id.clone(),
            TaskStreamEvent::Artifact(TaskArtifactUpdateEvent {
                task_id: self.task_id.clone(),
                artifact,
            }),
        ));
    }

    fn status_event(&self, status: TaskStatus, is_final: bool) -> TaskStreamResponse {
        JsonRpcResponse::success(
            self.request_id.clone(),
            TaskStreamEvent::Status(TaskStatusUpdateEvent {
                task_id: self.task_id.clone(),
                status,
                is_final,
            }),
        )
    }
}
