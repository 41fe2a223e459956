//! Task persistence.

use std::sync::Arc;

use dashmap::DashMap;

use super::types::{Artifact, Task, TaskSendParams, TaskState, TaskStatus};
use super::{TaskError, TaskResult};

/// Durable home of tasks. The manager writes once when a task is created
/// and once when it resolves.
#[async_trait::async_trait]
pub trait TaskStore: Send + Sync {
    fn name(&self) -> &str;

    /// Creates the task as `Submitted`, or appends the message to an
    /// existing task's history.
    async fn upsert(&self, params: &TaskSendParams) -> TaskResult<Task>;

    /// Sets the status and appends artifacts. Refuses illegal transitions.
    async fn update(
        &self,
        id: &str,
        status: TaskStatus,
        artifacts: Option<Vec<Artifact>>,
    ) -> TaskResult<Task>;

    async fn get(&self, id: &str, history_length: Option<usize>) -> TaskResult<Task>;
}

/// In-memory store for tests and single-instance deployments.
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskStore {
    tasks: Arc<DashMap<String, Task>>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait::async_trait]
impl TaskStore for InMemoryTaskStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn upsert(&self, params: &TaskSendParams) -> TaskResult<Task> {
        let mut entry = self.tasks.entry(params.id.clone()).or_insert_with(|| Task {
            id: params.id.clone(),
            session_id: params
                .session_id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::new_v4().to_string()),
            status: TaskStatus::new(TaskState::Submitted),
            artifacts: Vec::new(),
            history: Vec::new(),
            metadata: params.metadata.clone(),
        });
        let state = entry.status.state;
        if !state.can_transition_to(TaskState::Working) {
            return Err(TaskError::InvalidTransition {
                id: params.id.clone(),
                from: state,
                to: TaskState::Working,
            });
        }
        entry.history.push(params.message.clone());
        Ok(entry.value().clone())
    }

    async fn update(
        &self,
        id: &str,
        status: TaskStatus,
        artifacts: Option<Vec<Artifact>>,
    ) -> TaskResult<Task> {
        let mut task = self
            .tasks
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })?;

        let from = task.status.state;
        if !from.can_transition_to(status.state) {
            return Err(TaskError::InvalidTransition {
                id: id.to_string(),
                from,
                to: status.state,
            });
        }

        if let Some(message) = &status.message {
            task.history.push(message.clone());
        }
        task.status = status;
        if let Some(artifacts) = artifacts {
            task.artifacts.extend(artifacts);
        }
        Ok(task.value().clone())
    }

    async fn get(&self, id: &str, history_length: Option<usize>) -> TaskResult<Task> {
        self.tasks
            .get(id)
            .map(|task| task.with_history_window(history_length))
            .ok_or_else(|| TaskError::NotFound { id: id.to_string() })
    }
}
