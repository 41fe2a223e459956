//! Task lifecycle on top of the conversation orchestrator.
//!
//! [`TaskManager`] turns a conversation into task status and artifact
//! updates for a subscriber, persisting through a [`TaskStore`].

mod manager;
mod store;
mod types;

pub use manager::{STREAM_ERROR_MESSAGE, SUPPORTED_CONTENT_TYPES, TaskManager, resolve_final};
pub use store::{InMemoryTaskStore, TaskStore};
pub use types::{
    Artifact, INTERNAL_ERROR, INVALID_PARAMS, JSONRPC_VERSION, JsonRpcError, JsonRpcResponse,
    Part, TASK_NOT_FOUND, Task, TaskArtifactUpdateEvent, TaskMessage, TaskRole, TaskSendParams,
    TaskState, TaskStatus, TaskStatusUpdateEvent, TaskStreamEvent, TaskStreamResponse,
    UNSUPPORTED_CONTENT_TYPE,
};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaskError {
    #[error("Task not found: {id}")]
    NotFound { id: String },

    #[error("Incompatible output modes: {requested:?}")]
    IncompatibleOutputModes { requested: Vec<String> },

    #[error("Only text parts are supported")]
    UnsupportedPart,

    #[error("Task message has no parts")]
    EmptyMessage,

    #[error("Invalid transition for task {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Task store error: {0}")]
    Storage(String),
}

impl TaskError {
    pub fn code(&self) -> i64 {
        match self {
            TaskError::NotFound { .. } => TASK_NOT_FOUND,
            TaskError::IncompatibleOutputModes { .. } => UNSUPPORTED_CONTENT_TYPE,
            TaskError::UnsupportedPart | TaskError::EmptyMessage => INVALID_PARAMS,
            TaskError::InvalidTransition { .. } | TaskError::Storage(_) => INTERNAL_ERROR,
        }
    }
}

impl From<&TaskError> for JsonRpcError {
    fn from(error: &TaskError) -> Self {
        JsonRpcError::new(error.code(), error.to_string())
    }
}

impl From<&crate::Error> for JsonRpcError {
    fn from(error: &crate::Error) -> Self {
        match error {
            crate::Error::Task(e) => e.into(),
            other => JsonRpcError::internal(other.to_string()),
        }
    }
}

pub type TaskResult<T> = std::result::Result<T, TaskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TaskError::NotFound { id: "t".into() }.code(), -32001);
        assert_eq!(
            TaskError::IncompatibleOutputModes {
                requested: vec!["image/png".into()]
            }
            .code(),
            -32005
        );
        assert_eq!(TaskError::UnsupportedPart.code(), -32602);

        let rpc = JsonRpcError::from(&crate::Error::Generation("down".into()));
        assert_eq!(rpc.code, -32603);
        let rpc = JsonRpcError::from(&crate::Error::Task(TaskError::UnsupportedPart));
        assert_eq!(rpc.code, -32602);
    }
}
