//! # mcp-conductor
//!
//! Tool-augmented conversation orchestration over MCP tool servers.
//!
//! A [`ConversationOrchestrator`] drives the loop between a pluggable
//! generation backend and a set of tool servers, either to completion or as
//! a stream of events. A [`TaskManager`] exposes that stream as task status
//! and artifact updates for a remote subscriber.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use futures::StreamExt;
//! use mcp_conductor::prelude::*;
//!
//! # async fn example(adapter: Arc<dyn GenerationAdapter>) -> Result<()> {
//! let orchestrator = ConversationOrchestrator::builder(adapter)
//!     .server("fs", McpServerConfig::process("mcp-server-filesystem"))
//!     .build();
//!
//! let answer = orchestrator.execute("What is in README.md?").await?;
//! println!("{}", answer);
//!
//! let manager = TaskManager::new(Arc::new(orchestrator));
//! let params = TaskSendParams::new("task-1", TaskMessage::user("Summarize it"));
//! let mut updates = Box::pin(manager.send_task_subscribe(1.into(), params).await?);
//! while let Some(update) = updates.next().await {
//!     println!("{}", serde_json::to_string(&update)?);
//! }
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod agent;
pub mod audit;
pub mod client;
pub mod config;
pub mod mcp;
pub mod observability;
pub mod prelude;
pub mod resilience;
pub mod task;
pub mod testing;
pub mod tools;
pub mod types;

pub use agent::{
    ConversationContext, ConversationOrchestrator, FinalContent, OrchestratorBuilder, StreamEvent,
};
pub use audit::AuditLog;
pub use client::{AdapterRegistry, Generation, GenerationAdapter, GenerationChunk, UnsupportedAdapter};
pub use config::{ModelConfig, Settings};
pub use mcp::{
    McpClient, McpConnector, McpError, McpManager, McpResult, McpServerConfig, McpSession,
    McpToolDefinition, McpToolResult,
};
pub use observability::{SpanContext, TracingConfig, init_tracing};
pub use resilience::{ExponentialBackoff, RetryPolicy};
pub use task::{InMemoryTaskStore, TaskError, TaskManager, TaskStore};
pub use tools::{ToolResult, ToolResultKind, ToolRouter};
pub use types::{Message, Role, ToolCall};

/// Error type for mcp-conductor operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Tool-server communication failed.
    #[error("MCP error: {0}")]
    Mcp(McpError),

    /// The generation backend failed; fatal to the conversation.
    #[error("Generation failed: {0}")]
    Generation(String),

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Task lookup, validation or persistence failed.
    #[error("Task error: {0}")]
    Task(#[from] TaskError),

    /// JSON serialization or deserialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Required environment variable missing or invalid.
    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    /// Streaming response error.
    #[error("Stream error: {0}")]
    Stream(String),

    /// Operation exceeded timeout.
    #[error("Operation timed out after {:.1}s", .0.as_secs_f64())]
    Timeout(std::time::Duration),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Configuration, parsing, or setup errors
    Configuration,
    /// Connection loss or timeouts that may succeed on retry
    Transient,
    /// Tool-server, task or stream state errors
    Stateful,
    /// Internal errors (IO, JSON, unexpected states)
    Internal,
}

impl Error {
    pub fn generation(message: impl Into<String>) -> Self {
        Error::Generation(message.into())
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Config(_) | Error::Env(_) => ErrorCategory::Configuration,
            Error::Mcp(e) if e.is_transient() => ErrorCategory::Transient,
            Error::Timeout(_) => ErrorCategory::Transient,
            Error::Task(TaskError::Storage(_)) => ErrorCategory::Internal,
            Error::Mcp(_) | Error::Task(_) | Error::Stream(_) => ErrorCategory::Stateful,
            Error::Generation(_) | Error::Io(_) | Error::Json(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_configuration_error(&self) -> bool {
        self.category() == ErrorCategory::Configuration
    }

    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

impl From<McpError> for Error {
    fn from(err: McpError) -> Self {
        match err {
            McpError::Io(e) => Error::Io(e),
            McpError::Json(e) => Error::Json(e),
            McpError::Timeout(d) => Error::Timeout(d),
            other => Error::Mcp(other),
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Serialization(e) => Error::Json(e),
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Env(e) => Error::Env(e),
            other => Error::Config(other.to_string()),
        }
    }
}

/// Result type alias for mcp-conductor operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mcp_error_conversion() {
        let err: Error = McpError::ChannelClosed {
            server: "fs".into(),
        }
        .into();
        assert!(err.is_retryable());

        let err: Error = McpError::Io(std::io::Error::other("pipe")).into();
        assert!(matches!(err, Error::Io(_)));

        let err: Error = McpError::ConnectionFailed {
            message: "No MCP servers could be started".into(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Stateful);
        assert!(err.to_string().contains("No MCP servers could be started"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::NoSuitableModel.into();
        assert!(err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Configuration error: No suitable model found in config."
        );
    }

    #[test]
    fn test_categories() {
        assert_eq!(Error::generation("down").category(), ErrorCategory::Internal);
        assert_eq!(
            Error::Task(TaskError::NotFound { id: "t".into() }).category(),
            ErrorCategory::Stateful
        );
        assert!(Error::Timeout(std::time::Duration::from_secs(1)).is_retryable());
    }
}
