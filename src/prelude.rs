//! Prelude module for convenient imports.
//!
//! ```rust
//! use mcp_conductor::prelude::*;
//! ```

pub use crate::Error;
pub use crate::Result;

// Orchestration
pub use crate::agent::{ConversationOrchestrator, FinalContent, OrchestratorBuilder, StreamEvent};
pub use crate::client::{AdapterRegistry, Generation, GenerationAdapter, GenerationChunk};

// Tool servers
pub use crate::mcp::{McpManager, McpServerConfig, McpToolResult};
pub use crate::resilience::RetryPolicy;
pub use crate::tools::{ToolResult, ToolRouter};

// Tasks
pub use crate::task::{
    InMemoryTaskStore, TaskManager, TaskMessage, TaskSendParams, TaskState, TaskStore,
};

// Types
pub use crate::types::{Message, Role, ToolCall};

// Configuration
pub use crate::config::{EnvOverrides, ModelConfig, Settings};
