//! Conversation orchestration: the generation/tool-execution loop.

mod context;
mod conversation;
mod events;
mod execution;
mod orchestrator;
mod streaming;

pub use context::ConversationContext;
pub use conversation::Conversation;
pub use events::{
    FinalContent, HEARTBEAT_INTERVAL, StreamEvent, tool_calls_payload, tool_results_payload,
};
pub use orchestrator::{ConversationOrchestrator, OrchestratorBuilder};
