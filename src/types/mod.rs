//! Core conversation types.

mod message;
mod tool_call;

pub use message::{Message, MessageContent, Role};
pub use tool_call::ToolCall;
