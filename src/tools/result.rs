//! Normalized tool-call results.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::mcp::McpToolResult;
use crate::types::{Message, MessageContent, ToolCall};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolResultKind {
    Text,
    Structured,
    Error,
}

/// Outcome of one tool call, whatever shape the server returned.
///
/// Downstream code switches on [`kind`](Self::kind); `text` always holds a
/// rendering the generation backend can read.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub call_id: String,
    pub name: String,
    pub kind: ToolResultKind,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl ToolResult {
    pub fn text(call: &ToolCall, text: impl Into<String>) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            kind: ToolResultKind::Text,
            text: text.into(),
            data: None,
        }
    }

    pub fn structured(call: &ToolCall, text: impl Into<String>, data: Value) -> Self {
        Self {
            kind: ToolResultKind::Structured,
            data: Some(data),
            ..Self::text(call, text)
        }
    }

    pub fn error(call: &ToolCall, message: impl Into<String>) -> Self {
        Self {
            kind: ToolResultKind::Error,
            ..Self::text(call, message)
        }
    }

    /// Joins the textual parts of a server response. Error responses keep
    /// their text verbatim; JSON object or array text becomes structured.
    pub fn from_mcp(call: &ToolCall, result: &McpToolResult) -> Self {
        let text = result.to_string_content();
        if result.is_error {
            return Self::error(call, text);
        }
        match serde_json::from_str::<Value>(&text) {
            Ok(data @ (Value::Object(_) | Value::Array(_))) => Self::structured(call, text, data),
            _ => Self::text(call, text),
        }
    }

    pub fn is_error(&self) -> bool {
        self.kind == ToolResultKind::Error
    }

    pub fn message_content(&self) -> MessageContent {
        match (self.kind, &self.data) {
            (ToolResultKind::Error, _) => MessageContent::Structured(json!({"error": self.text})),
            (ToolResultKind::Structured, Some(data)) => MessageContent::Structured(data.clone()),
            _ => MessageContent::Text(self.text.clone()),
        }
    }

    /// Tool-role message answering the originating call.
    pub fn to_message(&self) -> Message {
        Message::tool(&self.call_id, &self.name, self.message_content())
    }
}
