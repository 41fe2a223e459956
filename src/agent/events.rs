//! Events produced by a streaming conversation.

use std::time::Duration;

use serde_json::{Value, json};

use crate::tools::{ToolResult, ToolResultKind};
use crate::types::ToolCall;

/// Longest silence before a heartbeat is emitted.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(2);

const HEARTBEAT_TEXT: &str = " ";

#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Reasoning text from the backend, or a heartbeat
    Reasoning(String),
    /// Calls about to run, as a `tool_calls` payload
    ToolCallAnnounced(Value),
    /// One call's outcome, as a `tool_result` payload
    ToolResultReady(Value),
    TextDelta(String),
    /// Always the last event of a successful stream
    Final(FinalContent),
}

impl StreamEvent {
    pub fn heartbeat() -> Self {
        StreamEvent::Reasoning(HEARTBEAT_TEXT.to_string())
    }

    pub fn is_heartbeat(&self) -> bool {
        matches!(self, StreamEvent::Reasoning(text) if text == HEARTBEAT_TEXT)
    }
}

/// Closing content of a conversation.
#[derive(Clone, Debug, PartialEq)]
pub enum FinalContent {
    /// Text not yet delivered as deltas, usually empty
    Text(String),
    /// The final answer was a JSON object
    Structured(Value),
}

impl FinalContent {
    /// `Structured` when `full_text` is a JSON object, otherwise `Text(closing)`.
    pub fn resolve(full_text: &str, closing: impl Into<String>) -> Self {
        match serde_json::from_str::<Value>(full_text.trim()) {
            Ok(value @ Value::Object(_)) => FinalContent::Structured(value),
            _ => FinalContent::Text(closing.into()),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FinalContent::Text(text) => Some(text),
            FinalContent::Structured(_) => None,
        }
    }
}

/// `{"type":"tool_calls","data":[{id,name,arguments}]}`
pub fn tool_calls_payload(calls: &[ToolCall]) -> Value {
    let data: Vec<Value> = calls
        .iter()
        .map(|call| {
            json!({
                "id": call.id,
                "name": call.name,
                "arguments": call.arguments,
            })
        })
        .collect();
    json!({"type": "tool_calls", "data": data})
}

/// `{"type":"tool_result","data":[{id,name,kind,content}]}`
pub fn tool_results_payload(results: &[ToolResult]) -> Value {
    let data: Vec<Value> = results
        .iter()
        .map(|result| {
            let content = match (result.kind, &result.data) {
                (ToolResultKind::Structured, Some(data)) => data.clone(),
                _ => Value::String(result.text.clone()),
            };
            json!({
                "id": result.call_id,
                "name": result.name,
                "kind": result.kind,
                "content": content,
            })
        })
        .collect();
    json!({"type": "tool_result", "data": data})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat() {
        assert!(StreamEvent::heartbeat().is_heartbeat());
        assert!(!StreamEvent::Reasoning("thinking".into()).is_heartbeat());
        assert!(!StreamEvent::TextDelta(" ".into()).is_heartbeat());
    }

    #[test]
    fn test_final_content_resolve() {
        assert_eq!(FinalContent::resolve("4", ""), FinalContent::Text(String::new()));
        assert_eq!(
            FinalContent::resolve("[1, 2]", "tail"),
            FinalContent::Text("tail".into())
        );
        assert_eq!(
            FinalContent::resolve(r#" {"require_user_input": true} "#, ""),
            FinalContent::Structured(json!({"require_user_input": true}))
        );
    }

    #[test]
    fn test_tool_payloads() {
        let call = ToolCall::new("c1", "weather_forecast", r#"{"city":"Oslo"}"#);
        let payload = tool_calls_payload(std::slice::from_ref(&call));
        assert_eq!(payload["type"], "tool_calls");
        assert_eq!(payload["data"][0]["name"], "weather_forecast");
        assert_eq!(payload["data"][0]["arguments"], r#"{"city":"Oslo"}"#);

        let results = [
            ToolResult::text(&call, "sunny"),
            ToolResult::structured(&call, "{\"t\":3}", json!({"t": 3})),
            ToolResult::error(&call, "boom"),
        ];
        let payload = tool_results_payload(&results);
        assert_eq!(payload["type"], "tool_result");
        assert_eq!(payload["data"][0]["content"], "sunny");
        assert_eq!(payload["data"][1]["content"]["t"], 3);
        assert_eq!(payload["data"][2]["kind"], "error");
        assert_eq!(payload["data"][2]["content"], "boom");
    }
}
