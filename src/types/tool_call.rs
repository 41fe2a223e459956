//! Function calls emitted by the generation backend.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::mcp::FunctionName;

/// One model-issued function call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    /// `<serverAlias>_<toolName>`
    pub name: String,
    /// Raw argument text, expected to decode as a JSON object
    #[serde(default)]
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn function_name(&self) -> Option<FunctionName> {
        FunctionName::parse(&self.name)
    }

    /// Decoded arguments; anything that is not a JSON object becomes `{}`.
    pub fn parsed_arguments(&self) -> Map<String, Value> {
        match serde_json::from_str::<Value>(&self.arguments) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }
}
