//! Tool catalogs and the function definitions advertised to the generation backend.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use super::{FunctionName, McpToolDefinition};

/// Tools advertised by one server, as of its last listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ToolCatalog {
    tools: Vec<McpToolDefinition>,
}

impl ToolCatalog {
    pub fn new(tools: Vec<McpToolDefinition>) -> Self {
        Self { tools }
    }

    pub fn get(&self, name: &str) -> Option<&McpToolDefinition> {
        self.tools.iter().find(|t| t.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &McpToolDefinition> {
        self.tools.iter()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Function definitions for every tool, named `<alias>_<tool>`.
    pub fn function_definitions(&self, alias: &str) -> Vec<FunctionDefinition> {
        self.tools
            .iter()
            .map(|tool| FunctionDefinition::from_tool(alias, tool))
            .collect()
    }

    pub fn format_for_llm(&self) -> String {
        self.tools
            .iter()
            .map(McpToolDefinition::format_for_llm)
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

impl IntoIterator for ToolCatalog {
    type Item = McpToolDefinition;
    type IntoIter = std::vec::IntoIter<McpToolDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.tools.into_iter()
    }
}

/// A callable function as presented to the generation backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub parameters: Value,
}

impl FunctionDefinition {
    pub fn from_tool(alias: &str, tool: &McpToolDefinition) -> Self {
        let parameters = match &tool.input_schema {
            Value::Object(map) if !map.is_empty() => tool.input_schema.clone(),
            _ => json!({"type": "object", "properties": {}}),
        };
        Self {
            name: FunctionName::new(alias, &tool.name).to_string(),
            description: tool.description.clone(),
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_definitions_are_prefixed() {
        let catalog = ToolCatalog::new(vec![
            McpToolDefinition::new(
                "read_file",
                "Read a file",
                json!({"type": "object", "properties": {"path": {"type": "string"}}}),
            ),
            McpToolDefinition::new("ping", "", Value::Null),
        ]);

        let defs = catalog.function_definitions("fs");
        assert_eq!(defs.len(), 2);
        assert_eq!(defs[0].name, "fs_read_file");
        assert_eq!(defs[0].parameters["properties"]["path"]["type"], "string");
        assert_eq!(defs[1].name, "fs_ping");
        assert_eq!(
            defs[1].parameters,
            json!({"type": "object", "properties": {}})
        );
    }

    #[test]
    fn test_catalog_lookup() {
        let catalog = ToolCatalog::new(vec![McpToolDefinition::new("a", "", json!({}))]);
        assert!(catalog.get("a").is_some());
        assert!(catalog.get("b").is_none());
        assert_eq!(catalog.len(), 1);
        assert!(!catalog.is_empty());
    }
}
