//! MCP (Model Context Protocol) tool-server connections.
//!
//! Each conversation owns one [`McpManager`] holding one [`McpClient`] per
//! server alias. Clients talk to servers through an [`McpConnector`], which
//! lets the transport be swapped out in tests.

pub mod catalog;
pub mod client;
pub mod connector;
pub mod manager;
pub mod transport;

pub use catalog::{FunctionDefinition, ToolCatalog};
pub use client::McpClient;
pub use connector::RmcpConnector;
pub use manager::McpManager;
pub use transport::{McpConnector, McpSession};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Separator between server alias and tool name in advertised function names.
pub const FUNCTION_NAME_SEPARATOR: char = '_';

pub(crate) const SUPPORTED_PROTOCOL_VERSIONS: &[&str] = &["2024-11-05", "2025-03-26", "2025-06-18"];

pub(crate) const MCP_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
pub(crate) const MCP_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Tool server configuration.
///
/// Mirrors the `mcpServers` entries of the settings file: an entry carrying
/// a `url` is a remote streamed server, anything else is spawned locally.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum McpServerConfig {
    /// Remote server reached over a streamed HTTP connection
    Stream { url: String },
    /// Local subprocess speaking over stdin/stdout
    Process {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
    },
}

impl McpServerConfig {
    pub fn process(command: impl Into<String>) -> Self {
        McpServerConfig::Process {
            command: command.into(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
        }
    }

    pub fn stream(url: impl Into<String>) -> Self {
        McpServerConfig::Stream { url: url.into() }
    }

    pub fn transport_kind(&self) -> TransportKind {
        match self {
            McpServerConfig::Process { .. } => TransportKind::Process,
            McpServerConfig::Stream { .. } => TransportKind::Stream,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportKind {
    Process,
    Stream,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Process => write!(f, "process"),
            TransportKind::Stream => write!(f, "stream"),
        }
    }
}

/// A model-facing function name resolved into its server alias and tool name.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FunctionName {
    pub server: String,
    pub tool: String,
}

impl FunctionName {
    pub fn new(server: impl Into<String>, tool: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            tool: tool.into(),
        }
    }

    /// Splits `<alias>_<tool>` on the first separator. Both halves must be non-empty.
    pub fn parse(name: &str) -> Option<Self> {
        let (server, tool) = name.split_once(FUNCTION_NAME_SEPARATOR)?;
        if server.is_empty() || tool.is_empty() {
            return None;
        }
        Some(Self::new(server, tool))
    }
}

impl std::fmt::Display for FunctionName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.server, FUNCTION_NAME_SEPARATOR, self.tool)
    }
}

/// Server aliases become the prefix of every function name, so they may not
/// contain the separator.
pub fn validate_server_alias(alias: &str) -> Result<(), String> {
    if alias.is_empty() {
        return Err("server alias must not be empty".to_string());
    }
    if alias.contains(FUNCTION_NAME_SEPARATOR) {
        return Err(format!(
            "server alias '{}' must not contain '{}'",
            alias, FUNCTION_NAME_SEPARATOR
        ));
    }
    Ok(())
}

/// Lifecycle of one tool-server connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum McpConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Ready,
    Reconnecting,
    Closed,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpServerInfo {
    pub name: String,
    pub version: String,
    #[serde(default)]
    pub protocol_version: String,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub input_schema: serde_json::Value,
}

impl McpToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }

    /// Parameters listed under the schema's `required` array.
    pub fn required_params(&self) -> Vec<&str> {
        self.input_schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Plain-text description of the tool for inclusion in a prompt.
    pub fn format_for_llm(&self) -> String {
        let required = self.required_params();
        let args: Vec<String> = self
            .input_schema
            .get("properties")
            .and_then(|p| p.as_object())
            .map(|props| {
                props
                    .iter()
                    .map(|(name, info)| {
                        let desc = info
                            .get("description")
                            .and_then(|d| d.as_str())
                            .unwrap_or("No description");
                        if required.contains(&name.as_str()) {
                            format!("- {}: {} (required)", name, desc)
                        } else {
                            format!("- {}: {}", name, desc)
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        format!(
            "Tool: {}\nDescription: {}\nArguments:\n{}",
            self.name,
            self.description,
            args.join("\n")
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Server '{server}' is not initialized")]
    NotInitialized { server: String },

    #[error("Channel to server '{server}' was closed")]
    ChannelClosed { server: String },

    #[error("Tool '{tool}' failed after {attempts} attempt(s): {message}")]
    ToolExecution {
        tool: String,
        attempts: u32,
        message: String,
    },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i32, message: String },

    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server already registered: {name}")]
    DuplicateServer { name: String },

    #[error("Invalid server alias: {message}")]
    InvalidAlias { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl McpError {
    /// The peer tore down the channel; the caller should reconnect before retrying.
    pub fn is_channel_closed(&self) -> bool {
        matches!(self, McpError::ChannelClosed { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, McpError::ChannelClosed { .. } | McpError::Timeout(_))
    }
}

pub type McpResult<T> = std::result::Result<T, McpError>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct McpToolResult {
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Resource {
        uri: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        mime_type: Option<String>,
    },
}

impl McpContent {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            McpContent::Text { text } => Some(text),
            McpContent::Resource {
                text: Some(text), ..
            } => Some(text),
            _ => None,
        }
    }
}

impl McpToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![McpContent::Text { text: text.into() }],
            is_error: true,
        }
    }

    pub fn to_string_content(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| c.as_text())
            .collect::<Vec<_>>()
            .join("\n")
    }
}
