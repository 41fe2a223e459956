//! Transport seam between [`McpClient`](super::McpClient) and a live server session.

use std::sync::Arc;

use serde_json::Value;

use super::{McpResult, McpServerConfig, McpServerInfo, McpToolDefinition, McpToolResult};

/// One established, handshaken session with a tool server.
///
/// Implementations report a torn-down channel as
/// [`McpError::ChannelClosed`](super::McpError::ChannelClosed) so the client
/// can reconnect.
#[async_trait::async_trait]
pub trait McpSession: Send + Sync {
    fn server_info(&self) -> Option<McpServerInfo> {
        None
    }

    async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>>;

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<McpToolResult>;

    /// Releases the transport. Called at most once per session.
    async fn close(&self) -> McpResult<()>;
}

/// Opens sessions for server configurations.
#[async_trait::async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(
        &self,
        alias: &str,
        config: &McpServerConfig,
    ) -> McpResult<Arc<dyn McpSession>>;
}
