//! Tool-server transports backed by rmcp.
//!
//! Process servers are spawned as child processes speaking MCP over stdio;
//! stream servers are reached over streamable HTTP.

use std::sync::Arc;

#[cfg(feature = "mcp")]
use serde_json::Value;
#[cfg(feature = "mcp")]
use tokio::sync::RwLock;

use super::transport::{McpConnector, McpSession};
use super::{McpError, McpResult, McpServerConfig};
#[cfg(feature = "mcp")]
use super::{McpContent, McpServerInfo, McpToolDefinition, McpToolResult};

#[cfg(feature = "mcp")]
use rmcp::{
    RoleClient,
    model::{CallToolRequestParam, RawContent, ResourceContents},
    service::{RunningService, ServiceError, ServiceExt},
    transport::{ConfigureCommandExt, StreamableHttpClientTransport, TokioChildProcess},
};
#[cfg(feature = "mcp")]
use tokio::process::Command;

#[cfg(feature = "mcp")]
type McpRunningService = RunningService<RoleClient, ()>;

/// Convert rmcp ServiceError into McpError, keeping JSON-RPC codes and
/// flagging a torn-down channel so the caller can reconnect.
#[cfg(feature = "mcp")]
fn map_service_error(server: &str, e: ServiceError, context: &str) -> McpError {
    match e {
        ServiceError::McpError(err_data) => McpError::JsonRpc {
            code: err_data.code.0,
            message: err_data.message.to_string(),
        },
        ServiceError::TransportClosed | ServiceError::TransportSend(_) => McpError::ChannelClosed {
            server: server.to_string(),
        },
        _ => McpError::Protocol {
            message: format!("{}: {}", context, e),
        },
    }
}

#[cfg(feature = "mcp")]
fn map_content(raw: &RawContent) -> McpContent {
    match raw {
        RawContent::Text(t) => McpContent::Text {
            text: t.text.clone(),
        },
        RawContent::Image(i) => McpContent::Image {
            data: i.data.clone(),
            mime_type: i.mime_type.clone(),
        },
        RawContent::Resource(r) => match &r.resource {
            ResourceContents::TextResourceContents {
                uri,
                mime_type,
                text,
                ..
            } => McpContent::Resource {
                uri: uri.clone(),
                text: Some(text.clone()),
                mime_type: mime_type.clone(),
            },
            ResourceContents::BlobResourceContents { uri, mime_type, .. } => {
                McpContent::Resource {
                    uri: uri.clone(),
                    text: None,
                    mime_type: mime_type.clone(),
                }
            }
        },
        RawContent::Audio(_) => McpContent::Text {
            text: "[Audio content]".to_string(),
        },
        RawContent::ResourceLink(r) => McpContent::Resource {
            uri: r.uri.clone(),
            text: None,
            mime_type: r.mime_type.clone(),
        },
    }
}

/// Connector that opens real MCP sessions.
#[derive(Clone, Debug, Default)]
pub struct RmcpConnector;

impl RmcpConnector {
    pub fn new() -> Self {
        Self
    }

    #[cfg(feature = "mcp")]
    async fn open(alias: &str, config: &McpServerConfig) -> McpResult<McpRunningService> {
        match config {
            McpServerConfig::Process {
                command,
                args,
                env,
                cwd,
            } => {
                // Child inherits the parent environment; configured entries win.
                let transport = TokioChildProcess::new(Command::new(command).configure(|cmd| {
                    cmd.args(args);
                    cmd.envs(env);
                    if let Some(dir) = cwd {
                        cmd.current_dir(dir);
                    }
                }))
                .map_err(|e| McpError::ConnectionFailed {
                    message: format!("Failed to spawn '{}' for '{}': {}", command, alias, e),
                })?;

                ().serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        message: format!("Handshake with '{}' failed: {}", alias, e),
                    })
            }
            McpServerConfig::Stream { url } => {
                let transport = StreamableHttpClientTransport::from_uri(url.as_str());
                ().serve(transport)
                    .await
                    .map_err(|e| McpError::ConnectionFailed {
                        message: format!("Handshake with '{}' at {} failed: {}", alias, url, e),
                    })
            }
        }
    }
}

#[async_trait::async_trait]
impl McpConnector for RmcpConnector {
    #[cfg(feature = "mcp")]
    async fn connect(
        &self,
        alias: &str,
        config: &McpServerConfig,
    ) -> McpResult<Arc<dyn McpSession>> {
        let service = Self::open(alias, config).await?;

        let info = service.peer_info().map(|info| McpServerInfo {
            name: info.server_info.name.to_string(),
            version: info.server_info.version.to_string(),
            protocol_version: info.protocol_version.to_string(),
        });

        if let Some(info) = &info
            && !super::SUPPORTED_PROTOCOL_VERSIONS.contains(&info.protocol_version.as_str())
        {
            tracing::warn!(
                server = %alias,
                server_version = %info.protocol_version,
                supported = ?super::SUPPORTED_PROTOCOL_VERSIONS,
                "MCP protocol version mismatch"
            );
        }

        Ok(Arc::new(RmcpSession {
            alias: alias.to_string(),
            info,
            service: RwLock::new(Some(service)),
        }))
    }

    #[cfg(not(feature = "mcp"))]
    async fn connect(
        &self,
        _alias: &str,
        _config: &McpServerConfig,
    ) -> McpResult<Arc<dyn McpSession>> {
        Err(McpError::ConnectionFailed {
            message: "MCP feature not enabled".to_string(),
        })
    }
}

#[cfg(feature = "mcp")]
struct RmcpSession {
    alias: String,
    info: Option<McpServerInfo>,
    service: RwLock<Option<McpRunningService>>,
}

#[cfg(feature = "mcp")]
impl RmcpSession {
    fn closed(&self) -> McpError {
        McpError::ChannelClosed {
            server: self.alias.clone(),
        }
    }
}

#[cfg(feature = "mcp")]
#[async_trait::async_trait]
impl McpSession for RmcpSession {
    fn server_info(&self) -> Option<McpServerInfo> {
        self.info.clone()
    }

    async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>> {
        let guard = self.service.read().await;
        let service = guard.as_ref().ok_or_else(|| self.closed())?;

        let result = service
            .list_tools(Default::default())
            .await
            .map_err(|e| map_service_error(&self.alias, e, "Failed to list tools"))?;

        Ok(result
            .tools
            .into_iter()
            .map(|t| McpToolDefinition {
                name: t.name.to_string(),
                description: t.description.map(|d| d.to_string()).unwrap_or_default(),
                input_schema: Value::Object((*t.input_schema).clone()),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<McpToolResult> {
        let guard = self.service.read().await;
        let service = guard.as_ref().ok_or_else(|| self.closed())?;

        let result = service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: arguments.as_object().cloned(),
            })
            .await
            .map_err(|e| map_service_error(&self.alias, e, "Tool call failed"))?;

        Ok(McpToolResult {
            content: result.content.iter().map(|c| map_content(&c.raw)).collect(),
            is_error: result.is_error.unwrap_or(false),
        })
    }

    async fn close(&self) -> McpResult<()> {
        let Some(service) = self.service.write().await.take() else {
            return Ok(());
        };
        service.cancel().await.map_err(|e| McpError::Protocol {
            message: format!("Failed to cancel session for '{}': {}", self.alias, e),
        })?;
        Ok(())
    }
}
