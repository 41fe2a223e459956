//! A single tool-server connection.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{Mutex, RwLock};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use super::catalog::ToolCatalog;
use super::transport::{McpConnector, McpSession};
use super::{
    McpConnectionStatus, McpError, McpResult, McpServerConfig, McpServerInfo, McpToolDefinition,
    McpToolResult,
};
use crate::resilience::RetryPolicy;

/// One live channel to one tool server.
///
/// Moves through `Disconnected → Connecting → Ready → Closed`; a closed
/// channel during [`call_tool`](Self::call_tool) passes through
/// `Reconnecting` while the session is rebuilt.
pub struct McpClient {
    alias: String,
    config: McpServerConfig,
    connector: Arc<dyn McpConnector>,
    retry: RetryPolicy,
    connect_timeout: Duration,
    call_timeout: Duration,
    session: RwLock<Option<Arc<dyn McpSession>>>,
    status: RwLock<McpConnectionStatus>,
    server_info: RwLock<Option<McpServerInfo>>,
    tools: RwLock<Vec<McpToolDefinition>>,
    release_gate: Mutex<()>,
}

impl McpClient {
    pub fn new(
        alias: impl Into<String>,
        config: McpServerConfig,
        connector: Arc<dyn McpConnector>,
    ) -> Self {
        Self {
            alias: alias.into(),
            config,
            connector,
            retry: RetryPolicy::default(),
            connect_timeout: super::MCP_CONNECT_TIMEOUT,
            call_timeout: super::MCP_CALL_TIMEOUT,
            session: RwLock::new(None),
            status: RwLock::new(McpConnectionStatus::Disconnected),
            server_info: RwLock::new(None),
            tools: RwLock::new(Vec::new()),
            release_gate: Mutex::new(()),
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn config(&self) -> &McpServerConfig {
        &self.config
    }

    pub async fn status(&self) -> McpConnectionStatus {
        *self.status.read().await
    }

    pub async fn is_ready(&self) -> bool {
        self.status().await == McpConnectionStatus::Ready
    }

    pub async fn server_info(&self) -> Option<McpServerInfo> {
        self.server_info.read().await.clone()
    }

    /// Cached definition of a tool from the last successful listing.
    pub async fn tool(&self, name: &str) -> Option<McpToolDefinition> {
        self.tools
            .read()
            .await
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    async fn set_status(&self, status: McpConnectionStatus) {
        *self.status.write().await = status;
    }

    /// Opens the transport and performs the handshake.
    ///
    /// On failure the connection is left `Disconnected`; the caller decides
    /// whether to skip this server.
    pub async fn start(&self) -> McpResult<()> {
        self.set_status(McpConnectionStatus::Connecting).await;
        let kind = self.config.transport_kind();
        debug!(server = %self.alias, transport = %kind, "Connecting to tool server");

        let connected = timeout(
            self.connect_timeout,
            self.connector.connect(&self.alias, &self.config),
        )
        .await;

        let session = match connected {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                self.set_status(McpConnectionStatus::Disconnected).await;
                return Err(match e {
                    McpError::ConnectionFailed { .. } => e,
                    other => McpError::ConnectionFailed {
                        message: format!("{}: {}", self.alias, other),
                    },
                });
            }
            Err(_) => {
                self.set_status(McpConnectionStatus::Disconnected).await;
                return Err(McpError::ConnectionFailed {
                    message: format!(
                        "{}: connection timed out after {:?}",
                        self.alias, self.connect_timeout
                    ),
                });
            }
        };

        *self.server_info.write().await = session.server_info();
        *self.session.write().await = Some(session);
        self.set_status(McpConnectionStatus::Ready).await;
        info!(server = %self.alias, transport = %kind, "Tool server ready");
        Ok(())
    }

    /// Lists the server's tools.
    ///
    /// A server-side failure yields an empty catalog: a server with no usable
    /// tools is a valid outcome.
    pub async fn list_tools(&self) -> McpResult<ToolCatalog> {
        if !self.is_ready().await {
            return Err(McpError::NotInitialized {
                server: self.alias.clone(),
            });
        }
        let session = self.current_session().await?;

        let tools = match session.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %self.alias, error = %e, "Failed to list tools");
                Vec::new()
            }
        };

        *self.tools.write().await = tools.clone();
        debug!(server = %self.alias, count = tools.len(), "Listed tools");
        Ok(ToolCatalog::new(tools))
    }

    /// Calls a tool under the client's retry policy.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> McpResult<McpToolResult> {
        let policy = self.retry.clone();
        self.call_tool_with(name, arguments, &policy).await
    }

    /// Calls a tool with an explicit retry policy.
    ///
    /// A closed channel triggers a full reconnect before the attempt is
    /// retried; a failed reconnect still consumes the attempt. Any other
    /// failure waits out the policy delay, except on the last attempt.
    pub async fn call_tool_with(
        &self,
        name: &str,
        arguments: Value,
        policy: &RetryPolicy,
    ) -> McpResult<McpToolResult> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let error = match self.try_call(name, arguments.clone()).await {
                Ok(result) => return Ok(result),
                Err(e) => e,
            };

            if error.is_channel_closed() && policy.reconnect_on_closed {
                warn!(
                    server = %self.alias,
                    tool = %name,
                    attempt,
                    "Channel closed, reconnecting"
                );
                if let Err(e) = self.reconnect().await {
                    warn!(server = %self.alias, error = %e, "Reconnect failed");
                }
            } else {
                warn!(
                    server = %self.alias,
                    tool = %name,
                    attempt,
                    error = %error,
                    "Tool call failed"
                );
            }

            if policy.is_last(attempt) {
                return Err(McpError::ToolExecution {
                    tool: name.to_string(),
                    attempts: attempt,
                    message: error.to_string(),
                });
            }
            sleep(policy.delay_for(attempt)).await;
        }
    }

    async fn try_call(&self, name: &str, arguments: Value) -> McpResult<McpToolResult> {
        let session = self.current_session().await?;
        timeout(self.call_timeout, session.call_tool(name, arguments))
            .await
            .map_err(|_| McpError::Timeout(self.call_timeout))?
    }

    async fn current_session(&self) -> McpResult<Arc<dyn McpSession>> {
        self.session
            .read()
            .await
            .clone()
            .ok_or_else(|| McpError::NotInitialized {
                server: self.alias.clone(),
            })
    }

    async fn reconnect(&self) -> McpResult<()> {
        self.release(McpConnectionStatus::Reconnecting).await;
        self.start().await
    }

    /// Closes the session and transport.
    ///
    /// Idempotent; concurrent callers are serialized so at most one teardown
    /// runs per connection.
    pub async fn cleanup(&self) {
        self.release(McpConnectionStatus::Closed).await;
    }

    async fn release(&self, next: McpConnectionStatus) {
        let _gate = self.release_gate.lock().await;
        let session = self.session.write().await.take();
        self.set_status(next).await;

        if let Some(session) = session {
            match session.close().await {
                Ok(()) => debug!(server = %self.alias, "Session closed"),
                Err(e) => warn!(server = %self.alias, error = %e, "Error while closing session"),
            }
        }
    }
}

impl std::fmt::Debug for McpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClient")
            .field("alias", &self.alias)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
