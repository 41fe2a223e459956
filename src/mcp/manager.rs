//! Per-conversation registry of tool-server connections.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use super::catalog::FunctionDefinition;
use super::client::McpClient;
use super::transport::McpConnector;
use super::{McpError, McpResult, McpServerConfig, validate_server_alias};
use crate::resilience::RetryPolicy;

/// Owns one [`McpClient`] per alias for the lifetime of one conversation.
///
/// Connections are never shared across conversations. [`close_all`](Self::close_all)
/// tears every connection down; if the manager is dropped first, teardown is
/// scheduled on the current runtime instead.
pub struct McpManager {
    connector: Arc<dyn McpConnector>,
    retry: RetryPolicy,
    servers: BTreeMap<String, Arc<McpClient>>,
    closed: AtomicBool,
}

impl McpManager {
    pub fn new(connector: Arc<dyn McpConnector>) -> Self {
        Self {
            connector,
            retry: RetryPolicy::default(),
            servers: BTreeMap::new(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    /// Starts and registers one server.
    pub async fn add_server(
        &mut self,
        alias: impl Into<String>,
        config: McpServerConfig,
    ) -> McpResult<()> {
        let alias = alias.into();
        validate_server_alias(&alias).map_err(|message| McpError::InvalidAlias { message })?;
        if self.servers.contains_key(&alias) {
            return Err(McpError::DuplicateServer { name: alias });
        }

        let client = McpClient::new(alias.clone(), config, Arc::clone(&self.connector))
            .retry_policy(self.retry.clone());
        client.start().await?;
        self.servers.insert(alias, Arc::new(client));
        Ok(())
    }

    /// Starts every configured server, skipping those that fail.
    ///
    /// Fails only when servers were configured and none could be started.
    pub async fn start_all(
        &mut self,
        servers: impl IntoIterator<Item = (String, McpServerConfig)>,
    ) -> McpResult<usize> {
        let mut configured = 0;
        for (alias, config) in servers {
            configured += 1;
            if let Err(e) = self.add_server(alias.clone(), config).await {
                warn!(server = %alias, error = %e, "Could not start server, skipping");
            }
        }

        if configured > 0 && self.servers.is_empty() {
            return Err(McpError::ConnectionFailed {
                message: "No MCP servers could be started".to_string(),
            });
        }
        info!(started = self.servers.len(), configured, "Tool servers started");
        Ok(self.servers.len())
    }

    pub fn get(&self, alias: &str) -> Option<&Arc<McpClient>> {
        self.servers.get(alias)
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.servers.contains_key(alias)
    }

    pub fn list_servers(&self) -> Vec<String> {
        self.servers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Lists every server's tools and returns them as prefixed function definitions.
    pub async fn function_definitions(&self) -> Vec<FunctionDefinition> {
        let mut functions = Vec::new();
        for (alias, client) in &self.servers {
            match client.list_tools().await {
                Ok(catalog) => functions.extend(catalog.function_definitions(alias)),
                Err(e) => warn!(server = %alias, error = %e, "Skipping tools of server"),
            }
        }
        debug!(count = functions.len(), "Collected function definitions");
        functions
    }

    /// Closes every connection exactly once.
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for (alias, client) in &self.servers {
            debug!(server = %alias, "Stopping tool server");
            client.cleanup().await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for McpManager {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::SeqCst) || self.servers.is_empty() {
            return;
        }
        let clients: Vec<Arc<McpClient>> = std::mem::take(&mut self.servers).into_values().collect();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    for client in clients {
                        client.cleanup().await;
                    }
                });
            }
            Err(_) => warn!(
                count = clients.len(),
                "Tool servers dropped outside a runtime; connections not closed"
            ),
        }
    }
}

impl std::fmt::Debug for McpManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpManager")
            .field("servers", &self.servers.keys().collect::<Vec<_>>())
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockConnector, MockServer};
    use serde_json::json;

    fn process(cmd: &str) -> McpServerConfig {
        McpServerConfig::process(cmd)
    }

    #[tokio::test]
    async fn test_start_all_skips_failed_servers() {
        let connector = MockConnector::new()
            .server("good", MockServer::new())
            .server("bad", MockServer::new().refuse_connections());
        let mut manager = McpManager::new(Arc::new(connector));

        let started = manager
            .start_all(vec![
                ("good".to_string(), process("good")),
                ("bad".to_string(), process("bad")),
            ])
            .await
            .unwrap();

        assert_eq!(started, 1);
        assert!(manager.contains("good"));
        assert!(!manager.contains("bad"));
    }

    #[tokio::test]
    async fn test_start_all_fails_when_nothing_starts() {
        let connector =
            MockConnector::new().server("bad", MockServer::new().refuse_connections());
        let mut manager = McpManager::new(Arc::new(connector));

        let err = manager
            .start_all(vec![("bad".to_string(), process("bad"))])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("No MCP servers could be started"));
    }

    #[tokio::test]
    async fn test_start_all_with_no_servers_is_ok() {
        let mut manager = McpManager::new(Arc::new(MockConnector::new()));
        assert_eq!(manager.start_all(Vec::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_rejects_alias_with_separator() {
        let connector = MockConnector::new().server("my_server", MockServer::new());
        let mut manager = McpManager::new(Arc::new(connector));

        let err = manager
            .add_server("my_server", process("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::InvalidAlias { .. }));
    }

    #[tokio::test]
    async fn test_rejects_duplicate_alias() {
        let connector = MockConnector::new().server("fs", MockServer::new());
        let mut manager = McpManager::new(Arc::new(connector));

        manager.add_server("fs", process("fs")).await.unwrap();
        let err = manager.add_server("fs", process("fs")).await.unwrap_err();
        assert!(matches!(err, McpError::DuplicateServer { .. }));
    }

    #[tokio::test]
    async fn test_function_definitions_across_servers() {
        let connector = MockConnector::new()
            .server(
                "fs",
                MockServer::new().tool("read_file", "Read", json!({"type": "object"})),
            )
            .server("web", MockServer::new().tool("fetch", "Fetch", json!({})));
        let mut manager = McpManager::new(Arc::new(connector));
        manager
            .start_all(vec![
                ("fs".to_string(), process("fs")),
                ("web".to_string(), process("web")),
            ])
            .await
            .unwrap();

        let names: Vec<String> = manager
            .function_definitions()
            .await
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["fs_read_file", "web_fetch"]);
    }

    #[tokio::test]
    async fn test_close_all_closes_each_server_once() {
        let connector = MockConnector::new()
            .server("a", MockServer::new())
            .server("b", MockServer::new());
        let stats = connector.stats();
        let mut manager = McpManager::new(Arc::new(connector));
        manager
            .start_all(vec![
                ("a".to_string(), process("a")),
                ("b".to_string(), process("b")),
            ])
            .await
            .unwrap();

        manager.close_all().await;
        manager.close_all().await;
        drop(manager);
        tokio::task::yield_now().await;

        assert_eq!(stats.closes(), 2);
    }

    #[tokio::test]
    async fn test_drop_schedules_cleanup() {
        let connector = MockConnector::new().server("a", MockServer::new());
        let stats = connector.stats();
        let mut manager = McpManager::new(Arc::new(connector));
        manager.add_server("a", process("a")).await.unwrap();

        drop(manager);
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert_eq!(stats.closes(), 1);
    }
}
