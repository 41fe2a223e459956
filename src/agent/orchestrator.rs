//! Conversation orchestrator construction and per-conversation setup.

use std::sync::Arc;

use tracing::{debug, warn};

use super::context::ConversationContext;
use super::conversation::Conversation;
use crate::audit::AuditLog;
use crate::client::{AdapterRegistry, GenerationAdapter};
use crate::config::Settings;
use crate::mcp::{FunctionDefinition, McpConnector, McpManager, McpServerConfig, RmcpConnector};
use crate::resilience::RetryPolicy;
use crate::tools::ToolRouter;
use crate::types::Message;

/// Drives the generation/tool-execution loop.
///
/// Every call to [`execute`](Self::execute) or
/// [`execute_stream`](Self::execute_stream) is an independent conversation
/// with its own tool-server connections, closed when the conversation ends.
pub struct ConversationOrchestrator {
    pub(crate) adapter: Arc<dyn GenerationAdapter>,
    pub(crate) connector: Arc<dyn McpConnector>,
    pub(crate) servers: Vec<(String, McpServerConfig)>,
    pub(crate) system_messages: Vec<Message>,
    pub(crate) audit: Option<AuditLog>,
    pub(crate) router: Arc<ToolRouter>,
    pub(crate) retry: RetryPolicy,
    pub(crate) model: String,
}

impl ConversationOrchestrator {
    pub fn builder(adapter: Arc<dyn GenerationAdapter>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(adapter)
    }

    pub fn adapter(&self) -> &Arc<dyn GenerationAdapter> {
        &self.adapter
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn server_aliases(&self) -> impl Iterator<Item = &str> {
        self.servers.iter().map(|(alias, _)| alias.as_str())
    }

    /// Starts the servers and seeds the history for one conversation.
    pub(crate) async fn open(&self, query: &str) -> crate::Result<ConversationSession> {
        let ctx = ConversationContext::generate().with_audit(self.audit.clone());
        let mut manager =
            McpManager::new(Arc::clone(&self.connector)).retry_policy(self.retry.clone());
        manager.start_all(self.servers.iter().cloned()).await?;

        let functions = manager.function_definitions().await;
        debug!(
            conversation_id = %ctx.id(),
            servers = manager.len(),
            functions = functions.len(),
            "Conversation opened"
        );

        Ok(ConversationSession {
            ctx: Arc::new(ctx),
            servers: Arc::new(manager),
            functions,
            conversation: Conversation::start(&self.system_messages, query),
        })
    }
}

impl std::fmt::Debug for ConversationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationOrchestrator")
            .field("adapter", &self.adapter.name())
            .field("model", &self.model)
            .field("servers", &self.server_aliases().collect::<Vec<_>>())
            .field("audit", &self.audit.as_ref().map(AuditLog::path))
            .finish()
    }
}

/// Resources owned by one running conversation.
pub(crate) struct ConversationSession {
    pub(crate) ctx: Arc<ConversationContext>,
    pub(crate) servers: Arc<McpManager>,
    pub(crate) functions: Vec<FunctionDefinition>,
    pub(crate) conversation: Conversation,
}

impl ConversationSession {
    pub(crate) async fn close(&self) {
        close_conversation(
            &self.ctx,
            &self.servers,
            self.conversation.messages(),
            &self.functions,
        )
        .await;
    }
}

/// Stops every server and writes the audit record, if configured.
pub(crate) async fn close_conversation(
    ctx: &ConversationContext,
    servers: &McpManager,
    messages: &[Message],
    functions: &[FunctionDefinition],
) {
    servers.close_all().await;
    if let Some(audit) = ctx.audit()
        && let Err(e) = audit.append(messages, functions).await
    {
        warn!(
            conversation_id = %ctx.id(),
            path = %audit.path().display(),
            error = %e,
            "Failed to write audit record"
        );
    }
}

pub struct OrchestratorBuilder {
    adapter: Arc<dyn GenerationAdapter>,
    connector: Option<Arc<dyn McpConnector>>,
    servers: Vec<(String, McpServerConfig)>,
    system_messages: Vec<Message>,
    audit: Option<AuditLog>,
    router: ToolRouter,
    retry: RetryPolicy,
    model: Option<String>,
}

impl OrchestratorBuilder {
    pub fn new(adapter: Arc<dyn GenerationAdapter>) -> Self {
        Self {
            adapter,
            connector: None,
            servers: Vec::new(),
            system_messages: Vec::new(),
            audit: None,
            router: ToolRouter::new(),
            retry: RetryPolicy::default(),
            model: None,
        }
    }

    /// Builder for the selected model of a settings file.
    ///
    /// Resolves the adapter through `adapters`, loads the model's system
    /// messages and picks up the servers and audit path.
    pub async fn from_settings(
        settings: &Settings,
        model: Option<&str>,
        adapters: &AdapterRegistry,
    ) -> crate::Result<Self> {
        let model_config = settings.select_model(model)?;
        let adapter = adapters.resolve(model_config);

        let mut builder = Self::new(adapter)
            .model(model_config.display_name())
            .servers(settings.servers())
            .system_messages(model_config.system_messages().await);
        if let Some(path) = &settings.log_messages_path {
            builder = builder.audit_log(AuditLog::new(path));
        }
        Ok(builder)
    }

    /// Transport used to reach tool servers. Defaults to [`RmcpConnector`].
    pub fn connector(mut self, connector: Arc<dyn McpConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    pub fn server(mut self, alias: impl Into<String>, config: McpServerConfig) -> Self {
        self.servers.push((alias.into(), config));
        self
    }

    pub fn servers(mut self, servers: impl IntoIterator<Item = (String, McpServerConfig)>) -> Self {
        self.servers.extend(servers);
        self
    }

    pub fn system_message(mut self, text: impl Into<String>) -> Self {
        self.system_messages.push(Message::system(text));
        self
    }

    pub fn system_messages(mut self, messages: Vec<Message>) -> Self {
        self.system_messages.extend(messages);
        self
    }

    pub fn audit_log(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn router(mut self, router: ToolRouter) -> Self {
        self.router = router;
        self
    }

    /// Retry policy for every tool-server connection.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn build(self) -> ConversationOrchestrator {
        let model = self
            .model
            .unwrap_or_else(|| self.adapter.name().to_string());
        ConversationOrchestrator {
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(RmcpConnector::new())),
            adapter: self.adapter,
            servers: self.servers,
            system_messages: self.system_messages,
            audit: self.audit,
            router: Arc::new(self.router),
            retry: self.retry,
            model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::testing::{MockConnector, MockServer, ScriptedAdapter};
    use serde_json::json;

    #[tokio::test]
    async fn test_open_starts_servers_and_seeds_history() {
        let connector = MockConnector::new().server(
            "fs",
            MockServer::new().tool("read", "Read", json!({"type": "object"})),
        );
        let orchestrator = ConversationOrchestrator::builder(Arc::new(ScriptedAdapter::new()))
            .connector(Arc::new(connector))
            .server("fs", McpServerConfig::process("fs"))
            .system_message("be terse")
            .build();

        let session = orchestrator.open("hello").await.unwrap();
        assert_eq!(session.servers.len(), 1);
        assert_eq!(session.functions[0].name, "fs_read");
        assert_eq!(session.conversation.len(), 2);
        session.close().await;
        assert!(session.servers.is_closed());
    }

    #[tokio::test]
    async fn test_from_settings() {
        let mut settings = Settings::default();
        settings.models.push(ModelConfig {
            title: Some("Scripted".into()),
            system_message: Some("hi".into()),
            ..ModelConfig::new("scripted", "s-1")
        });
        settings
            .mcp_servers
            .insert("fs".into(), McpServerConfig::process("fs"));
        settings.log_messages_path = Some("audit.jsonl".into());

        let adapters = AdapterRegistry::new().register("scripted", |_model: &ModelConfig| {
            Arc::new(ScriptedAdapter::new()) as Arc<dyn GenerationAdapter>
        });
        let orchestrator = OrchestratorBuilder::from_settings(&settings, None, &adapters)
            .await
            .unwrap()
            .connector(Arc::new(MockConnector::new()))
            .build();

        assert_eq!(orchestrator.model(), "Scripted");
        assert_eq!(orchestrator.adapter().name(), "scripted");
        assert_eq!(orchestrator.server_aliases().collect::<Vec<_>>(), vec!["fs"]);
        assert_eq!(orchestrator.system_messages[0].text(), Some("hi"));
        assert!(orchestrator.audit.is_some());
    }

    #[tokio::test]
    async fn test_from_settings_without_models_fails() {
        let err = OrchestratorBuilder::from_settings(&Settings::default(), None, &AdapterRegistry::new())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("No suitable model"));
    }
}
