//! Routes model-issued function calls to tool servers.

use serde_json::Value;
use tracing::{Instrument, debug, warn};

use super::result::ToolResult;
use crate::agent::ConversationContext;
use crate::mcp::{FunctionName, McpManager};
use crate::resilience::RetryPolicy;
use crate::types::ToolCall;

pub const INVALID_FUNCTION_NAME: &str = "Invalid function name format";

/// Resolves `<alias>_<tool>` calls against a conversation's servers.
///
/// [`invoke`](Self::invoke) never fails: malformed names, unknown servers,
/// missing parameters and exhausted retries all come back as error results
/// so the generation backend can react to them.
#[derive(Clone, Debug, Default)]
pub struct ToolRouter {
    retry: Option<RetryPolicy>,
}

impl ToolRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides each connection's own retry policy.
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = Some(policy);
        self
    }

    pub async fn invoke(
        &self,
        call: &ToolCall,
        registry: &McpManager,
        ctx: &ConversationContext,
    ) -> ToolResult {
        let Some(FunctionName { server, tool }) = call.function_name() else {
            debug!(function = %call.name, "Rejected malformed function name");
            return ToolResult::error(call, INVALID_FUNCTION_NAME);
        };

        let Some(client) = registry.get(&server) else {
            warn!(server = %server, function = %call.name, "Call targets unknown server");
            return ToolResult::error(call, format!("Unknown server: {}", server));
        };

        let arguments = call.parsed_arguments();

        if let Some(definition) = client.tool(&tool).await
            && let Some(missing) = definition
                .required_params()
                .into_iter()
                .find(|param| !arguments.contains_key(*param))
        {
            return ToolResult::error(call, format!("Missing required parameter: {}", missing));
        }

        let span = ctx.spans().tool_call_span(&server, &tool, &call.id);
        let arguments = Value::Object(arguments);
        let outcome = match &self.retry {
            Some(policy) => {
                client
                    .call_tool_with(&tool, arguments, policy)
                    .instrument(span.span().clone())
                    .await
            }
            None => {
                client
                    .call_tool(&tool, arguments)
                    .instrument(span.span().clone())
                    .await
            }
        };

        let result = match outcome {
            Ok(raw) => ToolResult::from_mcp(call, &raw),
            Err(e) => {
                warn!(server = %server, tool = %tool, error = %e, "Tool call failed");
                ToolResult::error(call, e.to_string())
            }
        };
        span.finish(result.is_error());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::{McpServerConfig, McpToolResult};
    use crate::testing::{MockConnector, MockServer, MockStats};
    use crate::tools::ToolResultKind;
    use serde_json::json;
    use std::sync::Arc;

    async fn registry() -> (McpManager, Arc<MockStats>) {
        let connector = MockConnector::new().server(
            "weather",
            MockServer::new()
                .tool(
                    "forecast",
                    "Forecast",
                    json!({
                        "type": "object",
                        "properties": {"city": {"type": "string"}},
                        "required": ["city"]
                    }),
                )
                .respond("forecast", McpToolResult::text("sunny")),
        );
        let stats = connector.stats();
        let mut manager = McpManager::new(Arc::new(connector));
        manager
            .add_server("weather", McpServerConfig::process("weather"))
            .await
            .unwrap();
        manager.function_definitions().await;
        (manager, stats)
    }

    #[tokio::test]
    async fn test_malformed_names_never_reach_a_server() {
        let (manager, stats) = registry().await;
        let ctx = ConversationContext::new("test");
        let router = ToolRouter::new();

        for name in ["forecast", "_forecast", "weather_", ""] {
            let result = router
                .invoke(&ToolCall::new("1", name, "{}"), &manager, &ctx)
                .await;
            assert!(result.is_error(), "{} should be rejected", name);
            assert_eq!(result.text, INVALID_FUNCTION_NAME);
        }
        assert_eq!(stats.calls(), 0);
    }

    #[tokio::test]
    async fn test_unknown_server() {
        let (manager, stats) = registry().await;
        let result = ToolRouter::new()
            .invoke(
                &ToolCall::new("1", "maps_route", "{}"),
                &manager,
                &ConversationContext::new("test"),
            )
            .await;

        assert!(result.is_error());
        assert_eq!(result.text, "Unknown server: maps");
        assert_eq!(stats.calls(), 0);
    }

    #[tokio::test]
    async fn test_missing_required_parameter() {
        let (manager, stats) = registry().await;
        let result = ToolRouter::new()
            .invoke(
                &ToolCall::new("1", "weather_forecast", "not json at all"),
                &manager,
                &ConversationContext::new("test"),
            )
            .await;

        assert!(result.is_error());
        assert_eq!(result.text, "Missing required parameter: city");
        assert_eq!(stats.calls(), 0);
    }

    #[tokio::test]
    async fn test_successful_call() {
        let (manager, stats) = registry().await;
        let result = ToolRouter::new()
            .invoke(
                &ToolCall::new("call_7", "weather_forecast", r#"{"city": "Seoul"}"#),
                &manager,
                &ConversationContext::new("test"),
            )
            .await;

        assert_eq!(result.kind, ToolResultKind::Text);
        assert_eq!(result.text, "sunny");
        assert_eq!(result.call_id, "call_7");
        assert_eq!(stats.calls(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_become_error_result() {
        let connector = MockConnector::new()
            .server("flaky", MockServer::new().always_fail("boom"));
        let mut manager = McpManager::new(Arc::new(connector));
        manager
            .add_server("flaky", McpServerConfig::process("flaky"))
            .await
            .unwrap();

        let result = ToolRouter::new()
            .retry_policy(RetryPolicy::fixed(2, std::time::Duration::ZERO))
            .invoke(
                &ToolCall::new("1", "flaky_op", "{}"),
                &manager,
                &ConversationContext::new("test"),
            )
            .await;

        assert!(result.is_error());
        assert!(result.text.contains("boom"));
    }
}
