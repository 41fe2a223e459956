//! In-memory test doubles for the generation backend and tool servers.
//!
//! Used by this crate's own tests and available to applications that want
//! to exercise an orchestrator without spawning servers or calling a model.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::{StreamExt, stream};
use serde_json::Value;

use crate::client::{Generation, GenerationAdapter, GenerationChunk, GenerationStream};
use crate::mcp::{
    FunctionDefinition, McpConnector, McpError, McpResult, McpServerConfig, McpServerInfo,
    McpSession, McpToolDefinition, McpToolResult,
};
use crate::types::Message;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Counters shared by every server of one [`MockConnector`].
#[derive(Debug, Default)]
pub struct MockStats {
    connects: AtomicUsize,
    calls: AtomicUsize,
    closes: AtomicUsize,
}

impl MockStats {
    /// Successful connections.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// `call_tool` invocations that reached a session.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

/// Scripted behaviour of one tool server.
#[derive(Debug, Default)]
pub struct MockServer {
    tools: Vec<McpToolDefinition>,
    responses: HashMap<String, McpToolResult>,
    failures: Mutex<VecDeque<McpError>>,
    always_fail: Option<String>,
    refuse: bool,
    refuse_after_first: bool,
    fail_listing: bool,
    call_delay: Option<Duration>,
    connect_delay: Option<Duration>,
    connected_once: AtomicBool,
}

impl MockServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool(mut self, name: &str, description: &str, schema: Value) -> Self {
        self.tools
            .push(McpToolDefinition::new(name, description, schema));
        self
    }

    /// Result for every call to `tool`. Unscripted tools answer `"<tool> ok"`.
    pub fn respond(mut self, tool: &str, result: McpToolResult) -> Self {
        self.responses.insert(tool.to_string(), result);
        self
    }

    /// Fails the next call with `error`. Queued failures persist across
    /// reconnects.
    pub fn fail_next(self, error: McpError) -> Self {
        lock(&self.failures).push_back(error);
        self
    }

    /// Fails every call with a JSON-RPC error.
    pub fn always_fail(mut self, message: &str) -> Self {
        self.always_fail = Some(message.to_string());
        self
    }

    pub fn refuse_connections(mut self) -> Self {
        self.refuse = true;
        self
    }

    /// Accepts the first connection only.
    pub fn refuse_after_first_connect(mut self) -> Self {
        self.refuse_after_first = true;
        self
    }

    /// Makes `list_tools` fail.
    pub fn fail_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    /// Delay before every call answers.
    pub fn call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    /// Delay before every connection attempt resolves.
    pub fn connect_delay(mut self, delay: Duration) -> Self {
        self.connect_delay = Some(delay);
        self
    }

    fn accept(&self) -> bool {
        if self.refuse {
            return false;
        }
        let seen = self.connected_once.swap(true, Ordering::SeqCst);
        !(self.refuse_after_first && seen)
    }

    fn call(&self, name: &str) -> McpResult<McpToolResult> {
        if let Some(error) = lock(&self.failures).pop_front() {
            return Err(error);
        }
        if let Some(message) = &self.always_fail {
            return Err(McpError::JsonRpc {
                code: -32000,
                message: message.clone(),
            });
        }
        Ok(self
            .responses
            .get(name)
            .cloned()
            .unwrap_or_else(|| McpToolResult::text(format!("{} ok", name))))
    }
}

/// Connector handing out sessions to scripted [`MockServer`]s, keyed by alias.
#[derive(Clone, Debug, Default)]
pub struct MockConnector {
    servers: HashMap<String, Arc<MockServer>>,
    stats: Arc<MockStats>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn server(mut self, alias: &str, server: MockServer) -> Self {
        self.servers.insert(alias.to_string(), Arc::new(server));
        self
    }

    pub fn stats(&self) -> Arc<MockStats> {
        Arc::clone(&self.stats)
    }
}

#[async_trait]
impl McpConnector for MockConnector {
    async fn connect(
        &self,
        alias: &str,
        _config: &McpServerConfig,
    ) -> McpResult<Arc<dyn McpSession>> {
        let server = self
            .servers
            .get(alias)
            .ok_or_else(|| McpError::ConnectionFailed {
                message: format!("No mock server named '{}'", alias),
            })?;
        if let Some(delay) = server.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if !server.accept() {
            return Err(McpError::ConnectionFailed {
                message: format!("Mock server '{}' refused the connection", alias),
            });
        }
        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockSession {
            alias: alias.to_string(),
            server: Arc::clone(server),
            stats: Arc::clone(&self.stats),
        }))
    }
}

struct MockSession {
    alias: String,
    server: Arc<MockServer>,
    stats: Arc<MockStats>,
}

#[async_trait]
impl McpSession for MockSession {
    fn server_info(&self) -> Option<McpServerInfo> {
        Some(McpServerInfo {
            name: self.alias.clone(),
            version: "mock".to_string(),
            protocol_version: "2025-06-18".to_string(),
        })
    }

    async fn list_tools(&self) -> McpResult<Vec<McpToolDefinition>> {
        if self.server.fail_listing {
            return Err(McpError::JsonRpc {
                code: -32601,
                message: "Method not found".to_string(),
            });
        }
        Ok(self.server.tools.clone())
    }

    async fn call_tool(&self, name: &str, _arguments: Value) -> McpResult<McpToolResult> {
        self.stats.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.server.call_delay {
            tokio::time::sleep(delay).await;
        }
        self.server.call(name)
    }

    async fn close(&self) -> McpResult<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Debug)]
enum ScriptedTurn {
    Complete(Generation),
    Chunks(Vec<GenerationChunk>),
    Fail(String),
}

/// Generation backend replaying queued turns in order.
///
/// Running out of turns is a generation error.
#[derive(Debug, Default)]
pub struct ScriptedAdapter {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    chunk_delay: Option<Duration>,
    histories: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A turn answered in one piece.
    pub fn complete(self, generation: Generation) -> Self {
        self.push(ScriptedTurn::Complete(generation))
    }

    /// A turn streamed as `chunks`; end them with a `Complete`.
    pub fn chunks(self, chunks: Vec<GenerationChunk>) -> Self {
        self.push(ScriptedTurn::Chunks(chunks))
    }

    pub fn fail(self, message: &str) -> Self {
        self.push(ScriptedTurn::Fail(message.to_string()))
    }

    /// Delay before each streamed chunk.
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Every history the adapter was called with, in order.
    pub fn histories(&self) -> Vec<Vec<Message>> {
        lock(&self.histories).clone()
    }

    fn push(self, turn: ScriptedTurn) -> Self {
        lock(&self.turns).push_back(turn);
        self
    }

    fn next_turn(&self, history: &[Message]) -> crate::Result<ScriptedTurn> {
        lock(&self.histories).push(history.to_vec());
        lock(&self.turns)
            .pop_front()
            .ok_or_else(|| crate::Error::generation("Scripted adapter has no more turns"))
    }
}

#[async_trait]
impl GenerationAdapter for ScriptedAdapter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        history: &[Message],
        _tools: &[FunctionDefinition],
    ) -> crate::Result<Generation> {
        match self.next_turn(history)? {
            ScriptedTurn::Complete(generation) => Ok(generation),
            ScriptedTurn::Chunks(chunks) => {
                let mut text = String::new();
                for chunk in chunks {
                    match chunk {
                        GenerationChunk::Complete(generation) => return Ok(generation),
                        GenerationChunk::Text(delta) => text.push_str(&delta),
                        GenerationChunk::Reasoning(_) => {}
                    }
                }
                Ok(Generation::text(text))
            }
            ScriptedTurn::Fail(message) => Err(crate::Error::Generation(message)),
        }
    }

    fn generate_stream(
        self: Arc<Self>,
        history: Vec<Message>,
        _tools: Vec<FunctionDefinition>,
    ) -> GenerationStream {
        let items: Vec<crate::Result<GenerationChunk>> = match self.next_turn(&history) {
            Ok(ScriptedTurn::Complete(generation)) => vec![Ok(GenerationChunk::Complete(generation))],
            Ok(ScriptedTurn::Chunks(chunks)) => chunks.into_iter().map(Ok).collect(),
            Ok(ScriptedTurn::Fail(message)) => vec![Err(crate::Error::Generation(message))],
            Err(e) => vec![Err(e)],
        };
        let delay = self.chunk_delay;
        Box::pin(stream::iter(items).then(move |item| async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            item
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_mock_server_scripts() {
        let connector = MockConnector::new().server(
            "fs",
            MockServer::new()
                .tool("read", "Read", json!({}))
                .fail_next(McpError::Protocol {
                    message: "once".into(),
                }),
        );
        let session = connector
            .connect("fs", &McpServerConfig::process("fs"))
            .await
            .unwrap();

        assert_eq!(session.list_tools().await.unwrap().len(), 1);
        assert!(session.call_tool("read", json!({})).await.is_err());
        let result = session.call_tool("read", json!({})).await.unwrap();
        assert_eq!(result.to_string_content(), "read ok");
        assert_eq!(connector.stats().calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_delay() {
        let connector = MockConnector::new().server(
            "fs",
            MockServer::new().call_delay(Duration::from_secs(3)),
        );
        let session = connector
            .connect("fs", &McpServerConfig::process("fs"))
            .await
            .unwrap();

        let started = tokio::time::Instant::now();
        session.call_tool("read", json!({})).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_refuse_after_first_connect() {
        let connector =
            MockConnector::new().server("fs", MockServer::new().refuse_after_first_connect());
        let config = McpServerConfig::process("fs");
        assert!(connector.connect("fs", &config).await.is_ok());
        assert!(connector.connect("fs", &config).await.is_err());
        assert!(connector.connect("other", &config).await.is_err());
        assert_eq!(connector.stats().connects(), 1);
    }

    #[tokio::test]
    async fn test_scripted_adapter_replays_turns() {
        let adapter = ScriptedAdapter::new()
            .complete(Generation::text("one"))
            .chunks(vec![
                GenerationChunk::Text("t".into()),
                GenerationChunk::Text("wo".into()),
            ])
            .fail("down");

        let history = [Message::user("hi")];
        assert_eq!(adapter.generate(&history, &[]).await.unwrap().text, "one");
        assert_eq!(adapter.generate(&history, &[]).await.unwrap().text, "two");
        assert!(adapter.generate(&history, &[]).await.is_err());
        assert!(adapter.generate(&history, &[]).await.is_err());
        assert_eq!(adapter.histories().len(), 4);
    }
}
