//! Streaming conversation loop.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::{Stream, StreamExt, stream};
use tracing::{Instrument, Span, debug, warn};

use super::events::{
    FinalContent, HEARTBEAT_INTERVAL, StreamEvent, tool_calls_payload, tool_results_payload,
};
use super::orchestrator::{ConversationOrchestrator, ConversationSession, close_conversation};
use crate::client::{Generation, GenerationAdapter, GenerationChunk, GenerationStream};
use crate::tools::{ToolResult, ToolRouter};
use crate::types::{Message, ToolCall};

impl ConversationOrchestrator {
    /// Runs the conversation as a stream of [`StreamEvent`]s.
    ///
    /// A successful stream ends with exactly one [`StreamEvent::Final`]. A
    /// failing one ends with a single `Err`. Whenever the backend or a tool
    /// stays silent for [`HEARTBEAT_INTERVAL`], a heartbeat
    /// `Reasoning(" ")` is emitted.
    ///
    /// Two phases emit no heartbeat: starting the tool servers, which
    /// happens before this returns and may take up to the connect timeout
    /// per server, and closing them, which happens before `Final` is
    /// yielded. Callers that need liveness during start-up race this call
    /// against their own timer, as [`TaskManager`](crate::task::TaskManager)
    /// does.
    ///
    /// Dropping the stream early aborts any in-flight tool call and
    /// schedules server shutdown on the current runtime.
    pub async fn execute_stream(
        &self,
        query: &str,
    ) -> crate::Result<impl Stream<Item = crate::Result<StreamEvent>> + Send + 'static> {
        let session = self.open(query).await?;
        let span = session.ctx.spans().conversation_span(&self.model, "streaming");
        let state = StreamState {
            adapter: Arc::clone(&self.adapter),
            router: Arc::clone(&self.router),
            session,
            span,
            phase: Phase::StartTurn,
            pending: VecDeque::new(),
            closed: false,
        };

        Ok(stream::unfold(state, |mut state| async move {
            let span = state.span.clone();
            let event = state.next_event().instrument(span).await;
            event.map(|event| (event, state))
        }))
    }
}

enum Phase {
    StartTurn,
    Streaming {
        upstream: GenerationStream,
        streamed: String,
    },
    Tools {
        calls: Vec<ToolCall>,
        index: usize,
    },
    RunningTool {
        calls: Vec<ToolCall>,
        index: usize,
        call: BoxFuture<'static, ToolResult>,
    },
    Done,
}

struct StreamState {
    adapter: Arc<dyn GenerationAdapter>,
    router: Arc<ToolRouter>,
    session: ConversationSession,
    span: Span,
    phase: Phase,
    pending: VecDeque<crate::Result<StreamEvent>>,
    closed: bool,
}

impl StreamState {
    async fn next_event(&mut self) -> Option<crate::Result<StreamEvent>> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some(event);
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Done => return None,
                Phase::StartTurn => {
                    let upstream = Arc::clone(&self.adapter).generate_stream(
                        self.session.conversation.messages().to_vec(),
                        self.session.functions.clone(),
                    );
                    self.phase = Phase::Streaming {
                        upstream,
                        streamed: String::new(),
                    };
                }
                Phase::Streaming {
                    mut upstream,
                    mut streamed,
                } => {
                    let next = tokio::select! {
                        item = upstream.next() => Some(item),
                        _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => None,
                    };

                    match next {
                        None => {
                            self.phase = Phase::Streaming { upstream, streamed };
                            return Some(Ok(StreamEvent::heartbeat()));
                        }
                        Some(Some(Ok(GenerationChunk::Text(text)))) => {
                            streamed.push_str(&text);
                            self.phase = Phase::Streaming { upstream, streamed };
                            if !text.is_empty() {
                                return Some(Ok(StreamEvent::TextDelta(text)));
                            }
                        }
                        Some(Some(Ok(GenerationChunk::Reasoning(text)))) => {
                            self.phase = Phase::Streaming { upstream, streamed };
                            return Some(Ok(StreamEvent::Reasoning(text)));
                        }
                        Some(Some(Ok(GenerationChunk::Complete(generation)))) => {
                            self.end_turn(generation, &streamed).await;
                        }
                        Some(Some(Err(e))) => return Some(self.fail(e).await),
                        Some(None) => {
                            let e = crate::Error::Stream(
                                "Generation stream ended without a complete response".into(),
                            );
                            return Some(self.fail(e).await);
                        }
                    }
                }
                Phase::Tools { calls, index } => {
                    let Some(call) = calls.get(index).cloned() else {
                        self.phase = Phase::StartTurn;
                        continue;
                    };
                    let router = Arc::clone(&self.router);
                    let servers = Arc::clone(&self.session.servers);
                    let ctx = Arc::clone(&self.session.ctx);
                    self.phase = Phase::RunningTool {
                        calls,
                        index,
                        call: Box::pin(async move { router.invoke(&call, &servers, &ctx).await }),
                    };
                }
                Phase::RunningTool {
                    calls,
                    index,
                    mut call,
                } => {
                    tokio::select! {
                        result = &mut call => {
                            let payload = tool_results_payload(std::slice::from_ref(&result));
                            self.session.conversation.push(result.to_message());
                            self.phase = Phase::Tools { calls, index: index + 1 };
                            return Some(Ok(StreamEvent::ToolResultReady(payload)));
                        }
                        _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                            self.phase = Phase::RunningTool { calls, index, call };
                            return Some(Ok(StreamEvent::heartbeat()));
                        }
                    }
                }
            }
        }
    }

    async fn end_turn(&mut self, generation: Generation, streamed: &str) {
        let Generation { text, tool_calls } = generation;

        // Text the backend only delivered in the complete response.
        let unstreamed = text
            .strip_prefix(streamed)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string);
        if let Some(rest) = &unstreamed {
            self.pending.push_back(Ok(StreamEvent::TextDelta(rest.clone())));
        }

        self.session
            .conversation
            .push(Message::assistant_with_calls(text.clone(), tool_calls.clone()));

        if tool_calls.is_empty() {
            self.close().await;
            self.pending
                .push_back(Ok(StreamEvent::Final(FinalContent::resolve(&text, ""))));
            self.phase = Phase::Done;
            return;
        }

        debug!(count = tool_calls.len(), "Running tool calls");
        self.pending
            .push_back(Ok(StreamEvent::ToolCallAnnounced(tool_calls_payload(&tool_calls))));
        self.phase = Phase::Tools {
            calls: tool_calls,
            index: 0,
        };
    }

    async fn fail(&mut self, error: crate::Error) -> crate::Result<StreamEvent> {
        warn!(conversation_id = %self.session.ctx.id(), error = %error, "Streaming conversation failed");
        self.close().await;
        self.phase = Phase::Done;
        Err(error)
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.session.close().await;
    }
}

impl Drop for StreamState {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        let ctx = Arc::clone(&self.session.ctx);
        let servers = Arc::clone(&self.session.servers);
        let functions = std::mem::take(&mut self.session.functions);
        let messages = std::mem::take(&mut self.session.conversation).into_messages();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                debug!(conversation_id = %ctx.id(), "Stream dropped, scheduling cleanup");
                handle.spawn(async move {
                    close_conversation(&ctx, &servers, &messages, &functions).await;
                });
            }
            Err(_) => warn!(
                conversation_id = %ctx.id(),
                "Stream dropped outside a runtime; conversation not closed"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::json;

    use crate::agent::{ConversationOrchestrator, FinalContent, StreamEvent};
    use crate::client::{Generation, GenerationChunk};
    use crate::mcp::{McpServerConfig, McpToolResult};
    use crate::testing::{MockConnector, MockServer, ScriptedAdapter};
    use crate::types::ToolCall;

    async fn collect(orchestrator: &ConversationOrchestrator, query: &str) -> Vec<crate::Result<StreamEvent>> {
        orchestrator.execute_stream(query).await.unwrap().collect().await
    }

    fn events(items: Vec<crate::Result<StreamEvent>>) -> Vec<StreamEvent> {
        items.into_iter().map(|e| e.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_complete_only_backend_is_reconciled() {
        let adapter = Arc::new(ScriptedAdapter::new().complete(Generation::text("4")));
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(MockConnector::new()))
            .build();

        let events = events(collect(&orchestrator, "2+2?").await);
        assert_eq!(
            events,
            vec![
                StreamEvent::TextDelta("4".into()),
                StreamEvent::Final(FinalContent::Text(String::new())),
            ]
        );
    }

    #[tokio::test]
    async fn test_deltas_then_missing_suffix() {
        let adapter = Arc::new(ScriptedAdapter::new().chunks(vec![
            GenerationChunk::Reasoning("hmm".into()),
            GenerationChunk::Text("Hel".into()),
            GenerationChunk::Text("lo".into()),
            GenerationChunk::Complete(Generation::text("Hello!")),
        ]));
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(MockConnector::new()))
            .build();

        let events = events(collect(&orchestrator, "hi").await);
        assert_eq!(
            events,
            vec![
                StreamEvent::Reasoning("hmm".into()),
                StreamEvent::TextDelta("Hel".into()),
                StreamEvent::TextDelta("lo".into()),
                StreamEvent::TextDelta("!".into()),
                StreamEvent::Final(FinalContent::Text(String::new())),
            ]
        );
    }

    #[tokio::test]
    async fn test_tool_call_ordering() {
        let connector = MockConnector::new().server(
            "weather",
            MockServer::new()
                .tool("forecast", "Forecast", json!({}))
                .respond("forecast", McpToolResult::text("sunny")),
        );
        let stats = connector.stats();
        let adapter = Arc::new(
            ScriptedAdapter::new()
                .complete(Generation::with_tool_calls(
                    "",
                    vec![ToolCall::new("c1", "weather_forecast", "{}")],
                ))
                .complete(Generation::text("Sunny.")),
        );
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(connector))
            .server("weather", McpServerConfig::process("weather"))
            .build();

        let events = events(collect(&orchestrator, "weather?").await);
        assert_eq!(events.len(), 4);
        match &events[0] {
            StreamEvent::ToolCallAnnounced(payload) => {
                assert_eq!(payload["data"][0]["name"], "weather_forecast")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        match &events[1] {
            StreamEvent::ToolResultReady(payload) => {
                assert_eq!(payload["data"][0]["content"], "sunny")
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events[2], StreamEvent::TextDelta("Sunny.".into()));
        assert!(matches!(events[3], StreamEvent::Final(_)));
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_structured_final() {
        let adapter = Arc::new(
            ScriptedAdapter::new().complete(Generation::text(r#"{"require_user_input": true}"#)),
        );
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(MockConnector::new()))
            .build();

        let events = events(collect(&orchestrator, "book a flight").await);
        assert_eq!(
            events.last(),
            Some(&StreamEvent::Final(FinalContent::Structured(
                json!({"require_user_input": true})
            )))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_heartbeat_while_backend_is_slow() {
        let adapter = Arc::new(
            ScriptedAdapter::new()
                .chunk_delay(Duration::from_millis(4500))
                .chunks(vec![
                    GenerationChunk::Text("late".into()),
                    GenerationChunk::Complete(Generation::text("late")),
                ]),
        );
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(MockConnector::new()))
            .build();

        let events = events(collect(&orchestrator, "hi").await);
        assert_eq!(events[0], StreamEvent::heartbeat());
        assert_eq!(events[1], StreamEvent::heartbeat());
        assert_eq!(events[2], StreamEvent::TextDelta("late".into()));
        assert!(events.iter().all(|e| !matches!(e, StreamEvent::TextDelta(t) if t.is_empty())));
        assert!(matches!(events.last(), Some(StreamEvent::Final(_))));
    }

    #[tokio::test]
    async fn test_generation_error_ends_stream() {
        let connector = MockConnector::new().server("fs", MockServer::new());
        let stats = connector.stats();
        let adapter = Arc::new(ScriptedAdapter::new().fail("backend down"));
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(connector))
            .server("fs", McpServerConfig::process("fs"))
            .build();

        let items = collect(&orchestrator, "hi").await;
        assert_eq!(items.len(), 1);
        assert!(items[0].is_err());
        assert_eq!(stats.closes(), 1);
    }

    #[tokio::test]
    async fn test_dropped_stream_closes_servers() {
        let connector = MockConnector::new().server("fs", MockServer::new());
        let stats = connector.stats();
        let adapter = Arc::new(ScriptedAdapter::new().chunks(vec![
            GenerationChunk::Text("partial".into()),
            GenerationChunk::Complete(Generation::text("partial")),
        ]));
        let orchestrator = ConversationOrchestrator::builder(adapter)
            .connector(Arc::new(connector))
            .server("fs", McpServerConfig::process("fs"))
            .build();

        let mut stream = Box::pin(orchestrator.execute_stream("hi").await.unwrap());
        assert!(stream.next().await.is_some());
        drop(stream);
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        assert_eq!(stats.closes(), 1);
    }
}
