//! Structured span definitions for tracing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{Level, Span, field, span};

/// Context for creating structured spans within one conversation.
#[derive(Debug)]
pub struct SpanContext {
    conversation_id: String,
    turn: AtomicU64,
}

impl SpanContext {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            turn: AtomicU64::new(0),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub fn next_turn(&self) -> u64 {
        self.turn.fetch_add(1, Ordering::Relaxed)
    }

    pub fn conversation_span(&self, model: &str, mode: &'static str) -> Span {
        span!(
            Level::INFO,
            "conversation.execute",
            conversation_id = %self.conversation_id,
            model = model,
            mode = mode,
        )
    }

    pub fn turn_span(&self) -> Span {
        let turn = self.next_turn();
        span!(
            Level::DEBUG,
            "conversation.turn",
            conversation_id = %self.conversation_id,
            turn = turn,
        )
    }

    pub fn tool_call_span(&self, server: &str, tool: &str, call_id: &str) -> ToolCallSpan {
        ToolCallSpan::new(&self.conversation_id, server, tool, call_id)
    }
}

/// Span covering one routed tool call.
pub struct ToolCallSpan {
    span: Span,
    start: Instant,
}

impl ToolCallSpan {
    pub fn new(conversation_id: &str, server: &str, tool: &str, call_id: &str) -> Self {
        let span = span!(
            Level::INFO,
            "tool.execute",
            conversation_id = conversation_id,
            server = server,
            tool = tool,
            call_id = call_id,
            is_error = field::Empty,
            duration_ms = field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
        }
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn finish(self, is_error: bool) {
        self.span.record("is_error", is_error);
        self.span
            .record("duration_ms", self.start.elapsed().as_millis() as u64);
    }
}

pub fn task_stream_span(task_id: &str, session_id: &str) -> Span {
    span!(
        Level::INFO,
        "task.stream",
        task_id = task_id,
        session_id = session_id,
        state = field::Empty,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_counter() {
        let spans = SpanContext::new("conv-1");
        assert_eq!(spans.next_turn(), 0);
        assert_eq!(spans.next_turn(), 1);
        assert_eq!(spans.conversation_id(), "conv-1");
    }

    #[test]
    fn test_tool_call_span_finish() {
        let spans = SpanContext::new("conv-1");
        let span = spans.tool_call_span("fs", "read", "call_1");
        span.finish(false);
    }
}
