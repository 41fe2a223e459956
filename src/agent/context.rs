//! Per-conversation context.

use crate::audit::AuditLog;
use crate::observability::SpanContext;

/// Threaded through the orchestrator and router for one conversation.
///
/// Carries the conversation id, the span factory and the optional audit sink
/// so nothing has to live in process-wide state.
#[derive(Debug)]
pub struct ConversationContext {
    spans: SpanContext,
    audit: Option<AuditLog>,
}

impl ConversationContext {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            spans: SpanContext::new(id),
            audit: None,
        }
    }

    /// Context with a fresh random id.
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_audit(mut self, audit: Option<AuditLog>) -> Self {
        self.audit = audit;
        self
    }

    pub fn id(&self) -> &str {
        self.spans.conversation_id()
    }

    pub fn spans(&self) -> &SpanContext {
        &self.spans
    }

    pub fn audit(&self) -> Option<&AuditLog> {
        self.audit.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_unique() {
        let a = ConversationContext::generate();
        let b = ConversationContext::generate();
        assert_ne!(a.id(), b.id());
        assert!(a.audit().is_none());
    }

    #[test]
    fn test_with_audit() {
        let ctx = ConversationContext::new("conv-1").with_audit(Some(AuditLog::new("audit.jsonl")));
        assert_eq!(ctx.id(), "conv-1");
        assert_eq!(ctx.spans().conversation_id(), "conv-1");
        assert!(ctx.audit().is_some());
    }
}
