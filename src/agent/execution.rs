//! Blocking conversation loop.

use tracing::{Instrument, debug, info};

use super::orchestrator::{ConversationOrchestrator, ConversationSession};
use crate::client::Generation;
use crate::types::Message;

impl ConversationOrchestrator {
    /// Runs the conversation to completion and returns the final assistant text.
    ///
    /// Generation failures end the conversation with an error; tool failures
    /// are fed back to the backend as tool messages. Servers are closed and
    /// the audit record written on every exit.
    pub async fn execute(&self, query: &str) -> crate::Result<String> {
        let mut session = self.open(query).await?;
        let span = session.ctx.spans().conversation_span(&self.model, "blocking");

        let outcome = self.run_loop(&mut session).instrument(span).await;
        session.close().await;

        if let Ok(text) = &outcome {
            info!(
                conversation_id = %session.ctx.id(),
                messages = session.conversation.len(),
                chars = text.len(),
                "Conversation completed"
            );
        }
        outcome
    }

    async fn run_loop(&self, session: &mut ConversationSession) -> crate::Result<String> {
        loop {
            let turn = session.ctx.spans().turn_span();
            let Generation { text, tool_calls } = self
                .adapter
                .generate(session.conversation.messages(), &session.functions)
                .instrument(turn.clone())
                .await?;

            session
                .conversation
                .push(Message::assistant_with_calls(text.clone(), tool_calls.clone()));
            if tool_calls.is_empty() {
                return Ok(text);
            }

            debug!(count = tool_calls.len(), "Running tool calls");
            for call in &tool_calls {
                let result = self
                    .router
                    .invoke(call, &session.servers, &session.ctx)
                    .instrument(turn.clone())
                    .await;
                session.conversation.push(result.to_message());
            }
        }
    }
}
