//! Append-only message history.

use crate::types::{Message, Role};

/// Ordered history replayed to the generation backend every turn.
///
/// Messages are only ever appended.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// System messages followed by the user's query.
    pub fn start(system: &[Message], query: &str) -> Self {
        let mut conversation = Self {
            messages: Vec::with_capacity(system.len() + 1),
        };
        conversation.messages.extend_from_slice(system);
        conversation.push(Message::user(query));
        conversation
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_assistant_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::Assistant)
            .and_then(Message::text)
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_orders_system_before_query() {
        let conversation = Conversation::start(&[Message::system("be terse")], "2+2?");
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.messages()[0].role, Role::System);
        assert_eq!(conversation.messages()[1].text(), Some("2+2?"));
    }

    #[test]
    fn test_last_assistant_text() {
        let mut conversation = Conversation::new();
        assert!(conversation.is_empty());
        assert!(conversation.last_assistant_text().is_none());

        conversation.push(Message::assistant("first"));
        conversation.push(Message::tool("c1", "fs_read", "data"));
        conversation.push(Message::assistant("second"));
        assert_eq!(conversation.last_assistant_text(), Some("second"));
    }
}
