//! Bounded conversation history.
//!
//! The system message is pinned at position zero and never evicted. Turn
//! messages (user/assistant) live in a deque capped at a fixed window;
//! the oldest turn is dropped first. This bounds request size for the chat
//! service regardless of how long the session runs.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Role tag for a chat message, matching the wire format of
/// OpenAI-compatible chat services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Bounded conversation history with a pinned system message.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    system: ChatMessage,
    turns: VecDeque<ChatMessage>,
    /// Maximum number of retained non-system messages.
    max_turn_messages: usize,
}

impl ConversationHistory {
    pub fn new(system_prompt: impl Into<String>, max_turn_messages: usize) -> Self {
        Self {
            system: ChatMessage::system(system_prompt),
            turns: VecDeque::new(),
            max_turn_messages,
        }
    }

    /// Append a user message, evicting the oldest turn if over the window.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::user(content));
    }

    /// Append an assistant message, evicting the oldest turn if over the window.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(ChatMessage::assistant(content));
    }

    fn push(&mut self, msg: ChatMessage) {
        debug_assert!(msg.role != Role::System);
        self.turns.push_back(msg);
        while self.turns.len() > self.max_turn_messages {
            self.turns.pop_front();
        }
    }

    /// Full message list for a chat request: system first, then turns in order.
    pub fn messages(&self) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(1 + self.turns.len());
        out.push(self.system.clone());
        out.extend(self.turns.iter().cloned());
        out
    }

    /// Total message count including the system message.
    pub fn len(&self) -> usize {
        1 + self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        false // the system message is always present
    }
}
