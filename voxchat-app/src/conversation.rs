//! In-memory conversation shown to the user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Detected emotion; only set on user messages.
    pub emotion: Option<String>,
    pub confidence: Option<f32>,
    pub at: DateTime<Utc>,
}

/// Ordered message list. Oldest entries are dropped past `max_messages`.
#[derive(Debug, Clone)]
pub struct Conversation {
    messages: Vec<Message>,
    max_messages: usize,
}

impl Conversation {
    pub fn new(max_messages: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_messages: max_messages.max(2),
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>, emotion: Option<(String, f32)>) {
        let (emotion, confidence) = match emotion {
            Some((label, confidence)) => (Some(label), Some(confidence)),
            None => (None, None),
        };
        self.push(Message {
            role: Role::User,
            content: content.into(),
            emotion,
            confidence,
            at: Utc::now(),
        });
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.push(Message {
            role: Role::Assistant,
            content: content.into(),
            emotion: None,
            confidence: None,
            at: Utc::now(),
        });
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The last `n` messages, oldest first.
    pub fn recent(&self, n: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(n);
        &self.messages[start..]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    fn push(&mut self, message: Message) {
        self.messages.push(message);
        if self.messages.len() > self.max_messages {
            let excess = self.messages.len() - self.max_messages;
            self.messages.drain(..excess);
        }
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(200)
    }
}
