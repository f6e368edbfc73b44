// Chat message model for the insight panel

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Locally generated, monotonically increasing message id
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord, Serialize)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "msg-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One bubble in the chat panel
///
/// Bot messages are created empty with `is_streaming = true` and rewritten in
/// place as snapshots arrive. Once `is_streaming` is false the message is
/// final.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatMessage {
    pub id: MessageId,
    pub sender: Sender,
    pub text: String,
    pub is_streaming: bool,
    pub error: bool,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(id: MessageId, text: impl Into<String>) -> Self {
        Self {
            id,
            sender: Sender::User,
            text: text.into(),
            is_streaming: false,
            error: false,
            timestamp: Utc::now(),
        }
    }

    /// Empty bot placeholder awaiting the first snapshot
    pub fn bot_placeholder(id: MessageId) -> Self {
        Self {
            id,
            sender: Sender::Bot,
            text: String::new(),
            is_streaming: true,
            error: false,
            timestamp: Utc::now(),
        }
    }
}

/// Everything the chat panel renders
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChatView {
    pub messages: Vec<ChatMessage>,
    /// Single visible status line ("Connecting...", "Thinking...", "Completed")
    pub status: String,
}

impl ChatView {
    pub fn message(&self, id: MessageId) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn message_mut(&mut self, id: MessageId) -> Option<&mut ChatMessage> {
        self.messages.iter_mut().find(|m| m.id == id)
    }
}
