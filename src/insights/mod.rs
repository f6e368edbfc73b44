//! AI insight chat: answer-stream events, display cleaning, and the
//! controller that turns a stream into chat state

pub mod clean;
pub mod controller;
pub mod events;
pub mod messages;

pub use clean::clean;
pub use controller::{AnswerTransport, InsightController, InsightSettings, DEFAULT_FALLBACK_MESSAGE};
pub use events::{AnswerSnapshot, EventClassifier, PayloadMode, StreamEvent};
pub use messages::{ChatMessage, ChatView, MessageId, Sender};
