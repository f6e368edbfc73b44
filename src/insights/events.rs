// Stream events for the AI insight endpoint
//
// Every SSE frame is classified into exactly one of four events. Partial
// answers are always delivered as a cumulative snapshot (the whole answer so
// far); when the backend streams deltas instead, the classifier does the
// accumulation so consumers can only ever replace, never append.

use crate::api::sse::SseFrame;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The complete answer text received so far
///
/// Deliberately has no way to append: a newer snapshot supersedes an older
/// one wholesale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerSnapshot(String);

impl AnswerSnapshot {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// One classified event of an answer stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// Human-readable phase label ("Thinking...", "Running SQL...")
    Status(String),
    /// Answer text so far
    Partial(AnswerSnapshot),
    /// Stream finished successfully
    Done,
    /// Stream failed; the message is user-facing
    Error(String),
}

/// How the backend encodes partial answers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadMode {
    /// Each partial payload is the full answer so far
    #[default]
    Cumulative,
    /// Each partial payload is only the newly generated text
    Delta,
}

impl PayloadMode {
    /// Parse mode string from config
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "delta" => Self::Delta,
            _ => Self::Cumulative,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cumulative => "cumulative",
            Self::Delta => "delta",
        }
    }
}

/// Frame kinds understood by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Status,
    Partial,
    Done,
    Error,
}

impl FrameKind {
    fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "status" | "thinking" => Some(Self::Status),
            "message" | "partial" | "content" | "answer" | "token" => Some(Self::Partial),
            "done" | "end" | "complete" => Some(Self::Done),
            "error" => Some(Self::Error),
            _ => None,
        }
    }
}

/// Turns SSE frames into [`StreamEvent`]s for a single answer stream
#[derive(Debug, Default)]
pub struct EventClassifier {
    mode: PayloadMode,
    accumulated: String,
}

impl EventClassifier {
    pub fn new(mode: PayloadMode) -> Self {
        Self {
            mode,
            accumulated: String::new(),
        }
    }

    /// Classify one frame. Returns `None` for frames of unknown kind.
    pub fn classify(&mut self, frame: &SseFrame) -> Option<StreamEvent> {
        let data = frame.data.trim();
        if data == "[DONE]" {
            return Some(StreamEvent::Done);
        }

        let json = serde_json::from_str::<Value>(data)
            .ok()
            .filter(Value::is_object);

        let kind_name = frame.event.clone().or_else(|| {
            json.as_ref()
                .and_then(|v| v.get("type"))
                .and_then(|t| t.as_str())
                .map(String::from)
        });

        let Some(kind) = kind_name.as_deref().and_then(FrameKind::from_name) else {
            tracing::debug!("Skipping stream frame of unknown kind: {:?}", kind_name);
            return None;
        };

        let text = match &json {
            Some(value) => payload_text(value).unwrap_or_default(),
            None => frame.data.clone(),
        };

        let event = match kind {
            FrameKind::Status => StreamEvent::Status(text),
            FrameKind::Partial => StreamEvent::Partial(self.snapshot(text)),
            FrameKind::Done => StreamEvent::Done,
            FrameKind::Error => {
                if text.trim().is_empty() {
                    StreamEvent::Error("Unknown error".to_string())
                } else {
                    StreamEvent::Error(text)
                }
            }
        };
        Some(event)
    }

    fn snapshot(&mut self, text: String) -> AnswerSnapshot {
        match self.mode {
            PayloadMode::Cumulative => AnswerSnapshot::new(text),
            PayloadMode::Delta => {
                self.accumulated.push_str(&text);
                AnswerSnapshot::new(self.accumulated.clone())
            }
        }
    }
}

/// Payload text from the first present field
fn payload_text(value: &Value) -> Option<String> {
    ["content", "text", "message", "status", "error"]
        .iter()
        .filter_map(|key| value.get(*key))
        .find_map(|field| match field {
            Value::String(s) => Some(s.clone()),
            Value::Object(obj) => obj
                .get("message")
                .and_then(|m| m.as_str())
                .map(String::from),
            _ => None,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(event: Option<&str>, data: &str) -> SseFrame {
        SseFrame {
            event: event.map(String::from),
            data: data.to_string(),
        }
    }

    #[test]
    fn test_classify_by_event_name() {
        let mut classifier = EventClassifier::default();
        assert_eq!(
            classifier.classify(&frame(Some("status"), "Thinking...")),
            Some(StreamEvent::Status("Thinking...".to_string()))
        );
        assert_eq!(
            classifier.classify(&frame(Some("done"), "")),
            Some(StreamEvent::Done)
        );
    }

    #[test]
    fn test_classify_by_json_type() {
        let mut classifier = EventClassifier::default();
        assert_eq!(
            classifier.classify(&frame(None, r#"{"type":"message","content":"Hello"}"#)),
            Some(StreamEvent::Partial(AnswerSnapshot::new("Hello")))
        );
        assert_eq!(
            classifier.classify(&frame(None, r#"{"type":"error","error":{"message":"boom"}}"#)),
            Some(StreamEvent::Error("boom".to_string()))
        );
        assert_eq!(
            classifier.classify(&frame(None, "[DONE]")),
            Some(StreamEvent::Done)
        );
    }

    #[test]
    fn test_unknown_kind_skipped() {
        let mut classifier = EventClassifier::default();
        assert_eq!(classifier.classify(&frame(Some("ping"), "{}")), None);
        assert_eq!(classifier.classify(&frame(None, "plain text")), None);
    }

    #[test]
    fn test_cumulative_payloads_pass_through() {
        let mut classifier = EventClassifier::new(PayloadMode::Cumulative);
        classifier.classify(&frame(Some("message"), "Hel"));
        assert_eq!(
            classifier.classify(&frame(Some("message"), "Hello")),
            Some(StreamEvent::Partial(AnswerSnapshot::new("Hello")))
        );
    }

    #[test]
    fn test_delta_payloads_accumulate_into_snapshots() {
        let mut classifier = EventClassifier::new(PayloadMode::Delta);
        classifier.classify(&frame(Some("token"), "Hel"));
        assert_eq!(
            classifier.classify(&frame(Some("token"), "lo")),
            Some(StreamEvent::Partial(AnswerSnapshot::new("Hello")))
        );
    }

    #[test]
    fn test_empty_error_gets_placeholder() {
        let mut classifier = EventClassifier::default();
        assert_eq!(
            classifier.classify(&frame(Some("error"), "")),
            Some(StreamEvent::Error("Unknown error".to_string()))
        );
    }
}
