// Insight session controller
//
// Owns one chat panel's question/answer exchange. The lifecycle of a single
// answer stream:
//
//   ask() ──▶ [Connecting] ──Status──▶ [status text]
//                  │                        │
//                  └──Partial──▶ [Streaming] ◀┘   (text replaced each time)
//                                   │
//               Done ──▶ [Completed]   Error / idle timeout / EOF ──▶ [Error]
//
// At most one stream is active. Each stream gets a generation number; a new
// ask() or cancel() bumps the generation before the old task is aborted, and
// every event is checked against it while the view is locked, so a late
// event from a superseded stream can never touch the current state.

use super::clean::clean;
use super::events::StreamEvent;
use super::messages::{ChatMessage, ChatView, MessageId};
use crate::api::models::UserId;
use crate::error::{ApiError, InsightError};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Fallback bubble text when a stream fails before producing any answer
pub const DEFAULT_FALLBACK_MESSAGE: &str =
    "Sorry, I couldn't generate a response right now. Please try again.";

/// Source of answer streams (the backend's streaming ask endpoint)
pub trait AnswerTransport: Send + Sync + 'static {
    /// Start streaming the answer to `question`. Transport failures are
    /// yielded as `Err` items; the stream ends after the last event.
    fn stream_answer(
        &self,
        question: &str,
        user_id: &UserId,
    ) -> BoxStream<'static, Result<StreamEvent, ApiError>>;
}

/// Tunables for the controller
#[derive(Debug, Clone)]
pub struct InsightSettings {
    /// Abort the stream when no event arrives for this long
    pub idle_timeout: Option<Duration>,
    /// Bubble text used when a stream fails with nothing received
    pub fallback_message: String,
}

impl Default for InsightSettings {
    fn default() -> Self {
        Self {
            idle_timeout: Some(Duration::from_secs(60)),
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

struct ActiveStream {
    generation: u64,
    bot_message: MessageId,
    task: JoinHandle<()>,
}

/// Shared between the controller and its stream task
struct Shared {
    view: watch::Sender<ChatView>,
    active: Mutex<Option<ActiveStream>>,
    generation: AtomicU64,
}

impl Shared {
    /// Apply a stream event if `generation` is still current.
    /// Returns false when the event was discarded as stale.
    fn apply(
        &self,
        generation: u64,
        bot_message: MessageId,
        event: StreamEvent,
        fallback: &str,
    ) -> bool {
        let mut applied = false;
        self.view.send_modify(|view| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            applied = true;
            match event {
                StreamEvent::Status(text) => view.status = text,
                StreamEvent::Partial(snapshot) => {
                    if let Some(msg) = view.message_mut(bot_message) {
                        msg.text = clean(snapshot.as_str());
                        msg.is_streaming = true;
                    }
                }
                StreamEvent::Done => {
                    if let Some(msg) = view.message_mut(bot_message) {
                        msg.is_streaming = false;
                    }
                    view.status = "Completed".to_string();
                }
                StreamEvent::Error(message) => {
                    if let Some(msg) = view.message_mut(bot_message) {
                        if msg.text.is_empty() {
                            msg.text = fallback.to_string();
                        }
                        msg.error = true;
                        msg.is_streaming = false;
                    }
                    view.status = format!("Error: {}", message);
                }
            }
        });
        applied
    }

    /// Drop the active handle if it still belongs to `generation`
    fn release(&self, generation: u64) {
        let mut active = self.active.lock();
        if active.as_ref().is_some_and(|a| a.generation == generation) {
            *active = None;
        }
    }

    /// Stop the active stream (if any) and freeze its bot message
    fn supersede(&self, active: &mut Option<ActiveStream>) -> Option<MessageId> {
        let previous = active.take()?;
        self.generation.fetch_add(1, Ordering::SeqCst);
        previous.task.abort();
        self.view.send_modify(|view| {
            if let Some(msg) = view.message_mut(previous.bot_message) {
                msg.is_streaming = false;
            }
        });
        tracing::debug!(
            "Cancelled stream generation {} ({})",
            previous.generation,
            previous.bot_message
        );
        Some(previous.bot_message)
    }
}

/// Drives question/answer exchanges for one chat panel
pub struct InsightController<T: AnswerTransport> {
    transport: Arc<T>,
    settings: InsightSettings,
    shared: Arc<Shared>,
    next_message_id: AtomicU64,
}

impl<T: AnswerTransport> InsightController<T> {
    pub fn new(transport: Arc<T>, settings: InsightSettings) -> Self {
        let (view, _) = watch::channel(ChatView::default());
        Self {
            transport,
            settings,
            shared: Arc::new(Shared {
                view,
                active: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Receive a fresh [`ChatView`] after every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatView> {
        self.shared.view.subscribe()
    }

    /// Current state of the panel
    pub fn view(&self) -> ChatView {
        self.shared.view.borrow().clone()
    }

    /// Whether an answer stream is in flight
    pub fn is_streaming(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    /// Ask a question. Cancels any in-flight answer first.
    ///
    /// Returns the id of the bot message that will receive the answer, or
    /// `None` when the question is blank (nothing is changed in that case).
    /// Must be called from within a Tokio runtime.
    pub fn ask(&self, question: &str, user_id: &str) -> Result<Option<MessageId>, InsightError> {
        let question = question.trim();
        if question.is_empty() {
            return Ok(None);
        }
        let user_id =
            UserId::parse(user_id).ok_or_else(|| InsightError::InvalidUserId(user_id.to_string()))?;

        // Held until the new task handle is stored so a fast-finishing task
        // cannot release before it is registered
        let mut active = self.shared.active.lock();
        self.shared.supersede(&mut active);
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let user_message = self.next_id();
        let bot_message = self.next_id();
        self.shared.view.send_modify(|view| {
            view.messages.push(ChatMessage::user(user_message, question));
            view.messages.push(ChatMessage::bot_placeholder(bot_message));
            view.status = "Connecting...".to_string();
        });

        tracing::info!(
            "Asking insight question ({} chars) for user {} [generation {}]",
            question.len(),
            user_id,
            generation
        );

        let stream = self.transport.stream_answer(question, &user_id);
        let task = tokio::spawn(consume_stream(
            stream,
            Arc::clone(&self.shared),
            generation,
            bot_message,
            self.settings.clone(),
        ));

        *active = Some(ActiveStream {
            generation,
            bot_message,
            task,
        });

        Ok(Some(bot_message))
    }

    /// Abort the in-flight answer, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        let mut active = self.shared.active.lock();
        match self.shared.supersede(&mut active) {
            Some(_) => {
                self.shared
                    .view
                    .send_modify(|view| view.status = "Cancelled".to_string());
                true
            }
            None => false,
        }
    }

    fn next_id(&self) -> MessageId {
        MessageId(self.next_message_id.fetch_add(1, Ordering::SeqCst))
    }
}

impl<T: AnswerTransport> Drop for InsightController<T> {
    fn drop(&mut self) {
        if let Some(active) = self.shared.active.lock().take() {
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            active.task.abort();
        }
    }
}

/// Pump one answer stream into the shared view until it terminates
async fn consume_stream(
    mut stream: BoxStream<'static, Result<StreamEvent, ApiError>>,
    shared: Arc<Shared>,
    generation: u64,
    bot_message: MessageId,
    settings: InsightSettings,
) {
    let fallback = settings.fallback_message.as_str();

    loop {
        let next = match settings.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, stream.next()).await {
                Ok(next) => next,
                Err(_) => {
                    tracing::warn!(
                        "Answer stream idle for {:?}, cancelling [generation {}]",
                        idle,
                        generation
                    );
                    let message = format!("No response for {:?}", idle);
                    shared.apply(generation, bot_message, StreamEvent::Error(message), fallback);
                    break;
                }
            },
            None => stream.next().await,
        };

        let event = match next {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                tracing::error!("Answer stream failed: {}", e);
                StreamEvent::Error(e.user_message())
            }
            None => {
                tracing::warn!("Answer stream ended without completion");
                StreamEvent::Error("Stream ended unexpectedly".to_string())
            }
        };

        let terminal = matches!(event, StreamEvent::Done | StreamEvent::Error(_));
        if !shared.apply(generation, bot_message, event, fallback) {
            tracing::debug!("Dropping stale event for generation {}", generation);
            return;
        }
        if terminal {
            break;
        }
    }

    shared.release(generation);
}
