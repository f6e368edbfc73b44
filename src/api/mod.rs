//! HTTP client for the analytics backend
//!
//! Two endpoints are used: the streaming ask endpoint (SSE answer stream)
//! and the per-visitor session listing. Endpoint paths are templates
//! relative to `api_url`; `{project}` and `{visitor}` placeholders are
//! substituted as percent-encoded path segments.

pub mod models;
pub mod sse;

use crate::config::Config;
use crate::error::ApiError;
use crate::insights::{AnswerTransport, EventClassifier, PayloadMode, StreamEvent};
use crate::sessions::SessionDirectory;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use models::{ProjectId, SessionList, UserId, VisitorId};
use reqwest::{RequestBuilder, Response, Url};
use sse::{is_sse_response, SseDecoder, SseFrame};
use std::collections::VecDeque;
use std::time::Duration;

/// Client for the analytics backend
#[derive(Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: Url,
    token: Option<String>,
    request_timeout: Duration,
    ask_path: String,
    sessions_path: String,
    payload: PayloadMode,
}

impl ApiClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// Returns `ApiError::Setup` if the base URL is invalid or the HTTP
    /// client cannot be created
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.api_url)
            .map_err(|e| ApiError::Setup(format!("Invalid api_url {:?}: {}", config.api_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Setup(format!(
                "api_url cannot carry a path: {}",
                config.api_url
            )));
        }

        // No overall timeout here: answer streams stay open for as long as
        // the backend keeps talking. REST calls set one per request.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.api.connect_timeout_secs))
            .build()
            .map_err(|e| ApiError::Setup(format!("Failed to create HTTP client: {}", e)))?;

        tracing::info!(
            "Initialized API client: {} (stream payload: {}, auth: {})",
            base_url,
            config.stream.payload.as_str(),
            if config.token.is_some() { "bearer" } else { "none" }
        );

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            request_timeout: Duration::from_secs(config.api.request_timeout_secs),
            ask_path: config.api.ask_path.clone(),
            sessions_path: config.api.sessions_path.clone(),
            payload: config.stream.payload,
        })
    }

    /// Fetch every session of one visitor
    pub async fn get_all_sessions(
        &self,
        project: &ProjectId,
        visitor: &VisitorId,
    ) -> Result<SessionList, ApiError> {
        let url = self.endpoint(
            &self.sessions_path,
            &[("project", project.as_str()), ("visitor", visitor.as_str())],
        )?;
        tracing::debug!("GET {}", url);

        let response = self
            .authorize(self.client.get(url))
            .timeout(self.request_timeout)
            .send()
            .await?;
        let response = check_status(response).await?;

        let body = response.bytes().await?;
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::Decode(format!("Failed to parse session list: {}", e)))
    }

    fn ask_request(&self, question: &str, user_id: &UserId) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(&self.ask_path, &[])?;
        Ok(self
            .authorize(self.client.post(url))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(&serde_json::json!({
                "question": question,
                "user_id": user_id.as_str(),
            })))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Resolve an endpoint template against the base URL
    fn endpoint(&self, template: &str, params: &[(&str, &str)]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| ApiError::Setup(format!("api_url cannot carry a path: {}", self.base_url)))?;
            segments.pop_if_empty();

            for raw in template.split('/').filter(|s| !s.is_empty()) {
                let segment = match raw.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Some(name) => params
                        .iter()
                        .find(|(key, _)| *key == name)
                        .map(|(_, value)| *value)
                        .ok_or_else(|| {
                            ApiError::Setup(format!("Unknown placeholder {{{}}} in {}", name, template))
                        })?,
                    None => raw,
                };
                segments.push(segment);
            }
        }
        Ok(url)
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = response.text().await.unwrap_or_default();
    tracing::warn!("Backend returned {}: {}", status, message);
    Err(ApiError::Status {
        status: status.as_u16(),
        message: message.trim().to_string(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Answer stream
// ─────────────────────────────────────────────────────────────────────────────

struct AnswerReader {
    body: BoxStream<'static, reqwest::Result<Bytes>>,
    decoder: SseDecoder,
    classifier: EventClassifier,
    queue: VecDeque<StreamEvent>,
    eof: bool,
}

impl AnswerReader {
    fn push(&mut self, frame: &SseFrame) {
        if let Some(event) = self.classifier.classify(frame) {
            self.queue.push_back(event);
        }
    }
}

enum AnswerState {
    Pending {
        request: Result<RequestBuilder, ApiError>,
        classifier: EventClassifier,
    },
    Reading(Box<AnswerReader>),
    Finished,
}

async fn next_answer_event(
    mut state: AnswerState,
) -> Option<(Result<StreamEvent, ApiError>, AnswerState)> {
    loop {
        state = match state {
            AnswerState::Pending { request, classifier } => {
                let opened = match request {
                    Ok(request) => open_answer_stream(request).await,
                    Err(e) => Err(e),
                };
                match opened {
                    Ok(body) => AnswerState::Reading(Box::new(AnswerReader {
                        body,
                        decoder: SseDecoder::new(),
                        classifier,
                        queue: VecDeque::new(),
                        eof: false,
                    })),
                    Err(e) => return Some((Err(e), AnswerState::Finished)),
                }
            }
            AnswerState::Reading(mut reader) => {
                if let Some(event) = reader.queue.pop_front() {
                    return Some((Ok(event), AnswerState::Reading(reader)));
                }
                if reader.eof {
                    return None;
                }
                match reader.body.next().await {
                    Some(Ok(chunk)) => {
                        for frame in reader.decoder.feed(&chunk) {
                            reader.push(&frame);
                        }
                    }
                    Some(Err(e)) => return Some((Err(ApiError::Network(e)), AnswerState::Finished)),
                    None => {
                        reader.eof = true;
                        if let Some(frame) = reader.decoder.finish() {
                            reader.push(&frame);
                        }
                    }
                }
                AnswerState::Reading(reader)
            }
            AnswerState::Finished => return None,
        }
    }
}

async fn open_answer_stream(
    request: RequestBuilder,
) -> Result<BoxStream<'static, reqwest::Result<Bytes>>, ApiError> {
    let response = check_status(request.send().await?).await?;
    if !is_sse_response(response.headers()) {
        tracing::debug!("Answer stream is not text/event-stream, reading as JSON lines");
    }
    Ok(response.bytes_stream().boxed())
}

impl AnswerTransport for ApiClient {
    fn stream_answer(
        &self,
        question: &str,
        user_id: &UserId,
    ) -> BoxStream<'static, Result<StreamEvent, ApiError>> {
        tracing::debug!("Asking as {}: {}", user_id, question);
        let state = AnswerState::Pending {
            request: self.ask_request(question, user_id),
            classifier: EventClassifier::new(self.payload),
        };
        futures::stream::unfold(state, next_answer_event).boxed()
    }
}

impl SessionDirectory for ApiClient {
    fn visitor_sessions<'a>(
        &'a self,
        project: &'a ProjectId,
        visitor: &'a VisitorId,
    ) -> BoxFuture<'a, Result<SessionList, ApiError>> {
        Box::pin(self.get_all_sessions(project, visitor))
    }
}
