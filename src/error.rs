//! Error types for the backend client and the insight controller

use thiserror::Error;

/// Errors from talking to the analytics backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// Could not build the HTTP client or a request URL
    #[error("Client setup error: {0}")]
    Setup(String),

    /// Transport failure (connect, reset, timeout, broken body stream)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, or a placeholder when unreadable
        message: String,
    },

    /// Response body did not match the expected schema
    #[error("Malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Human-readable reason shown to the user
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { status, message } if message.is_empty() => {
                format!("Request failed with status {}", status)
            }
            Self::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Input validation errors raised by the insight controller before any
/// state is touched
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InsightError {
    /// A user id is required and must not be blank
    #[error("Invalid user id: {0:?}")]
    InvalidUserId(String),
}
