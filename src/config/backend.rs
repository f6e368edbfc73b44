//! Backend configuration: HTTP client, answer stream, session paging

use serde::Deserialize;

use crate::insights::{PayloadMode, DEFAULT_FALLBACK_MESSAGE};
use crate::sessions::DEFAULT_PAGE_SIZE;

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Client
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP timeouts and endpoint path templates
#[derive(Debug, Clone, PartialEq)]
pub struct ApiConfig {
    /// Timeout for non-streaming requests (seconds)
    pub request_timeout_secs: u64,
    /// TCP/TLS connect timeout (seconds)
    pub connect_timeout_secs: u64,
    /// Streaming ask endpoint
    pub ask_path: String,
    /// Session listing endpoint, with `{project}` and `{visitor}` placeholders
    pub sessions_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            connect_timeout_secs: 10,
            ask_path: "/ai/ask/stream".to_string(),
            sessions_path: "/analytics/{project}/visitors/{visitor}/sessions".to_string(),
        }
    }
}

/// [api] section as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileApiConfig {
    pub request_timeout_secs: Option<u64>,
    pub connect_timeout_secs: Option<u64>,
    pub ask_path: Option<String>,
    pub sessions_path: Option<String>,
}

impl ApiConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileApiConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            connect_timeout_secs: file
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
            ask_path: file.ask_path.unwrap_or(defaults.ask_path),
            sessions_path: file.sessions_path.unwrap_or(defaults.sessions_path),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Answer Stream
// ─────────────────────────────────────────────────────────────────────────────

/// Answer stream handling
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Abort an answer stream after this many silent seconds (0 = never)
    pub idle_timeout_secs: u64,
    /// Whether partial payloads are full snapshots or deltas
    pub payload: PayloadMode,
    /// Bubble text when a stream fails before any answer arrived
    pub fallback_message: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 60,
            payload: PayloadMode::Cumulative,
            fallback_message: DEFAULT_FALLBACK_MESSAGE.to_string(),
        }
    }
}

/// [stream] section as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileStreamConfig {
    pub idle_timeout_secs: Option<u64>,
    pub payload: Option<String>,
    pub fallback_message: Option<String>,
}

impl StreamConfig {
    /// Create from file config with defaults
    pub fn from_file(file: Option<FileStreamConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            idle_timeout_secs: file.idle_timeout_secs.unwrap_or(defaults.idle_timeout_secs),
            payload: file
                .payload
                .map(|s| PayloadMode::from_str(&s))
                .unwrap_or(defaults.payload),
            fallback_message: file
                .fallback_message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(defaults.fallback_message),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Paging
// ─────────────────────────────────────────────────────────────────────────────

/// Session table paging
#[derive(Debug, Clone, PartialEq)]
pub struct SessionsConfig {
    /// Rows loaded by the first fetch and after a clear
    pub page_size: usize,
    /// Concurrent session lookups per fetch
    pub max_concurrency: usize,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_concurrency: 8,
        }
    }
}

/// [sessions] section as loaded from config file
#[derive(Debug, Deserialize, Default)]
pub struct FileSessionsConfig {
    pub page_size: Option<usize>,
    pub max_concurrency: Option<usize>,
}

impl SessionsConfig {
    /// Create from file config with defaults; zero values fall back
    pub fn from_file(file: Option<FileSessionsConfig>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            page_size: file
                .page_size
                .filter(|n| *n > 0)
                .unwrap_or(defaults.page_size),
            max_concurrency: file
                .max_concurrency
                .filter(|n| *n > 0)
                .unwrap_or(defaults.max_concurrency),
        }
    }
}
