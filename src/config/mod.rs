//! Configuration for the statify client
//!
//! Configuration is loaded in order of precedence:
//! 1. Environment variables (highest priority)
//! 2. Config file (~/.config/statify/config.toml)
//! 3. Built-in defaults (lowest priority)

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::insights::InsightSettings;

// ─────────────────────────────────────────────────────────────────────────────
// Submodules
// ─────────────────────────────────────────────────────────────────────────────

mod backend;
mod logging;
mod serialization;

#[cfg(test)]
mod tests;

// ─────────────────────────────────────────────────────────────────────────────
// Re-exports
// ─────────────────────────────────────────────────────────────────────────────

pub use backend::{
    ApiConfig, FileApiConfig, FileSessionsConfig, FileStreamConfig, SessionsConfig, StreamConfig,
};
pub use logging::{FileLogging, LogRotation, LoggingConfig};

// ─────────────────────────────────────────────────────────────────────────────
// Constants
// ─────────────────────────────────────────────────────────────────────────────

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Backend used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

// ─────────────────────────────────────────────────────────────────────────────
// Application Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Analytics backend base URL
    pub api_url: String,

    /// Static bearer token attached to every request
    pub token: Option<String>,

    /// HTTP timeouts and endpoint paths
    pub api: ApiConfig,

    /// Answer stream handling
    pub stream: StreamConfig,

    /// Session table paging
    pub sessions: SessionsConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: None,
            api: ApiConfig::default(),
            stream: StreamConfig::default(),
            sessions: SessionsConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Configuration (deserialization layer)
// ─────────────────────────────────────────────────────────────────────────────

/// Config file structure
#[derive(Debug, Deserialize, Default)]
pub(crate) struct FileConfig {
    pub api_url: Option<String>,
    pub token: Option<String>,

    /// Optional [api] section
    pub api: Option<FileApiConfig>,

    /// Optional [stream] section
    pub stream: Option<FileStreamConfig>,

    /// Optional [sessions] section
    pub sessions: Option<FileSessionsConfig>,

    /// Optional [logging] section
    pub logging: Option<FileLogging>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Configuration Loading
// ─────────────────────────────────────────────────────────────────────────────

impl Config {
    /// Get the config file path: ~/.config/statify/config.toml
    /// Uses Unix-style ~/.config on all platforms for consistency
    pub fn config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(".config").join("statify").join("config.toml"))
    }

    /// Create config file with defaults if it doesn't exist
    pub fn ensure_config_exists() {
        let Some(path) = Self::config_path() else {
            return;
        };

        if path.exists() {
            return;
        }

        if let Some(parent) = path.parent() {
            if std::fs::create_dir_all(parent).is_err() {
                return; // Config is optional
            }
        }

        // Config::default().to_toml() is the single source of truth
        let _ = std::fs::write(&path, Self::default().to_toml());
    }

    /// Load the config file at `path`.
    ///
    /// A missing file yields defaults. A file that exists but cannot be read
    /// or parsed is an error: a broken config should fail fast, not silently
    /// fall back to defaults while the user debugs the wrong thing.
    pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(FileConfig::default()),
            Err(e) => {
                Err(e).with_context(|| format!("Cannot read config file {}", path.display()))
            }
        }
    }

    /// Load configuration: env vars > config file > defaults
    pub fn from_env() -> Result<Self> {
        let file = match Self::config_path() {
            Some(path) => Self::load_file_config(&path)?,
            None => FileConfig::default(),
        };
        Ok(Self::merge(file, |key| std::env::var(key).ok()))
    }

    /// Merge a parsed file with overrides looked up through `env`
    pub(crate) fn merge(file: FileConfig, env: impl Fn(&str) -> Option<String>) -> Self {
        // API URL: env > file > default
        let api_url = env("STATIFY_API_URL")
            .or(file.api_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        // Token: env > file, empty means none
        let token = env("STATIFY_TOKEN")
            .or(file.token)
            .filter(|t| !t.trim().is_empty());

        let api = ApiConfig::from_file(file.api);

        let mut stream = StreamConfig::from_file(file.stream);
        if let Some(secs) = env("STATIFY_IDLE_TIMEOUT").and_then(|v| v.parse().ok()) {
            stream.idle_timeout_secs = secs;
        }

        let mut sessions = SessionsConfig::from_file(file.sessions);
        if let Some(size) = env("STATIFY_PAGE_SIZE")
            .and_then(|v| v.parse().ok())
            .filter(|size: &usize| *size > 0)
        {
            sessions.page_size = size;
        }

        let logging = LoggingConfig::from_file(file.logging);

        Self {
            api_url,
            token,
            api,
            stream,
            sessions,
            logging,
        }
    }

    /// Controller settings derived from the [stream] section
    pub fn insight_settings(&self) -> InsightSettings {
        InsightSettings {
            idle_timeout: (self.stream.idle_timeout_secs > 0)
                .then(|| Duration::from_secs(self.stream.idle_timeout_secs)),
            fallback_message: self.stream.fallback_message.clone(),
        }
    }
}
