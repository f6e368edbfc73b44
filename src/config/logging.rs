//! The `[logging]` section

use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};

/// How often the JSON log file rolls over
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    /// One file for the life of the install
    Never,
}

impl LogRotation {
    fn rotation(self) -> Rotation {
        match self {
            Self::Hourly => Rotation::HOURLY,
            Self::Daily => Rotation::DAILY,
            Self::Never => Rotation::NEVER,
        }
    }
}

impl fmt::Display for LogRotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hourly => "hourly",
            Self::Daily => "daily",
            Self::Never => "never",
        })
    }
}

/// Where statify logs go besides stderr
#[derive(Debug, Clone, PartialEq)]
pub struct LoggingConfig {
    /// Level for the `statify` target when RUST_LOG is unset
    pub level: String,
    pub file_enabled: bool,
    pub file_dir: PathBuf,
    pub file_rotation: LogRotation,
    /// Files are named `<prefix>.<period>`
    pub file_prefix: String,
}

/// Log directory under the platform data dir, or `./logs` without one
fn default_log_dir() -> PathBuf {
    dirs::data_local_dir()
        .map(|dir| dir.join("statify").join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_enabled: false,
            file_dir: default_log_dir(),
            file_rotation: LogRotation::default(),
            file_prefix: "statify".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn from_file(file: Option<FileLogging>) -> Self {
        let file = file.unwrap_or_default();
        let defaults = Self::default();

        Self {
            level: file.level.unwrap_or(defaults.level),
            file_enabled: file.file_enabled.unwrap_or(defaults.file_enabled),
            file_dir: file.file_dir.unwrap_or(defaults.file_dir),
            file_rotation: file.file_rotation.unwrap_or(defaults.file_rotation),
            file_prefix: file
                .file_prefix
                .filter(|p| !p.trim().is_empty())
                .unwrap_or(defaults.file_prefix),
        }
    }

    /// Rolling writer for the JSON log file, `None` when file logging is off.
    /// Creates `file_dir` if needed.
    pub fn file_appender(&self) -> Result<Option<RollingFileAppender>, InitError> {
        if !self.file_enabled {
            return Ok(None);
        }
        RollingFileAppender::builder()
            .rotation(self.file_rotation.rotation())
            .filename_prefix(self.file_prefix.as_str())
            .build(&self.file_dir)
            .map(Some)
    }
}

/// `[logging]` as written in the config file
#[derive(Debug, Deserialize, Default)]
pub struct FileLogging {
    pub level: Option<String>,
    pub file_enabled: Option<bool>,
    pub file_dir: Option<PathBuf>,
    pub file_rotation: Option<LogRotation>,
    pub file_prefix: Option<String>,
}
