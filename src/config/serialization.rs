//! Config serialization to TOML
//!
//! Single source of truth for config file format.

use super::Config;

/// Quote a string as a TOML basic string
fn quote(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

impl Config {
    /// Serialize config to TOML format with comments
    pub fn to_toml(&self) -> String {
        let token = match &self.token {
            Some(token) => format!("token = {}", quote(token)),
            None => "# token = \"\"".to_string(),
        };

        format!(
            r#"# statify configuration

# Analytics backend base URL (STATIFY_API_URL overrides)
api_url = {api_url}

# Static bearer token (STATIFY_TOKEN overrides)
{token}

# HTTP client
[api]
request_timeout_secs = {request_timeout}
connect_timeout_secs = {connect_timeout}
ask_path = {ask_path}
# {{project}} and {{visitor}} are substituted per request
sessions_path = {sessions_path}

# AI insight answer stream
[stream]
# Give up after this many seconds without an event, 0 disables (STATIFY_IDLE_TIMEOUT overrides)
idle_timeout_secs = {idle_timeout}
payload = "{payload}"  # cumulative, delta
fallback_message = {fallback}

# Session table paging
[sessions]
page_size = {page_size}  # STATIFY_PAGE_SIZE overrides
max_concurrency = {max_concurrency}

# Logging configuration (RUST_LOG env var overrides)
[logging]
level = "{log_level}"
# JSON file logging in addition to stderr
file_enabled = {log_file_enabled}
file_dir = {log_file_dir}
file_rotation = "{log_file_rotation}"  # hourly, daily, never
file_prefix = {log_file_prefix}
"#,
            api_url = quote(&self.api_url),
            token = token,
            request_timeout = self.api.request_timeout_secs,
            connect_timeout = self.api.connect_timeout_secs,
            ask_path = quote(&self.api.ask_path),
            sessions_path = quote(&self.api.sessions_path),
            idle_timeout = self.stream.idle_timeout_secs,
            payload = self.stream.payload.as_str(),
            fallback = quote(&self.stream.fallback_message),
            page_size = self.sessions.page_size,
            max_concurrency = self.sessions.max_concurrency,
            log_level = self.logging.level,
            log_file_enabled = self.logging.file_enabled,
            log_file_dir = quote(&self.logging.file_dir.to_string_lossy()),
            log_file_rotation = self.logging.file_rotation,
            log_file_prefix = quote(&self.logging.file_prefix),
        )
    }

    /// Save config to the default config file path
    pub fn save(&self) -> Result<(), std::io::Error> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Could not determine config path",
            ));
        };

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(&path, self.to_toml())
    }
}
