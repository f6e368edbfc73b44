//! Configuration tests
//!
//! Round-trips `to_toml()` through the file layer so a field added to one
//! side but not the other shows up as a failure here.

use super::*;
use crate::insights::PayloadMode;
use std::collections::HashMap;

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

fn reparse(config: &Config) -> Config {
    let toml_str = config.to_toml();
    let file: FileConfig = toml::from_str(&toml_str)
        .unwrap_or_else(|e| panic!("TOML should parse.\nTOML:\n{}\nError: {}", toml_str, e));
    Config::merge(file, no_env)
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let parsed = reparse(&config);

    assert_eq!(parsed.api_url, config.api_url);
    assert_eq!(parsed.token, None);
    assert_eq!(parsed.api, config.api);
    assert_eq!(parsed.stream, config.stream);
    assert_eq!(parsed.sessions, config.sessions);
    assert_eq!(parsed.logging, config.logging);
}

#[test]
fn test_config_roundtrip_custom_values() {
    let mut config = Config::default();
    config.api_url = "https://stats.example.com/api".to_string();
    config.token = Some("tok\"en".to_string());
    config.api.sessions_path = "/v2/{project}/sessions/{visitor}".to_string();
    config.stream.idle_timeout_secs = 0;
    config.stream.payload = PayloadMode::Delta;
    config.stream.fallback_message = "Nope, \"try\" again".to_string();
    config.sessions.page_size = 50;
    config.sessions.max_concurrency = 2;
    config.logging.file_enabled = true;
    config.logging.file_rotation = LogRotation::Hourly;

    let parsed = reparse(&config);

    assert_eq!(parsed.api_url, config.api_url);
    assert_eq!(parsed.token, config.token);
    assert_eq!(parsed.api, config.api);
    assert_eq!(parsed.stream, config.stream);
    assert_eq!(parsed.sessions, config.sessions);
    assert_eq!(parsed.logging, config.logging);
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let file: FileConfig = toml::from_str(
        r#"
api_url = "http://file"
token = "file-token"

[sessions]
page_size = 30

[stream]
idle_timeout_secs = 90
"#,
    )
    .unwrap();

    let env = env_from(&[
        ("STATIFY_API_URL", "http://env"),
        ("STATIFY_PAGE_SIZE", "15"),
        ("STATIFY_IDLE_TIMEOUT", "5"),
    ]);
    let config = Config::merge(file, env);

    assert_eq!(config.api_url, "http://env");
    assert_eq!(config.token.as_deref(), Some("file-token"));
    assert_eq!(config.sessions.page_size, 15);
    assert_eq!(config.stream.idle_timeout_secs, 5);
}

#[test]
fn test_invalid_env_values_ignored() {
    let env = env_from(&[("STATIFY_PAGE_SIZE", "0"), ("STATIFY_IDLE_TIMEOUT", "soon")]);
    let config = Config::merge(FileConfig::default(), env);

    assert_eq!(config.sessions.page_size, crate::sessions::DEFAULT_PAGE_SIZE);
    assert_eq!(config.stream.idle_timeout_secs, 60);
}

#[test]
fn test_blank_token_is_none() {
    let env = env_from(&[("STATIFY_TOKEN", "  ")]);
    assert_eq!(Config::merge(FileConfig::default(), env).token, None);
}

#[test]
fn test_unknown_payload_falls_back_to_cumulative() {
    let file: FileConfig = toml::from_str("[stream]\npayload = \"chunks\"\n").unwrap();
    assert_eq!(
        Config::merge(file, no_env).stream.payload,
        PayloadMode::Cumulative
    );
}

#[test]
fn test_unknown_rotation_is_parse_error() {
    assert!(toml::from_str::<FileConfig>("[logging]\nfile_rotation = \"weekly\"\n").is_err());

    let file: FileConfig = toml::from_str("[logging]\nfile_rotation = \"never\"\n").unwrap();
    assert_eq!(Config::merge(file, no_env).logging.file_rotation, LogRotation::Never);
}

// ─────────────────────────────────────────────────────────────────────────────
// File loading
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let file = Config::load_file_config(&dir.path().join("absent.toml")).unwrap();
    assert!(file.api_url.is_none());
}

#[test]
fn test_broken_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "api_url = \n[sessions\n").unwrap();

    let err = Config::load_file_config(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
}

// ─────────────────────────────────────────────────────────────────────────────
// Derived settings
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_insight_settings_from_stream_section() {
    let mut config = Config::default();
    assert_eq!(
        config.insight_settings().idle_timeout,
        Some(std::time::Duration::from_secs(60))
    );

    config.stream.idle_timeout_secs = 0;
    assert_eq!(config.insight_settings().idle_timeout, None);
}

#[test]
fn test_file_appender_follows_logging_section() {
    let dir = tempfile::tempdir().unwrap();
    let mut logging = LoggingConfig {
        file_dir: dir.path().join("nested").join("logs"),
        ..LoggingConfig::default()
    };
    assert!(logging.file_appender().unwrap().is_none());

    logging.file_enabled = true;
    assert!(logging.file_appender().unwrap().is_some());
    assert!(logging.file_dir.is_dir());
}
