// Wire models for the analytics backend
//
// Backend payloads are loosely typed: numbers arrive as strings, session
// numbers carry a "#" prefix, and page timestamps live under one of several
// field names. Everything is normalised here, once, so the rest of the crate
// only sees validated types.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;
use tracing::warn;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Analytics project (tracked site) identifier
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Visitor identifier (numeric or opaque string on the wire)
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct VisitorId(pub String);

impl VisitorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for VisitorId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) => Ok(Self(s)),
            Value::Number(n) => Ok(Self(n.to_string())),
            other => Err(serde::de::Error::custom(format!(
                "expected visitor id, got {}",
                other
            ))),
        }
    }
}

/// Numeric session identifier
///
/// The sessions endpoint formats it as `"#42"` while visit records carry the
/// bare number; both parse to `SessionNumber(42)`.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct SessionNumber(pub u64);

impl SessionNumber {
    /// Parse `"#42"`, `"42"` or `" 42 "`
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        let digits = trimmed.strip_prefix('#').unwrap_or(trimmed).trim();
        digits.parse().ok().map(Self)
    }
}

impl fmt::Display for SessionNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Serialize for SessionNumber {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(self.0)
    }
}

impl<'de> Deserialize<'de> for SessionNumber {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let parsed = match &value {
            Value::Number(n) => n.as_u64().map(Self),
            Value::String(s) => Self::parse(s),
            _ => None,
        };
        parsed.ok_or_else(|| {
            serde::de::Error::custom(format!("expected session number, got {}", value))
        })
    }
}

/// Chat user identifier, required for every question
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize)]
pub struct UserId(String);

impl UserId {
    /// Validate and wrap a user id. Blank ids are rejected.
    pub fn parse(raw: impl AsRef<str>) -> Option<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Visits
// ─────────────────────────────────────────────────────────────────────────────

/// One recorded page view, as supplied by the pages view (already filtered
/// to the selected date range)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Visit {
    pub visitor_id: VisitorId,
    pub session_id: SessionNumber,
    #[serde(default)]
    pub visited_at: Option<String>,
    /// Seconds spent on the page as reported by the tracker
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub time_spent: f64,
    /// Device, geo and referrer metadata, passed through untouched
    #[serde(flatten)]
    pub metadata: serde_json::Map<String, Value>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Sessions endpoint
// ─────────────────────────────────────────────────────────────────────────────

/// Response of the per-visitor sessions endpoint
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionList {
    #[serde(default, deserialize_with = "lenient_sessions")]
    pub sessions: Vec<VisitorSession>,
}

/// Sessions that fail to parse are skipped so one bad entry does not hide
/// the rest of the visitor's history
fn lenient_sessions<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<VisitorSession>, D::Error> {
    let raw = Option::<Vec<Value>>::deserialize(deserializer)?.unwrap_or_default();
    Ok(raw
        .into_iter()
        .filter_map(|entry| match VisitorSession::deserialize(entry) {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("Skipping malformed session entry: {}", e);
                None
            }
        })
        .collect())
}

/// One browsing session of a visitor
#[derive(Debug, Clone, Deserialize)]
pub struct VisitorSession {
    pub session_number: SessionNumber,
    #[serde(default)]
    pub entry_page: Option<String>,
    #[serde(default)]
    pub exit_page: Option<String>,
    /// Whole-session duration in seconds (0 when unknown)
    #[serde(default, deserialize_with = "lenient_seconds")]
    pub session_duration: f64,
    #[serde(default)]
    pub page_journey: Vec<PageView>,
}

/// One page in a session journey
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawPageView")]
pub struct PageView {
    pub url: String,
    pub title: Option<String>,
    /// Reported seconds on page, `None` when absent or unparseable
    pub time_spent: Option<f64>,
    /// When the page was opened, from whichever timestamp field was present
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
struct RawPageView {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    time_spent: Option<Value>,
    #[serde(default)]
    timestamp: Option<Value>,
    #[serde(default)]
    visited_at: Option<Value>,
    #[serde(default)]
    created_at: Option<Value>,
    #[serde(default)]
    time: Option<Value>,
}

impl From<RawPageView> for PageView {
    fn from(raw: RawPageView) -> Self {
        let timestamp = [raw.timestamp, raw.visited_at, raw.created_at, raw.time]
            .into_iter()
            .flatten()
            .find_map(|v| parse_timestamp(&v));

        Self {
            url: raw.url.unwrap_or_default(),
            title: raw.title,
            time_spent: raw.time_spent.as_ref().and_then(value_to_f64),
            timestamp,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lenient scalar parsing
// ─────────────────────────────────────────────────────────────────────────────

fn value_to_f64(value: &Value) -> Option<f64> {
    let parsed: Option<f64> = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Seconds that may arrive as a number, a numeric string, or null
fn lenient_seconds<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_to_f64).unwrap_or(0.0))
}

/// Parse a page timestamp: RFC 3339, `YYYY-MM-DD HH:MM:SS[.f]` (UTC), or
/// unix time (seconds, or milliseconds when the value is too large to be
/// seconds)
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(Utc.from_utc_datetime(&naive));
                }
            }
            s.parse::<f64>().ok().and_then(unix_to_datetime)
        }
        Value::Number(n) => n.as_f64().and_then(unix_to_datetime),
        _ => None,
    }
}

fn unix_to_datetime(raw: f64) -> Option<DateTime<Utc>> {
    if !raw.is_finite() || raw < 0.0 {
        return None;
    }
    let millis = if raw > 1e11 { raw } else { raw * 1000.0 };
    Utc.timestamp_millis_opt(millis.round() as i64).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_number_formats() {
        assert_eq!(SessionNumber::parse("#42"), Some(SessionNumber(42)));
        assert_eq!(SessionNumber::parse(" 42 "), Some(SessionNumber(42)));
        assert_eq!(SessionNumber::parse("#abc"), None);

        let from_num: SessionNumber = serde_json::from_value(json!(7)).unwrap();
        let from_str: SessionNumber = serde_json::from_value(json!("#7")).unwrap();
        assert_eq!(from_num, from_str);
        assert_eq!(from_num.to_string(), "#7");
    }

    #[test]
    fn test_visit_keeps_metadata() {
        let visit: Visit = serde_json::from_value(json!({
            "visitor_id": 1234,
            "session_id": "3",
            "visited_at": "2024-01-01T00:00:00Z",
            "time_spent": "12",
            "country": "DE",
            "device": "mobile"
        }))
        .unwrap();

        assert_eq!(visit.visitor_id, VisitorId::new("1234"));
        assert_eq!(visit.session_id, SessionNumber(3));
        assert_eq!(visit.time_spent, 12.0);
        assert_eq!(visit.metadata.get("country"), Some(&json!("DE")));

        let back = serde_json::to_value(&visit).unwrap();
        assert_eq!(back["device"], json!("mobile"));
        assert_eq!(back["session_id"], json!(3));
    }

    #[test]
    fn test_page_view_timestamp_aliases() {
        let page: PageView = serde_json::from_value(json!({
            "url": "/pricing",
            "created_at": "2024-01-01 00:00:10"
        }))
        .unwrap();
        assert_eq!(
            page.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 10).unwrap())
        );
        assert_eq!(page.time_spent, None);

        let page: PageView = serde_json::from_value(json!({
            "url": "/",
            "time_spent": null,
            "time": 1_704_067_200
        }))
        .unwrap();
        assert_eq!(
            page.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_timestamp_precedence() {
        let page: PageView = serde_json::from_value(json!({
            "url": "/",
            "timestamp": "not a date",
            "visited_at": "2024-01-01T00:00:05Z"
        }))
        .unwrap();
        assert_eq!(
            page.timestamp,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 5).unwrap())
        );
    }

    #[test]
    fn test_user_id_rejects_blank() {
        assert!(UserId::parse("   ").is_none());
        assert_eq!(UserId::parse(" 17 ").unwrap().as_str(), "17");
    }

    #[test]
    fn test_session_list_lenient_duration() {
        let list: SessionList = serde_json::from_value(json!({
            "sessions": [{
                "session_number": "#1",
                "session_duration": "80",
                "page_journey": []
            }]
        }))
        .unwrap();
        assert_eq!(list.sessions[0].session_duration, 80.0);
        assert_eq!(list.sessions[0].entry_page, None);
    }

    #[test]
    fn test_session_list_skips_malformed_entries() {
        let list: SessionList = serde_json::from_value(json!({
            "sessions": [
                { "session_number": null, "page_journey": [] },
                { "session_number": "#abc" },
                { "session_number": "#3", "page_journey": [{ "url": "/pricing" }] }
            ]
        }))
        .unwrap();
        assert_eq!(list.sessions.len(), 1);
        assert_eq!(list.sessions[0].session_number, SessionNumber(3));

        let empty: SessionList = serde_json::from_value(json!({ "sessions": null })).unwrap();
        assert!(empty.sessions.is_empty());
    }
}
