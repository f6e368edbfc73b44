// Enriched session records produced by the enricher and held by the cache

use crate::api::models::Visit;
use serde::Serialize;

/// One page of an enriched journey with its (possibly back-filled) duration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PageVisit {
    pub url: String,
    pub title: Option<String>,
    /// Seconds on page after back-fill
    pub time_spent: f64,
    /// What the backend reported, before back-fill
    pub time_spent_original: Option<f64>,
    /// True when `time_spent` was derived rather than reported
    pub time_spent_calculated: bool,
}

/// A visit plus the full journey of the session it belongs to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedSession {
    #[serde(flatten)]
    pub visit: Visit,
    pub path: Vec<PageVisit>,
    pub entry_page: Option<String>,
    pub exit_page: Option<String>,
    /// Whole-session seconds (0 when nothing is known)
    pub total_time: f64,
}

impl EnrichedSession {
    /// Fallback row for a visit whose journey could not be loaded
    pub fn without_journey(visit: Visit) -> Self {
        let total_time = positive(visit.time_spent).unwrap_or(0.0);
        Self {
            visit,
            path: Vec::new(),
            entry_page: None,
            exit_page: None,
            total_time,
        }
    }

    pub fn has_journey(&self) -> bool {
        !self.path.is_empty()
    }
}

pub(crate) fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}
