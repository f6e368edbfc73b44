//! Per-page duration back-fill
//!
//! Trackers often lose the time-on-page of a view (tab closed, beacon
//! dropped). Missing values are estimated from the journey itself:
//!
//! 1. a positive reported value is kept as-is;
//! 2. a page followed by another page gets the gap to the next timestamp,
//!    if that gap is in (0, 1800) seconds, else [`GAP_FALLBACK_SECS`];
//! 3. the last page of a multi-page journey gets
//!    `min(60, session_duration or 45)`;
//! 4. the only page of a single-page journey gets `session_duration or 60`;
//! 5. anything still zero becomes [`ZERO_FALLBACK_SECS`].

use super::types::{positive, PageVisit};
use crate::api::models::PageView;

/// Gaps at or beyond this are treated as the visitor leaving and coming back
pub const MAX_GAP_SECS: f64 = 1800.0;
/// Estimate for a page whose gap to the next page is unusable
pub const GAP_FALLBACK_SECS: f64 = 45.0;
/// Upper bound for the last page of a multi-page journey
pub const LAST_PAGE_CAP_SECS: f64 = 60.0;
/// Last-page estimate when the session duration is unknown
pub const LAST_PAGE_DEFAULT_SECS: f64 = 45.0;
/// Single-page estimate when the session duration is unknown
pub const SINGLE_PAGE_DEFAULT_SECS: f64 = 60.0;
/// Floor applied when every rule produced zero
pub const ZERO_FALLBACK_SECS: f64 = 30.0;

/// Compute `time_spent` for every page of a journey
pub fn backfill_journey(journey: &[PageView], session_duration: f64) -> Vec<PageVisit> {
    let duration = positive(session_duration);

    journey
        .iter()
        .enumerate()
        .map(|(index, page)| {
            let reported = page.time_spent.and_then(positive);
            let time_spent = match reported {
                Some(seconds) => seconds,
                None => {
                    let estimate = estimate(journey, index, duration);
                    if estimate <= 0.0 {
                        ZERO_FALLBACK_SECS
                    } else {
                        estimate
                    }
                }
            };

            PageVisit {
                url: page.url.clone(),
                title: page.title.clone(),
                time_spent,
                time_spent_original: page.time_spent,
                time_spent_calculated: reported.is_none(),
            }
        })
        .collect()
}

fn estimate(journey: &[PageView], index: usize, duration: Option<f64>) -> f64 {
    if journey.len() == 1 {
        return duration.unwrap_or(SINGLE_PAGE_DEFAULT_SECS);
    }

    match journey.get(index + 1) {
        Some(next) => gap_seconds(&journey[index], next)
            .filter(|gap| *gap > 0.0 && *gap < MAX_GAP_SECS)
            .unwrap_or(GAP_FALLBACK_SECS),
        None => LAST_PAGE_CAP_SECS.min(duration.unwrap_or(LAST_PAGE_DEFAULT_SECS)),
    }
}

/// Whole seconds between two page views, if both carry timestamps
fn gap_seconds(current: &PageView, next: &PageView) -> Option<f64> {
    let (Some(start), Some(end)) = (current.timestamp, next.timestamp) else {
        return None;
    };
    let millis = (end - start).num_milliseconds() as f64;
    Some((millis / 1000.0).round())
}
