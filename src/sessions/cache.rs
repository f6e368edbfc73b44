// Session page cache
//
// Holds the enriched rows of the session table and grows them page by page:
//
//   [Idle] ──fetch_first──▶ [Loading] ──▶ [Ready] ──fetch_more──▶ [LoadingMore]
//     ▲                                     ▲                          │
//     └───────────── clear ─────────────────┴──────────────────────────┘
//
// fetch_first replaces the rows, fetch_more appends the next slice. Both
// record a generation when they start; fetch_first and clear bump it, so a
// fetch that finishes after being superseded drops its rows.

use super::enricher::{SessionDirectory, SessionEnricher};
use super::types::EnrichedSession;
use crate::api::models::{ProjectId, Visit};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Initial page size of the session table
pub const DEFAULT_PAGE_SIZE: usize = 20;

/// Loading phase of the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CachePhase {
    #[default]
    Idle,
    Loading,
    Ready,
    LoadingMore,
}

impl CachePhase {
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Loading | Self::LoadingMore)
    }
}

/// Point-in-time copy of the cache
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheSnapshot {
    pub session_details: Vec<EnrichedSession>,
    pub current_limit: usize,
    pub total_sessions: usize,
    pub has_more: bool,
    pub phase: CachePhase,
}

impl CacheSnapshot {
    pub fn is_loading(&self) -> bool {
        self.phase == CachePhase::Loading
    }

    pub fn is_loading_more(&self) -> bool {
        self.phase == CachePhase::LoadingMore
    }
}

/// Result of a fetch call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Rows stored by this call (0 for no-ops and superseded fetches)
    pub loaded: usize,
    pub has_more: bool,
}

impl FetchOutcome {
    fn nothing(has_more: bool) -> Self {
        Self { loaded: 0, has_more }
    }
}

#[derive(Debug)]
struct CacheState {
    details: Vec<EnrichedSession>,
    current_limit: usize,
    total_sessions: usize,
    has_more: bool,
    phase: CachePhase,
    generation: u64,
    /// A first page has been committed since the last clear
    loaded: bool,
}

impl CacheState {
    fn new(page_size: usize) -> Self {
        Self {
            details: Vec::new(),
            current_limit: page_size,
            total_sessions: 0,
            has_more: false,
            phase: CachePhase::Idle,
            generation: 0,
            loaded: false,
        }
    }

    /// Phase to fall back to when no fetch is running
    fn settled_phase(&self) -> CachePhase {
        if self.loaded {
            CachePhase::Ready
        } else {
            CachePhase::Idle
        }
    }
}

/// Settles the phase of a fetch that never reached its commit, e.g. because
/// the caller dropped the future mid-flight.
struct PhaseGuard<'a> {
    state: &'a Mutex<CacheState>,
    generation: u64,
    committed: bool,
}

impl<'a> PhaseGuard<'a> {
    fn new(state: &'a Mutex<CacheState>, generation: u64) -> Self {
        Self {
            state,
            generation,
            committed: false,
        }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let mut state = self.state.lock();
        // A newer fetch_first or clear owns the phase now
        if state.generation == self.generation && state.phase.is_busy() {
            debug!("Fetch abandoned, settling phase");
            state.phase = state.settled_phase();
        }
    }
}

/// Paginated cache of enriched sessions
pub struct SessionPageCache<D: ?Sized> {
    enricher: SessionEnricher<D>,
    page_size: usize,
    state: Mutex<CacheState>,
}

impl<D: SessionDirectory + ?Sized> SessionPageCache<D> {
    pub fn new(directory: Arc<D>, page_size: usize, max_concurrency: usize) -> Self {
        Self::with_enricher(SessionEnricher::new(directory, max_concurrency), page_size)
    }

    pub fn with_enricher(enricher: SessionEnricher<D>, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        Self {
            enricher,
            page_size,
            state: Mutex::new(CacheState::new(page_size)),
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn snapshot(&self) -> CacheSnapshot {
        let state = self.state.lock();
        CacheSnapshot {
            session_details: state.details.clone(),
            current_limit: state.current_limit,
            total_sessions: state.total_sessions,
            has_more: state.has_more,
            phase: state.phase,
        }
    }

    /// Enrich the first `limit` visits (default: page size) and replace the
    /// cached rows with them. Supersedes any fetch in flight.
    pub async fn fetch_first(
        &self,
        project: &ProjectId,
        visits: &[Visit],
        limit: Option<usize>,
    ) -> FetchOutcome {
        let limit = limit.unwrap_or(self.page_size);
        let take = limit.min(visits.len());

        let generation = {
            let mut state = self.state.lock();
            state.generation += 1;
            state.phase = CachePhase::Loading;
            state.generation
        };
        let mut guard = PhaseGuard::new(&self.state, generation);

        debug!("Fetching first {} of {} sessions", take, visits.len());
        let rows = self.enricher.enrich_all(project, &visits[..take]).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Discarding superseded first page");
            return FetchOutcome::nothing(state.has_more);
        }

        let loaded = rows.len();
        state.details = rows;
        state.current_limit = take;
        state.total_sessions = visits.len();
        state.has_more = state.total_sessions > take;
        state.phase = CachePhase::Ready;
        state.loaded = true;
        guard.committed = true;

        info!(
            "Loaded {} sessions ({} total, more: {})",
            loaded, state.total_sessions, state.has_more
        );
        FetchOutcome {
            loaded,
            has_more: state.has_more,
        }
    }

    /// Enrich `visits[current_limit..limit]` and append the rows.
    ///
    /// No-op when `limit` does not reach past the loaded rows; the outcome
    /// then reports `has_more = false` only if every visit is already loaded.
    /// Also a no-op while another fetch is running or before a first page
    /// exists.
    pub async fn fetch_more(&self, project: &ProjectId, visits: &[Visit], limit: usize) -> FetchOutcome {
        let (start, end, generation) = {
            let mut state = self.state.lock();
            if state.phase.is_busy() || state.phase == CachePhase::Idle {
                debug!("fetch_more ignored in phase {:?}", state.phase);
                return FetchOutcome::nothing(state.has_more);
            }

            let start = state.current_limit;
            let end = limit.min(visits.len());
            if end <= start {
                return FetchOutcome::nothing(start < visits.len() && state.has_more);
            }

            state.phase = CachePhase::LoadingMore;
            (start, end, state.generation)
        };
        let mut guard = PhaseGuard::new(&self.state, generation);

        debug!("Fetching sessions {}..{} of {}", start, end, visits.len());
        let rows = self.enricher.enrich_all(project, &visits[start..end]).await;

        let mut state = self.state.lock();
        if state.generation != generation {
            debug!("Discarding superseded page {}..{}", start, end);
            return FetchOutcome::nothing(state.has_more);
        }

        let loaded = rows.len();
        state.details.extend(rows);
        state.current_limit = end;
        state.total_sessions = visits.len();
        state.has_more = state.total_sessions > end;
        state.phase = CachePhase::Ready;
        guard.committed = true;

        info!(
            "Appended {} sessions (showing {} of {})",
            loaded, end, state.total_sessions
        );
        FetchOutcome {
            loaded,
            has_more: state.has_more,
        }
    }

    /// Drop every row and return to the initial page size
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        *state = CacheState::new(self.page_size);
        state.generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::{SessionList, VisitorId};
    use crate::error::ApiError;
    use futures::future::BoxFuture;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Directory with per-visitor latency and failure injection
    #[derive(Default)]
    struct FakeDirectory {
        delays: HashMap<String, Duration>,
        failing: Vec<String>,
        panicking: Vec<String>,
        calls: AtomicUsize,
    }

    impl SessionDirectory for FakeDirectory {
        fn visitor_sessions<'a>(
            &'a self,
            _project: &'a ProjectId,
            visitor: &'a VisitorId,
        ) -> BoxFuture<'a, Result<SessionList, ApiError>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let id = visitor.as_str().to_string();
                if let Some(delay) = self.delays.get(&id) {
                    tokio::time::sleep(*delay).await;
                }
                if self.panicking.contains(&id) {
                    panic!("directory blew up for {}", id);
                }
                if self.failing.contains(&id) {
                    return Err(ApiError::Status {
                        status: 503,
                        message: "unavailable".into(),
                    });
                }
                Ok(serde_json::from_value(json!({
                    "sessions": [{
                        "session_number": "#1",
                        "session_duration": 30,
                        "page_journey": [{ "url": format!("/{}", id) }]
                    }]
                }))
                .unwrap())
            })
        }
    }

    fn visit(visitor: &str) -> Visit {
        serde_json::from_value(json!({ "visitor_id": visitor, "session_id": 1 })).unwrap()
    }

    fn visits(n: usize) -> Vec<Visit> {
        (0..n).map(|i| visit(&format!("v{}", i))).collect()
    }

    fn visitor_ids(snapshot: &CacheSnapshot) -> Vec<String> {
        snapshot
            .session_details
            .iter()
            .map(|s| s.visit.visitor_id.as_str().to_string())
            .collect()
    }

    fn cache(directory: FakeDirectory) -> SessionPageCache<FakeDirectory> {
        SessionPageCache::new(Arc::new(directory), DEFAULT_PAGE_SIZE, 4)
    }

    #[tokio::test]
    async fn test_order_preserved_under_out_of_order_completion() {
        let mut directory = FakeDirectory::default();
        directory.delays.insert("v1".into(), Duration::from_millis(60));
        directory.delays.insert("v3".into(), Duration::from_millis(30));
        let cache = cache(directory);
        let project = ProjectId::new("p");
        let input = vec![visit("v1"), visit("v2"), visit("v3")];

        let outcome = cache.fetch_first(&project, &input, None).await;

        assert_eq!(outcome, FetchOutcome { loaded: 3, has_more: false });
        let snapshot = cache.snapshot();
        assert_eq!(visitor_ids(&snapshot), vec!["v1", "v2", "v3"]);
        assert_eq!(snapshot.session_details[0].path[0].url, "/v1");
        assert_eq!(snapshot.phase, CachePhase::Ready);
    }

    #[tokio::test]
    async fn test_failing_visitor_degrades_without_failing_batch() {
        let directory = FakeDirectory {
            failing: vec!["v2".into()],
            ..Default::default()
        };
        let cache = cache(directory);
        let input = vec![visit("v1"), visit("v2"), visit("v3")];

        cache.fetch_first(&ProjectId::new("p"), &input, None).await;

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.session_details.len(), 3);
        assert!(snapshot.session_details[1].path.is_empty());
        assert!(snapshot.session_details[0].has_journey());
        assert!(snapshot.session_details[2].has_journey());
    }

    #[tokio::test]
    async fn test_panicking_task_is_dropped() {
        let directory = FakeDirectory {
            panicking: vec!["v2".into()],
            ..Default::default()
        };
        let cache = cache(directory);
        let input = vec![visit("v1"), visit("v2"), visit("v3")];

        let outcome = cache.fetch_first(&ProjectId::new("p"), &input, None).await;

        assert_eq!(outcome.loaded, 2);
        assert_eq!(visitor_ids(&cache.snapshot()), vec!["v1", "v3"]);
    }

    #[tokio::test]
    async fn test_pagination_appends_and_tracks_has_more() {
        let cache = cache(FakeDirectory::default());
        let project = ProjectId::new("p");
        let input = visits(47);

        let first = cache.fetch_first(&project, &input, Some(20)).await;
        assert_eq!(first, FetchOutcome { loaded: 20, has_more: true });
        let page_one = cache.snapshot();
        assert_eq!(page_one.current_limit, 20);
        assert_eq!(page_one.total_sessions, 47);

        let more = cache.fetch_more(&project, &input, 35).await;
        assert_eq!(more, FetchOutcome { loaded: 15, has_more: true });
        let page_two = cache.snapshot();
        assert_eq!(page_two.session_details.len(), 35);
        assert_eq!(page_two.session_details[..20], page_one.session_details[..]);
        assert_eq!(page_two.session_details[20].visit.visitor_id.as_str(), "v20");

        let last = cache.fetch_more(&project, &input, 47).await;
        assert_eq!(last, FetchOutcome { loaded: 12, has_more: false });
        assert_eq!(cache.snapshot().session_details.len(), 47);
    }

    #[tokio::test]
    async fn test_fetch_more_past_end_is_noop() {
        let directory = Arc::new(FakeDirectory::default());
        let cache = SessionPageCache::new(Arc::clone(&directory), DEFAULT_PAGE_SIZE, 4);
        let project = ProjectId::new("p");
        let input = visits(5);

        cache.fetch_first(&project, &input, None).await;
        let before = cache.snapshot();
        assert_eq!(before.current_limit, 5);
        assert!(!before.has_more);
        let calls = directory.calls.load(Ordering::SeqCst);

        let outcome = cache.fetch_more(&project, &input, 40).await;
        assert_eq!(outcome, FetchOutcome { loaded: 0, has_more: false });
        assert_eq!(cache.snapshot(), before);
        assert_eq!(directory.calls.load(Ordering::SeqCst), calls);

        let outcome = cache.fetch_more(&project, &input, 2).await;
        assert_eq!(outcome, FetchOutcome { loaded: 0, has_more: false });
        assert_eq!(cache.snapshot(), before);
    }

    #[tokio::test]
    async fn test_fetch_more_before_first_page_is_noop() {
        let directory = Arc::new(FakeDirectory::default());
        let cache = SessionPageCache::new(Arc::clone(&directory), DEFAULT_PAGE_SIZE, 4);

        let outcome = cache.fetch_more(&ProjectId::new("p"), &visits(30), 30).await;

        assert_eq!(outcome.loaded, 0);
        assert_eq!(cache.snapshot().phase, CachePhase::Idle);
        assert_eq!(directory.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_clear_resets_state() {
        let cache = SessionPageCache::new(Arc::new(FakeDirectory::default()), 10, 4);
        let project = ProjectId::new("p");
        let input = visits(25);

        cache.fetch_first(&project, &input, None).await;
        cache.fetch_more(&project, &input, 20).await;
        assert_eq!(cache.snapshot().current_limit, 20);

        cache.clear();

        let snapshot = cache.snapshot();
        assert!(snapshot.session_details.is_empty());
        assert_eq!(snapshot.current_limit, 10);
        assert_eq!(snapshot.total_sessions, 0);
        assert!(!snapshot.has_more);
        assert_eq!(snapshot.phase, CachePhase::Idle);
    }

    #[tokio::test]
    async fn test_clear_supersedes_in_flight_fetch() {
        let mut directory = FakeDirectory::default();
        directory.delays.insert("v0".into(), Duration::from_millis(50));
        let cache = cache(directory);
        let project = ProjectId::new("p");
        let input = visits(3);

        let (outcome, _) = tokio::join!(cache.fetch_first(&project, &input, None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.clear();
        });

        assert_eq!(outcome.loaded, 0);
        let snapshot = cache.snapshot();
        assert!(snapshot.session_details.is_empty());
        assert_eq!(snapshot.phase, CachePhase::Idle);
    }

    #[tokio::test]
    async fn test_newer_fetch_first_wins() {
        let mut directory = FakeDirectory::default();
        directory.delays.insert("slow".into(), Duration::from_millis(60));
        let cache = cache(directory);
        let project = ProjectId::new("p");
        let old = vec![visit("slow")];
        let new = vec![visit("a"), visit("b")];

        let (stale, fresh) = tokio::join!(cache.fetch_first(&project, &old, None), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.fetch_first(&project, &new, None).await
        });

        assert_eq!(stale.loaded, 0);
        assert_eq!(fresh.loaded, 2);
        assert_eq!(visitor_ids(&cache.snapshot()), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_fetch_more_below_loaded_rows_keeps_has_more() {
        let directory = Arc::new(FakeDirectory::default());
        let cache = SessionPageCache::new(Arc::clone(&directory), DEFAULT_PAGE_SIZE, 4);
        let project = ProjectId::new("p");
        let input = visits(47);

        cache.fetch_first(&project, &input, Some(20)).await;
        let before = cache.snapshot();
        let calls = directory.calls.load(Ordering::SeqCst);

        let outcome = cache.fetch_more(&project, &input, 15).await;

        assert_eq!(outcome, FetchOutcome { loaded: 0, has_more: true });
        assert_eq!(cache.snapshot(), before);
        assert_eq!(directory.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_dropped_fetch_more_allows_loading_more() {
        let mut directory = FakeDirectory::default();
        directory.delays.insert("v1".into(), Duration::from_millis(200));
        let cache = SessionPageCache::new(Arc::new(directory), 1, 4);
        let project = ProjectId::new("p");
        let input = visits(3);

        cache.fetch_first(&project, &input, None).await;
        assert_eq!(cache.snapshot().current_limit, 1);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.fetch_more(&project, &input, 2),
        )
        .await;
        assert!(abandoned.is_err());

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.phase, CachePhase::Ready);
        assert_eq!(snapshot.current_limit, 1);
        assert_eq!(snapshot.session_details.len(), 1);

        let outcome = cache.fetch_more(&project, &input, 3).await;
        assert_eq!(outcome, FetchOutcome { loaded: 2, has_more: false });
        assert_eq!(visitor_ids(&cache.snapshot()), vec!["v0", "v1", "v2"]);
    }

    #[tokio::test]
    async fn test_dropped_first_fetch_returns_to_idle() {
        let mut directory = FakeDirectory::default();
        directory.delays.insert("v0".into(), Duration::from_millis(200));
        let cache = cache(directory);
        let project = ProjectId::new("p");
        let input = visits(2);

        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.fetch_first(&project, &input, None),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.snapshot().phase, CachePhase::Idle);

        // A dropped reload settles back to Ready once a page was committed
        cache.fetch_first(&project, &[], None).await;
        assert_eq!(cache.snapshot().phase, CachePhase::Ready);
        let abandoned = tokio::time::timeout(
            Duration::from_millis(20),
            cache.fetch_first(&project, &input, None),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(cache.snapshot().phase, CachePhase::Ready);
    }
}
