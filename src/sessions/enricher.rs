// Session enricher
//
// Joins a visit with the session it belongs to. The visitor's full session
// list is fetched from the directory, the session whose number matches the
// visit's `session_id` is picked, and its page journey is back-filled.
// Failures never propagate: the visit degrades to an empty path.

use super::backfill::backfill_journey;
use super::types::{positive, EnrichedSession};
use crate::api::models::{ProjectId, SessionList, SessionNumber, Visit, VisitorId, VisitorSession};
use crate::error::ApiError;
use futures::future::BoxFuture;
use futures::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Source of per-visitor session lists
pub trait SessionDirectory: Send + Sync + 'static {
    fn visitor_sessions<'a>(
        &'a self,
        project: &'a ProjectId,
        visitor: &'a VisitorId,
    ) -> BoxFuture<'a, Result<SessionList, ApiError>>;
}

/// Enriches visits with their session journey
pub struct SessionEnricher<D: ?Sized> {
    directory: Arc<D>,
    max_concurrency: usize,
}

impl<D: ?Sized> Clone for SessionEnricher<D> {
    fn clone(&self) -> Self {
        Self {
            directory: Arc::clone(&self.directory),
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<D: SessionDirectory + ?Sized> SessionEnricher<D> {
    pub fn new(directory: Arc<D>, max_concurrency: usize) -> Self {
        Self {
            directory,
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Enrich a single visit
    pub async fn enrich(&self, visit: Visit, project: &ProjectId) -> EnrichedSession {
        enrich_visit(self.directory.as_ref(), project, visit).await
    }

    /// Enrich a batch concurrently, keeping input order.
    ///
    /// Each visit runs in its own task with at most `max_concurrency` in
    /// flight. A task that panics is dropped from the output; every other
    /// visit yields exactly one row.
    pub async fn enrich_all(&self, project: &ProjectId, visits: &[Visit]) -> Vec<EnrichedSession> {
        let tasks = visits.iter().cloned().map(|visit| {
            let directory = Arc::clone(&self.directory);
            let project = project.clone();
            tokio::spawn(async move { enrich_visit(directory.as_ref(), &project, visit).await })
        });

        futures::stream::iter(tasks)
            .buffered(self.max_concurrency)
            .filter_map(|joined| async move {
                match joined {
                    Ok(session) => Some(session),
                    Err(e) => {
                        warn!("Session enrichment task failed: {}", e);
                        None
                    }
                }
            })
            .collect()
            .await
    }
}

async fn enrich_visit<D: SessionDirectory + ?Sized>(
    directory: &D,
    project: &ProjectId,
    visit: Visit,
) -> EnrichedSession {
    let list = match directory.visitor_sessions(project, &visit.visitor_id).await {
        Ok(list) => list,
        Err(e) => {
            warn!(
                "Failed to load sessions for visitor {} ({}): {}",
                visit.visitor_id, visit.session_id, e
            );
            return EnrichedSession::without_journey(visit);
        }
    };

    // First entry wins when the backend repeats a session number
    let mut by_number: HashMap<SessionNumber, VisitorSession> = HashMap::new();
    for session in list.sessions {
        by_number.entry(session.session_number).or_insert(session);
    }

    match by_number.remove(&visit.session_id) {
        Some(session) => build(visit, session),
        None => {
            debug!(
                "No session {} among sessions of visitor {}",
                visit.session_id, visit.visitor_id
            );
            EnrichedSession::without_journey(visit)
        }
    }
}

fn build(visit: Visit, session: VisitorSession) -> EnrichedSession {
    let path = backfill_journey(&session.page_journey, session.session_duration);

    let entry_page = session
        .entry_page
        .filter(|page| !page.is_empty())
        .or_else(|| path.first().map(|page| page.url.clone()));
    let exit_page = session
        .exit_page
        .filter(|page| !page.is_empty())
        .or_else(|| path.last().map(|page| page.url.clone()));

    let total_time = positive(session.session_duration)
        .or_else(|| positive(visit.time_spent))
        .unwrap_or(0.0);

    EnrichedSession {
        visit,
        path,
        entry_page,
        exit_page,
        total_time,
    }
}
