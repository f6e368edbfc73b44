//! Session detail enrichment and the paginated session table cache

pub mod backfill;
pub mod cache;
pub mod enricher;
pub mod types;

pub use backfill::backfill_journey;
pub use cache::{CachePhase, CacheSnapshot, FetchOutcome, SessionPageCache, DEFAULT_PAGE_SIZE};
pub use enricher::{SessionDirectory, SessionEnricher};
pub use types::{EnrichedSession, PageVisit};
