//! statify: client core for a web analytics dashboard
//!
//! * [`insights`] streams answers from the AI insight endpoint into chat
//!   state, with cancellation and an idle timeout.
//! * [`sessions`] enriches page visits with their session journeys and
//!   pages them through a replace/append cache.
//! * [`api`] is the reqwest-based backend client behind both.

pub mod api;
pub mod config;
pub mod error;
pub mod insights;
pub mod logging;
pub mod sessions;

pub use api::ApiClient;
pub use config::Config;
pub use error::{ApiError, InsightError};
pub use insights::{InsightController, InsightSettings, StreamEvent};
pub use sessions::{EnrichedSession, SessionPageCache};
