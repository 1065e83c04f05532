use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::calendar::{BusyPeriod, TimeWindow};
use crate::models::session::Session;

/// Boundary to the external calendar backend. Authentication, token storage
/// and the wire format all live behind this trait; the engine only relies on
/// the two operations below.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// List busy intervals inside the window. Connectivity or auth failures
    /// surface as errors; the orchestrator degrades them to an empty busy
    /// set.
    async fn fetch_busy_periods(&self, window: &TimeWindow) -> AppResult<Vec<BusyPeriod>>;

    /// Persist one scheduled session as a calendar event and return the
    /// created event id. Idempotency is not required; the engine submits
    /// each session at most once per run.
    async fn create_event(&self, session: &Session) -> AppResult<String>;
}
