use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;

use crate::models::session::Session;

/// Deterministic every-other-day placement, used when no externally
/// suggested schedule exists or the suggestion is unusable. Session *i*
/// (0-indexed) lands on `start_date + 2i` days at the preferred start time,
/// keeping its own duration. The day gap guarantees at least one rest day
/// between sessions without intensity-aware reasoning.
pub fn distribute_every_other_day(
    sessions: &[Session],
    start_date: NaiveDate,
    preferred_time: NaiveTime,
) -> Vec<Session> {
    let scheduled: Vec<Session> = sessions
        .iter()
        .enumerate()
        .map(|(index, session)| {
            let date = start_date + Duration::days(index as i64 * 2);
            session.scheduled_at(date, preferred_time)
        })
        .collect();

    debug!(
        target: "app::planner",
        count = scheduled.len(),
        start_date = %start_date,
        "distributed sessions on an every-other-day cadence"
    );

    scheduled
}
