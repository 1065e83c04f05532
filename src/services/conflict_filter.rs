use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::AppResult;
use crate::models::session::Session;
use crate::services::schedule_utils::{self, Interval};

/// A candidate that overlaps at least one busy interval, with enough detail
/// to explain the decision to the caller.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionConflict {
    pub session: Session,
    pub message: String,
}

/// Strict split of the candidates: every candidate lands in exactly one
/// side, relative order preserved within each side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePartition {
    pub non_conflicting: Vec<Session>,
    pub conflicting: Vec<SessionConflict>,
}

/// Partition scheduled candidates against busy time. A candidate conflicts
/// if its interval overlaps ANY busy interval; nothing is shifted to a
/// nearby free slot. O(N·M), which is fine at tens of sessions against
/// hundreds of busy periods.
pub fn partition_sessions(
    candidates: Vec<Session>,
    busy: &[Interval],
    tz: &Tz,
) -> AppResult<SchedulePartition> {
    let mut partition = SchedulePartition::default();

    for candidate in candidates {
        let interval = schedule_utils::session_interval(&candidate, tz)?;
        let collision = busy
            .iter()
            .find(|period| schedule_utils::overlaps(&interval, period));

        match collision {
            Some(period) => {
                let message = format!(
                    "会话 {} 与忙碌时段 [{} - {}] 冲突",
                    candidate.format_display(),
                    schedule_utils::format_datetime(period.start()),
                    schedule_utils::format_datetime(period.end()),
                );
                partition.conflicting.push(SessionConflict {
                    session: candidate,
                    message,
                });
            }
            None => partition.non_conflicting.push(candidate),
        }
    }

    debug!(
        target: "app::scheduler",
        non_conflicting = partition.non_conflicting.len(),
        conflicting = partition.conflicting.len(),
        busy_periods = busy.len(),
        "candidates partitioned against busy time"
    );

    Ok(partition)
}
