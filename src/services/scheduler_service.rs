use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::calendar::TimeWindow;
use crate::models::preferences::Preferences;
use crate::models::session::{RecordRejection, Session};
use crate::services::calendar_service::CalendarProvider;
use crate::services::conflict_filter::{self, SchedulePartition, SessionConflict};
use crate::services::schedule_utils::{self, Interval};

/// Top-level workflow: validate candidate records, fetch busy time (or
/// degrade), partition, then hand the conflict-free set to the calendar
/// collaborator one session at a time.
pub struct SchedulerService {
    calendar: Arc<dyn CalendarProvider>,
    preferences: Preferences,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ScheduleRunStatus {
    /// The write phase ran (possibly with per-session failures).
    Completed,
    /// Zero valid candidates remained after validation. Not an error.
    NothingToSchedule,
    /// The caller declined before the write phase; zero writes happened.
    Aborted,
}

/// Caller decision taken between preparation and the write phase, e.g. a
/// user confirming or declining the previewed schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunDecision {
    Proceed,
    Cancel,
}

/// Result of the validation/fetch/partition phases, before any write.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreparedRun {
    pub valid_count: usize,
    pub rejections: Vec<RecordRejection>,
    pub partition: SchedulePartition,
    /// True when the busy-period fetch failed and conflict checking degraded
    /// to "no known conflicts".
    pub busy_degraded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WrittenEvent {
    pub event_id: String,
    pub session: Session,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WriteFailure {
    pub session: Session,
    pub message: String,
}

/// Terminal report of a scheduling run. Conflicting sessions are always
/// listed in full; silent dropping is disallowed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleOutcome {
    pub status: ScheduleRunStatus,
    pub rejections: Vec<RecordRejection>,
    pub conflicting: Vec<SessionConflict>,
    pub written: Vec<WrittenEvent>,
    pub write_failures: Vec<WriteFailure>,
    pub busy_degraded: bool,
}

impl ScheduleOutcome {
    pub fn rejected_count(&self) -> usize {
        self.rejections.len()
    }

    pub fn conflicting_count(&self) -> usize {
        self.conflicting.len()
    }

    pub fn written_count(&self) -> usize {
        self.written.len()
    }

    pub fn failed_write_count(&self) -> usize {
        self.write_failures.len()
    }
}

impl SchedulerService {
    pub fn new(calendar: Arc<dyn CalendarProvider>, preferences: Preferences) -> Self {
        Self {
            calendar,
            preferences,
        }
    }

    /// Validate raw candidate records and partition them against busy time.
    /// No calendar writes happen here, so the caller can still cancel.
    pub async fn prepare(&self, records: &[JsonValue]) -> AppResult<PreparedRun> {
        let mut sessions = Vec::new();
        let mut rejections = Vec::new();

        for (index, record) in records.iter().enumerate() {
            match Session::from_candidate_record(record) {
                Ok(session) => sessions.push(session),
                Err(error) => {
                    let missing_fields = error
                        .validation_details()
                        .and_then(|details| details.get("missingFields"))
                        .and_then(JsonValue::as_array)
                        .map(|fields| {
                            fields
                                .iter()
                                .filter_map(|v| v.as_str().map(str::to_string))
                                .collect()
                        })
                        .unwrap_or_default();
                    rejections.push(RecordRejection {
                        index,
                        message: error.to_string(),
                        missing_fields,
                    });
                }
            }
        }

        if sessions.is_empty() {
            info!(
                target: "app::scheduler",
                rejected = rejections.len(),
                "no valid candidate sessions, nothing to schedule"
            );
            return Ok(PreparedRun {
                valid_count: 0,
                rejections,
                partition: SchedulePartition::default(),
                busy_degraded: false,
            });
        }

        let valid_count = sessions.len();
        let (busy, busy_degraded) = self.fetch_busy_intervals(&sessions).await;
        let partition =
            conflict_filter::partition_sessions(sessions, &busy, &self.preferences.timezone)?;

        Ok(PreparedRun {
            valid_count,
            rejections,
            partition,
            busy_degraded,
        })
    }

    /// Run the write phase, or abort with zero writes when the caller
    /// declined. A failed write is reported and skipped; previously written
    /// sessions are never rolled back.
    pub async fn execute(&self, prepared: PreparedRun, decision: RunDecision) -> ScheduleOutcome {
        if prepared.valid_count == 0 {
            return ScheduleOutcome {
                status: ScheduleRunStatus::NothingToSchedule,
                rejections: prepared.rejections,
                conflicting: Vec::new(),
                written: Vec::new(),
                write_failures: Vec::new(),
                busy_degraded: prepared.busy_degraded,
            };
        }

        if decision == RunDecision::Cancel {
            info!(target: "app::scheduler", "run aborted before write phase, zero events written");
            return ScheduleOutcome {
                status: ScheduleRunStatus::Aborted,
                rejections: prepared.rejections,
                conflicting: prepared.partition.conflicting,
                written: Vec::new(),
                write_failures: Vec::new(),
                busy_degraded: prepared.busy_degraded,
            };
        }

        let mut written = Vec::new();
        let mut write_failures = Vec::new();

        for session in prepared.partition.non_conflicting {
            match self.calendar.create_event(&session).await {
                Ok(event_id) => {
                    debug!(
                        target: "app::scheduler",
                        title = %session.title,
                        event_id = %event_id,
                        "calendar event created"
                    );
                    written.push(WrittenEvent { event_id, session });
                }
                Err(error) => {
                    // At-least-effort semantics: keep going.
                    let wrapped = AppError::event_write(&session.title, error.to_string());
                    write_failures.push(WriteFailure {
                        session,
                        message: wrapped.to_string(),
                    });
                }
            }
        }

        info!(
            target: "app::scheduler",
            rejected = prepared.rejections.len(),
            conflicting = prepared.partition.conflicting.len(),
            written = written.len(),
            failed = write_failures.len(),
            busy_degraded = prepared.busy_degraded,
            "scheduling run finished"
        );

        ScheduleOutcome {
            status: ScheduleRunStatus::Completed,
            rejections: prepared.rejections,
            conflicting: prepared.partition.conflicting,
            written,
            write_failures,
            busy_degraded: prepared.busy_degraded,
        }
    }

    /// Convenience wrapper over [`prepare`](Self::prepare) and
    /// [`execute`](Self::execute) for callers without a confirmation step.
    pub async fn schedule(&self, records: &[JsonValue]) -> AppResult<ScheduleOutcome> {
        let prepared = self.prepare(records).await?;
        Ok(self.execute(prepared, RunDecision::Proceed).await)
    }

    async fn fetch_busy_intervals(&self, sessions: &[Session]) -> (Vec<Interval>, bool) {
        let tz = &self.preferences.timezone;
        let window = match fetch_window(sessions, tz) {
            Ok(window) => window,
            Err(error) => {
                warn!(
                    target: "app::scheduler",
                    %error,
                    "could not derive a busy-fetch window, degrading to empty busy set"
                );
                return (Vec::new(), true);
            }
        };

        match self.calendar.fetch_busy_periods(&window).await {
            Ok(periods) => {
                let mut intervals = Vec::with_capacity(periods.len());
                for period in &periods {
                    match schedule_utils::busy_interval(period, tz) {
                        Ok(interval) => intervals.push(interval),
                        Err(error) => {
                            // A single malformed busy entry must not block the run.
                            warn!(
                                target: "app::scheduler",
                                %error,
                                start = %period.start,
                                end = %period.end,
                                "skipping unparseable busy period"
                            );
                        }
                    }
                }
                (intervals, false)
            }
            Err(error) => {
                warn!(
                    target: "app::scheduler",
                    %error,
                    "busy period fetch failed, conflict checking degrades to no known conflicts"
                );
                (Vec::new(), true)
            }
        }
    }
}

/// Smallest window covering every candidate interval.
fn fetch_window(sessions: &[Session], tz: &chrono_tz::Tz) -> AppResult<TimeWindow> {
    let mut bounds: Option<(chrono::DateTime<chrono_tz::Tz>, chrono::DateTime<chrono_tz::Tz>)> =
        None;

    for session in sessions {
        let interval = schedule_utils::session_interval(session, tz)?;
        bounds = Some(match bounds {
            Some((start, end)) => (start.min(interval.start()), end.max(interval.end())),
            None => (interval.start(), interval.end()),
        });
    }

    let (start, end) =
        bounds.ok_or_else(|| AppError::validation("没有可用于计算查询窗口的会话"))?;

    Ok(TimeWindow {
        start_at: schedule_utils::format_datetime(start),
        end_at: schedule_utils::format_datetime(end),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use chrono_tz::Tz;

    #[test]
    fn fetch_window_spans_all_candidates() {
        let sessions = vec![
            Session {
                title: "Run".to_string(),
                session_type: String::new(),
                duration_minutes: 60,
                intensity: String::new(),
                notes: String::new(),
                date: NaiveDate::from_ymd_opt(2024, 1, 15),
                time: NaiveTime::from_hms_opt(9, 0, 0),
            },
            Session {
                title: "Yoga".to_string(),
                session_type: String::new(),
                duration_minutes: 90,
                intensity: String::new(),
                notes: String::new(),
                date: NaiveDate::from_ymd_opt(2024, 1, 19),
                time: NaiveTime::from_hms_opt(18, 0, 0),
            },
        ];

        let window = fetch_window(&sessions, &Tz::UTC).expect("window");
        assert!(window.start_at.starts_with("2024-01-15T09:00"));
        assert!(window.end_at.starts_with("2024-01-19T19:30"));
    }

    #[test]
    fn fetch_window_requires_at_least_one_session() {
        assert!(fetch_window(&[], &Tz::UTC).is_err());
    }
}
