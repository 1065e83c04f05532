use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};

use traincal::error::{AppError, AppResult};
use traincal::models::calendar::{BusyPeriod, TimeWindow};
use traincal::models::preferences::Preferences;
use traincal::models::session::Session;
use traincal::services::calendar_service::CalendarProvider;
use traincal::services::scheduler_service::{
    RunDecision, ScheduleRunStatus, SchedulerService,
};

/// In-memory calendar double with injectable fetch and write failures.
#[derive(Default)]
struct MemoryCalendar {
    busy: Vec<BusyPeriod>,
    fail_fetch: bool,
    fail_titles: HashSet<String>,
    created_titles: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl MemoryCalendar {
    fn with_busy(busy: Vec<BusyPeriod>) -> Self {
        Self {
            busy,
            ..Self::default()
        }
    }

    fn created(&self) -> Vec<String> {
        self.created_titles
            .lock()
            .expect("created_titles lock")
            .clone()
    }
}

#[async_trait]
impl CalendarProvider for MemoryCalendar {
    async fn fetch_busy_periods(&self, _window: &TimeWindow) -> AppResult<Vec<BusyPeriod>> {
        if self.fail_fetch {
            return Err(AppError::busy_period_fetch("日历服务暂时不可用"));
        }
        Ok(self.busy.clone())
    }

    async fn create_event(&self, session: &Session) -> AppResult<String> {
        if self.fail_titles.contains(&session.title) {
            return Err(AppError::other("日历拒绝了写入请求"));
        }
        self.created_titles
            .lock()
            .expect("created_titles lock")
            .push(session.title.clone());
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        Ok(format!("evt-{id}"))
    }
}

fn record(title: &str, date: &str, time: &str, duration_min: i64) -> JsonValue {
    json!({
        "title": title,
        "date": date,
        "time": time,
        "duration_min": duration_min,
        "description": "",
        "type": "training",
        "intensity": "medium"
    })
}

fn service(calendar: MemoryCalendar) -> (SchedulerService, Arc<MemoryCalendar>) {
    let calendar = Arc::new(calendar);
    let service = SchedulerService::new(calendar.clone(), Preferences::default());
    (service, calendar)
}

#[tokio::test]
async fn busy_overlap_splits_candidates_and_writes_the_rest() -> AppResult<()> {
    let busy = vec![BusyPeriod {
        start: "2024-01-17T09:00:00".to_string(),
        end: "2024-01-17T10:00:00".to_string(),
    }];
    let (service, calendar) = service(MemoryCalendar::with_busy(busy));

    let records = vec![
        record("Run", "2024-01-15", "09:00", 60),
        record("Gym", "2024-01-17", "09:00", 60),
        record("Yoga", "2024-01-19", "09:00", 60),
    ];

    let outcome = service.schedule(&records).await?;

    assert_eq!(outcome.status, ScheduleRunStatus::Completed);
    assert!(!outcome.busy_degraded);
    assert_eq!(outcome.rejected_count(), 0);
    assert_eq!(outcome.conflicting_count(), 1);
    assert_eq!(outcome.conflicting[0].session.title, "Gym");
    assert!(outcome.conflicting[0].message.contains("Gym"));
    assert_eq!(outcome.written_count(), 2);
    assert_eq!(calendar.created(), vec!["Run", "Yoga"]);
    Ok(())
}

#[tokio::test]
async fn touching_busy_period_is_not_a_conflict() -> AppResult<()> {
    // Busy block ends exactly when the session starts.
    let busy = vec![BusyPeriod {
        start: "2024-01-15T08:00:00".to_string(),
        end: "2024-01-15T09:00:00".to_string(),
    }];
    let (service, _calendar) = service(MemoryCalendar::with_busy(busy));

    let outcome = service
        .schedule(&[record("Run", "2024-01-15", "09:00", 60)])
        .await?;

    assert_eq!(outcome.conflicting_count(), 0);
    assert_eq!(outcome.written_count(), 1);
    Ok(())
}

#[tokio::test]
async fn all_day_busy_marker_blocks_the_whole_day() -> AppResult<()> {
    let busy = vec![BusyPeriod {
        start: "2024-01-17".to_string(),
        end: "2024-01-17".to_string(),
    }];
    let (service, _calendar) = service(MemoryCalendar::with_busy(busy));

    let outcome = service
        .schedule(&[
            record("Gym", "2024-01-17", "21:00", 60),
            record("Run", "2024-01-18", "09:00", 60),
        ])
        .await?;

    assert_eq!(outcome.conflicting_count(), 1);
    assert_eq!(outcome.conflicting[0].session.title, "Gym");
    assert_eq!(outcome.written_count(), 1);
    Ok(())
}

#[tokio::test]
async fn fetch_failure_degrades_to_no_known_conflicts() -> AppResult<()> {
    let calendar = MemoryCalendar {
        fail_fetch: true,
        ..MemoryCalendar::default()
    };
    let (service, calendar) = service(calendar);

    let outcome = service
        .schedule(&[
            record("Run", "2024-01-15", "09:00", 60),
            record("Gym", "2024-01-17", "09:00", 60),
        ])
        .await?;

    assert_eq!(outcome.status, ScheduleRunStatus::Completed);
    assert!(outcome.busy_degraded);
    assert_eq!(outcome.conflicting_count(), 0);
    assert_eq!(outcome.written_count(), 2);
    assert_eq!(calendar.created().len(), 2);
    Ok(())
}

#[tokio::test]
async fn cancel_aborts_before_any_write() -> AppResult<()> {
    let (service, calendar) = service(MemoryCalendar::default());

    let prepared = service
        .prepare(&[record("Run", "2024-01-15", "09:00", 60)])
        .await?;
    let outcome = service.execute(prepared, RunDecision::Cancel).await;

    assert_eq!(outcome.status, ScheduleRunStatus::Aborted);
    assert_eq!(outcome.written_count(), 0);
    assert!(calendar.created().is_empty());
    Ok(())
}

#[tokio::test]
async fn failed_write_is_skipped_and_later_writes_continue() -> AppResult<()> {
    let calendar = MemoryCalendar {
        fail_titles: HashSet::from(["Gym".to_string()]),
        ..MemoryCalendar::default()
    };
    let (service, calendar) = service(calendar);

    let outcome = service
        .schedule(&[
            record("Run", "2024-01-15", "09:00", 60),
            record("Gym", "2024-01-17", "09:00", 60),
            record("Yoga", "2024-01-19", "09:00", 60),
        ])
        .await?;

    assert_eq!(outcome.status, ScheduleRunStatus::Completed);
    assert_eq!(outcome.failed_write_count(), 1);
    assert_eq!(outcome.write_failures[0].session.title, "Gym");
    assert!(outcome.write_failures[0].message.contains("Gym"));
    assert_eq!(outcome.written_count(), 2);
    assert_eq!(calendar.created(), vec!["Run", "Yoga"]);
    Ok(())
}

#[tokio::test]
async fn invalid_records_are_rejected_with_reports() -> AppResult<()> {
    let (service, _calendar) = service(MemoryCalendar::default());

    let records = vec![
        record("Run", "2024-01-15", "09:00", 60),
        json!({ "title": "missing everything" }),
        record("", "2024-01-17", "09:00", 60),
    ];

    let outcome = service.schedule(&records).await?;

    assert_eq!(outcome.rejected_count(), 2);
    assert_eq!(outcome.rejections[0].index, 1);
    assert!(outcome.rejections[0]
        .missing_fields
        .contains(&"date".to_string()));
    assert_eq!(outcome.rejections[1].index, 2);
    assert_eq!(outcome.written_count(), 1);
    Ok(())
}

#[tokio::test]
async fn zero_valid_records_is_nothing_to_schedule() -> AppResult<()> {
    let (service, calendar) = service(MemoryCalendar::default());

    let outcome = service
        .schedule(&[json!({}), json!({ "title": "no date" })])
        .await?;

    assert_eq!(outcome.status, ScheduleRunStatus::NothingToSchedule);
    assert_eq!(outcome.rejected_count(), 2);
    assert_eq!(outcome.written_count(), 0);
    assert!(calendar.created().is_empty());
    Ok(())
}

#[tokio::test]
async fn counts_reconcile_with_the_candidate_list() -> AppResult<()> {
    let busy = vec![BusyPeriod {
        start: "2024-01-17T09:30:00".to_string(),
        end: "2024-01-17T09:45:00".to_string(),
    }];
    let calendar = MemoryCalendar {
        busy,
        fail_titles: HashSet::from(["Yoga".to_string()]),
        ..MemoryCalendar::default()
    };
    let (service, _calendar) = service(calendar);

    let records = vec![
        record("Run", "2024-01-15", "09:00", 60),
        record("Gym", "2024-01-17", "09:00", 60),
        record("Yoga", "2024-01-19", "09:00", 60),
        json!({ "title": "broken" }),
    ];

    let outcome = service.schedule(&records).await?;

    let accounted = outcome.rejected_count()
        + outcome.conflicting_count()
        + outcome.written_count()
        + outcome.failed_write_count();
    assert_eq!(accounted, records.len());
    Ok(())
}
