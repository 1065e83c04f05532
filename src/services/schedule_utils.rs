use chrono::{offset::LocalResult, DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use serde_json::json;

use crate::error::{AppError, AppResult};
use crate::models::calendar::BusyPeriod;
use crate::models::session::Session;

/// A half-open `[start, end)` interval in the configured local timezone.
/// `start < end` strictly; zero-length intervals are rejected at
/// construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

impl Interval {
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> AppResult<Self> {
        if end <= start {
            return Err(AppError::validation_with_details(
                "时间区间无效：结束必须晚于开始",
                json!({ "start": start.to_rfc3339(), "end": end.to_rfc3339() }),
            ));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }
}

/// Half-open overlap test. Intervals that merely touch at an endpoint do not
/// overlap.
pub fn overlaps(a: &Interval, b: &Interval) -> bool {
    a.start < b.end && b.start < a.end
}

/// Compute the concrete interval a scheduled session occupies:
/// `[date + time, date + time + duration_minutes)` in the given timezone.
pub fn session_interval(session: &Session, tz: &Tz) -> AppResult<Interval> {
    let (date, time) = match (session.date, session.time) {
        (Some(date), Some(time)) => (date, time),
        _ => {
            return Err(AppError::validation_with_details(
                "会话尚未安排日期或时间",
                json!({ "title": session.title }),
            ))
        }
    };

    let start = local_datetime(date.and_time(time), tz)?;
    let end = start
        .checked_add_signed(Duration::minutes(session.duration_minutes))
        .ok_or_else(|| AppError::validation("时间计算超出范围"))?;
    Interval::new(start, end)
}

/// Normalize an externally reported busy period to a local interval. Date-only
/// values are all-day markers and expand to `[midnight, midnight + 24h)`.
pub fn busy_interval(busy: &BusyPeriod, tz: &Tz) -> AppResult<Interval> {
    let start = parse_local_datetime(&busy.start, tz)?;
    let mut end = parse_local_datetime(&busy.end, tz)?;

    // All-day markers sometimes report the same calendar date for both ends;
    // expand those to a full local day rather than rejecting them.
    if end <= start && is_date_only(&busy.start) && is_date_only(&busy.end) {
        end = start + Duration::days(1);
    }

    Interval::new(start, end)
}

/// Parse a timestamp reported by a collaborator. Accepts RFC 3339 (converted
/// to the local timezone), a naive timestamp (assumed already local, never
/// silently UTC), or a bare date (local midnight).
pub fn parse_local_datetime(value: &str, tz: &Tz) -> AppResult<DateTime<Tz>> {
    if is_date_only(value) {
        let date =
            NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| invalid(value, err))?;
        return local_datetime(date.and_time(chrono::NaiveTime::MIN), tz);
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.with_timezone(tz));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M"))
        .map_err(|err| invalid(value, err))?;
    local_datetime(naive, tz)
}

pub fn format_datetime(dt: DateTime<Tz>) -> String {
    dt.to_rfc3339()
}

fn local_datetime(naive: NaiveDateTime, tz: &Tz) -> AppResult<DateTime<Tz>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt),
        // DST fold: the earlier instant wins.
        LocalResult::Ambiguous(first, _) => Ok(first),
        LocalResult::None => Err(AppError::validation_with_details(
            "本地时间在该时区不存在",
            json!({ "value": naive.to_string(), "timezone": tz.name() }),
        )),
    }
}

fn is_date_only(value: &str) -> bool {
    value.len() == 10 && value.as_bytes().get(4) == Some(&b'-')
}

fn invalid(value: &str, err: impl std::fmt::Display) -> AppError {
    AppError::validation_with_details(
        "无效的时间格式",
        json!({ "value": value, "error": err.to_string() }),
    )
}
