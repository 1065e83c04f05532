use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

use crate::error::{AppError, AppResult};

/// A single training session. Either unscheduled (no date/time) or scheduled
/// (both present), never partially scheduled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub title: String,
    pub session_type: String,
    pub duration_minutes: i64,
    pub intensity: String,
    pub notes: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
}

/// A complete training program as returned by the text-to-structure
/// collaborator. Session order is meaningful: it is the intended
/// chronological/priority order before scheduling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrainingProgram {
    pub name: String,
    pub sessions: Vec<Session>,
    pub total_weeks: i64,
}

/// Per-record report for a candidate that failed validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RecordRejection {
    pub index: usize,
    pub message: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
}

const PARSED_REQUIRED_KEYS: [&str; 5] =
    ["title", "type", "duration_minutes", "intensity", "notes"];
const CANDIDATE_REQUIRED_KEYS: [&str; 5] = ["title", "date", "time", "duration_min", "description"];

impl Session {
    /// Validate a raw record in the parsed form produced by the
    /// text-to-structure collaborator (unscheduled).
    pub fn from_parsed_record(value: &JsonValue) -> AppResult<Self> {
        let missing = missing_keys(value, &PARSED_REQUIRED_KEYS);
        if !missing.is_empty() {
            return Err(AppError::validation_with_details(
                "会话记录缺少必填字段",
                json!({ "missingFields": missing }),
            ));
        }

        let title = require_non_empty_str(value, "title")?;
        let duration_minutes = require_positive_minutes(value, "duration_minutes")?;

        Ok(Session {
            title,
            session_type: str_field(value, "type"),
            duration_minutes,
            intensity: str_field(value, "intensity"),
            notes: str_field(value, "notes"),
            date: None,
            time: None,
        })
    }

    /// Validate a raw record in the scheduled-candidate form (carries a
    /// concrete date and time, `description` maps to notes).
    pub fn from_candidate_record(value: &JsonValue) -> AppResult<Self> {
        let missing = missing_keys(value, &CANDIDATE_REQUIRED_KEYS);
        if !missing.is_empty() {
            return Err(AppError::validation_with_details(
                "候选会话记录缺少必填字段",
                json!({ "missingFields": missing }),
            ));
        }

        let title = require_non_empty_str(value, "title")?;
        let duration_minutes = require_positive_minutes(value, "duration_min")?;

        let raw_date = value["date"].as_str().unwrap_or_default();
        let date = NaiveDate::parse_from_str(raw_date, "%Y-%m-%d").map_err(|err| {
            AppError::validation_with_details(
                "候选会话日期格式无效",
                json!({ "value": raw_date, "error": err.to_string() }),
            )
        })?;

        let raw_time = value["time"].as_str().unwrap_or_default();
        let time = NaiveTime::parse_from_str(raw_time, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw_time, "%H:%M:%S"))
            .map_err(|err| {
                AppError::validation_with_details(
                    "候选会话时间格式无效",
                    json!({ "value": raw_time, "error": err.to_string() }),
                )
            })?;

        Ok(Session {
            title,
            session_type: str_field(value, "type"),
            duration_minutes,
            intensity: str_field(value, "intensity"),
            notes: str_field(value, "description"),
            date: Some(date),
            time: Some(time),
        })
    }

    pub fn is_scheduled(&self) -> bool {
        self.date.is_some() && self.time.is_some()
    }

    /// Return a scheduled copy. Assigning date and time together keeps the
    /// never-partially-scheduled invariant.
    pub fn scheduled_at(&self, date: NaiveDate, time: NaiveTime) -> Self {
        let mut session = self.clone();
        session.date = Some(date);
        session.time = Some(time);
        session
    }

    /// Event description handed to the calendar collaborator.
    pub fn event_description(&self) -> String {
        format!(
            "Type: {}\nIntensity: {}\nNotes: {}",
            self.session_type, self.intensity, self.notes
        )
    }

    /// Human-readable one-liner with enough detail to explain a scheduling
    /// decision (title, date, time, duration).
    pub fn format_display(&self) -> String {
        match (self.date, self.time) {
            (Some(date), Some(time)) => format!(
                "{} - {} {} ({} 分钟)",
                self.title,
                date.format("%Y-%m-%d"),
                time.format("%H:%M"),
                self.duration_minutes
            ),
            _ => format!("{} - 未排期 ({} 分钟)", self.title, self.duration_minutes),
        }
    }
}

fn missing_keys(value: &JsonValue, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|key| value.get(**key).map_or(true, JsonValue::is_null))
        .map(|key| (*key).to_string())
        .collect()
}

fn str_field(value: &JsonValue, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}

fn require_non_empty_str(value: &JsonValue, key: &str) -> AppResult<String> {
    let raw = value[key].as_str().unwrap_or_default().trim();
    if raw.is_empty() {
        return Err(AppError::validation_with_details(
            "会话标题不能为空",
            json!({ "field": key }),
        ));
    }
    Ok(raw.to_string())
}

fn require_positive_minutes(value: &JsonValue, key: &str) -> AppResult<i64> {
    let minutes = value[key].as_i64().ok_or_else(|| {
        AppError::validation_with_details(
            "会话时长必须是整数分钟",
            json!({ "field": key, "value": value[key].clone() }),
        )
    })?;
    if minutes <= 0 {
        return Err(AppError::validation_with_details(
            "会话时长必须为正数",
            json!({ "field": key, "value": minutes }),
        ));
    }
    Ok(minutes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candidate_record_with_all_fields_is_accepted() {
        let record = json!({
            "title": "Tempo Run",
            "date": "2024-01-15",
            "time": "09:00",
            "duration_min": 45,
            "description": "Zone 3, flat course"
        });

        let session = Session::from_candidate_record(&record).expect("valid record");
        assert_eq!(session.title, "Tempo Run");
        assert_eq!(session.duration_minutes, 45);
        assert_eq!(session.notes, "Zone 3, flat course");
        assert!(session.is_scheduled());
    }

    #[test]
    fn candidate_record_missing_fields_reports_every_field() {
        let record = json!({ "title": "Gym" });

        let error = Session::from_candidate_record(&record).unwrap_err();
        let details = error.validation_details().expect("details");
        let missing = details["missingFields"]
            .as_array()
            .expect("missing field list");
        let names: Vec<&str> = missing.iter().filter_map(|v| v.as_str()).collect();
        assert_eq!(names, vec!["date", "time", "duration_min", "description"]);
    }

    #[test]
    fn parsed_record_requires_positive_duration() {
        let record = json!({
            "title": "Yoga",
            "type": "flexibility",
            "duration_minutes": 0,
            "intensity": "low",
            "notes": ""
        });

        assert!(Session::from_parsed_record(&record).is_err());
    }

    #[test]
    fn parsed_record_is_unscheduled() {
        let record = json!({
            "title": "Intervals",
            "type": "cardio",
            "duration_minutes": 40,
            "intensity": "high",
            "notes": "8x400m"
        });

        let session = Session::from_parsed_record(&record).expect("valid record");
        assert!(!session.is_scheduled());
        assert!(session.date.is_none());
        assert!(session.time.is_none());
    }

    #[test]
    fn scheduled_at_sets_date_and_time_together() {
        let record = json!({
            "title": "Swim",
            "type": "cardio",
            "duration_minutes": 30,
            "intensity": "medium",
            "notes": ""
        });
        let session = Session::from_parsed_record(&record).expect("valid record");

        let scheduled = session.scheduled_at(
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"),
            NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
        );
        assert!(scheduled.is_scheduled());
        // Source session stays untouched.
        assert!(!session.is_scheduled());
    }
}
