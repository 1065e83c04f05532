use std::path::Path;

use chrono::{NaiveTime, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{AppError, AppResult};

const DEFAULT_PREFERRED_START: &str = "09:00";
const DEFAULT_PREFERRED_END: &str = "18:00";
const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Scheduling preferences shared with the text-to-structure collaborator and
/// used by the fallback distributor.
#[derive(Debug, Clone, PartialEq)]
pub struct Preferences {
    /// The single explicit local timezone every interval is computed in.
    pub timezone: Tz,
    pub preferred_start: NaiveTime,
    pub preferred_end: NaiveTime,
    pub rest_day: Option<Weekday>,
    pub default_duration_minutes: i64,
}

/// Serialized form of [`Preferences`] (YAML file or payloads). Timezone and
/// rest day stay strings so the file format matches what users write.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesFile {
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub preferred_start: Option<String>,
    #[serde(default)]
    pub preferred_end: Option<String>,
    #[serde(default)]
    pub rest_day: Option<String>,
    #[serde(default)]
    pub default_duration_minutes: Option<i64>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            timezone: Tz::UTC,
            preferred_start: parse_time(DEFAULT_PREFERRED_START).expect("default start is valid"),
            preferred_end: parse_time(DEFAULT_PREFERRED_END).expect("default end is valid"),
            rest_day: None,
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
        }
    }
}

impl Preferences {
    /// Load preferences from the environment. Unset variables keep their
    /// defaults; unparseable values are logged and kept at defaults so a bad
    /// variable never blocks a scheduling run.
    pub fn from_env() -> Self {
        let file = PreferencesFile {
            timezone: std::env::var("TRAINCAL_TIMEZONE").ok(),
            preferred_start: std::env::var("TRAINCAL_PREFERRED_START").ok(),
            preferred_end: std::env::var("TRAINCAL_PREFERRED_END").ok(),
            rest_day: std::env::var("TRAINCAL_REST_DAY").ok(),
            default_duration_minutes: std::env::var("TRAINCAL_DEFAULT_DURATION")
                .ok()
                .and_then(|raw| raw.parse().ok()),
        };
        Self::from_file_lenient(file)
    }

    pub fn from_yaml_file(path: &Path) -> AppResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: PreferencesFile = serde_yaml::from_str(&raw)?;
        file.try_into()
    }

    fn from_file_lenient(file: PreferencesFile) -> Self {
        match Preferences::try_from(file.clone()) {
            Ok(preferences) => preferences,
            Err(error) => {
                warn!(
                    target: "app::config",
                    %error,
                    "invalid preference value, falling back to defaults for the bad fields"
                );
                let mut sanitized = file;
                // Retry field by field so one bad value does not reset the rest.
                let defaults = Preferences::default();
                let timezone = sanitized
                    .timezone
                    .take()
                    .and_then(|raw| raw.parse::<Tz>().ok())
                    .unwrap_or(defaults.timezone);
                let preferred_start = sanitized
                    .preferred_start
                    .take()
                    .and_then(|raw| parse_time(&raw).ok())
                    .unwrap_or(defaults.preferred_start);
                let preferred_end = sanitized
                    .preferred_end
                    .take()
                    .and_then(|raw| parse_time(&raw).ok())
                    .unwrap_or(defaults.preferred_end);
                let rest_day = sanitized
                    .rest_day
                    .take()
                    .and_then(|raw| parse_rest_day(&raw).ok().flatten());
                let default_duration_minutes = sanitized
                    .default_duration_minutes
                    .filter(|minutes| *minutes > 0)
                    .unwrap_or(defaults.default_duration_minutes);

                Self {
                    timezone,
                    preferred_start,
                    preferred_end,
                    rest_day,
                    default_duration_minutes,
                }
            }
        }
    }
}

impl TryFrom<PreferencesFile> for Preferences {
    type Error = AppError;

    fn try_from(file: PreferencesFile) -> AppResult<Self> {
        let defaults = Preferences::default();

        let timezone = match file.timezone {
            Some(raw) => raw
                .parse::<Tz>()
                .map_err(|_| AppError::validation(format!("无法识别的时区: {raw}")))?,
            None => defaults.timezone,
        };

        let preferred_start = match file.preferred_start {
            Some(raw) => parse_time(&raw)?,
            None => defaults.preferred_start,
        };
        let preferred_end = match file.preferred_end {
            Some(raw) => parse_time(&raw)?,
            None => defaults.preferred_end,
        };
        if preferred_end <= preferred_start {
            return Err(AppError::validation("偏好时间窗口结束必须晚于开始"));
        }

        let rest_day = match file.rest_day {
            Some(raw) => parse_rest_day(&raw)?,
            None => None,
        };

        let default_duration_minutes = match file.default_duration_minutes {
            Some(minutes) if minutes > 0 => minutes,
            Some(minutes) => {
                return Err(AppError::validation(format!(
                    "默认会话时长必须为正数: {minutes}"
                )))
            }
            None => defaults.default_duration_minutes,
        };

        Ok(Self {
            timezone,
            preferred_start,
            preferred_end,
            rest_day,
            default_duration_minutes,
        })
    }
}

fn parse_time(raw: &str) -> AppResult<NaiveTime> {
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map_err(|err| AppError::validation(format!("无效的时间格式 {raw}: {err}")))
}

fn parse_rest_day(raw: &str) -> AppResult<Option<Weekday>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse::<Weekday>()
        .map(Some)
        .map_err(|_| AppError::validation(format!("无法识别的休息日: {raw}")))
}
