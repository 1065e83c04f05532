use serde::{Deserialize, Serialize};

/// A busy interval reported by the calendar collaborator. Timestamps are
/// carried verbatim: RFC 3339, a naive local timestamp, or a date-only
/// all-day marker. Normalization happens in `services::schedule_utils`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BusyPeriod {
    pub start: String,
    pub end: String,
}

/// Query window for busy-period lookups.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimeWindow {
    pub start_at: String,
    pub end_at: String,
}
