use serde_json::{json, Value as JsonValue};

use crate::models::preferences::Preferences;
use crate::models::session::TrainingProgram;

/// System prompt guiding the structuring model when parsing a free-text
/// training program into sessions.
pub fn program_parsing_system_prompt() -> &'static str {
    r#"You are a fitness program parser. Read a human description of a training
program and produce a structured JSON object strictly matching this schema.
Always respond with valid UTF-8 JSON and never wrap the response in markdown
code blocks. The schema is:
{
  "program_name": string,
  "total_weeks": number,
  "sessions": [
    {
      "title": string,
      "type": string,
      "duration_minutes": number,
      "intensity": "low" | "medium" | "high",
      "notes": string
    }
  ]
}
Sessions must appear in the intended chronological order. When the text does
not state a duration, use the typical session duration from the user
preferences. Respect the weekly rest day if one is given."#
}

/// System prompt guiding the model when suggesting calendar dates for an
/// already-parsed program.
pub fn schedule_suggestion_system_prompt() -> &'static str {
    r#"You are a fitness scheduling expert. Given an ordered list of training
sessions and a start date, suggest one calendar date per session, in order.
Consider the preferred daily time window, leave rest days between high
intensity sessions, and distribute sessions evenly. Always respond with valid
UTF-8 JSON of the shape { "dates": ["YYYY-MM-DD", ...] } with exactly one
date per session, never wrapped in markdown code blocks."#
}

pub fn build_program_parse_payload(raw_text: &str, preferences: &Preferences) -> JsonValue {
    json!({
        "operation": "parseProgram",
        "input": raw_text,
        "preferences": preferences_payload(preferences),
    })
}

pub fn build_schedule_suggestion_payload(
    program: &TrainingProgram,
    start_date: chrono::NaiveDate,
    preferences: &Preferences,
) -> JsonValue {
    let sessions: Vec<JsonValue> = program
        .sessions
        .iter()
        .map(|session| {
            json!({
                "title": session.title,
                "type": session.session_type,
                "durationMinutes": session.duration_minutes,
                "intensity": session.intensity,
            })
        })
        .collect();

    json!({
        "operation": "suggestSchedule",
        "programName": program.name,
        "totalWeeks": program.total_weeks,
        "startDate": start_date.format("%Y-%m-%d").to_string(),
        "sessions": sessions,
        "preferences": preferences_payload(preferences),
    })
}

fn preferences_payload(preferences: &Preferences) -> JsonValue {
    json!({
        "timezone": preferences.timezone.name(),
        "preferredStart": preferences.preferred_start.format("%H:%M").to_string(),
        "preferredEnd": preferences.preferred_end.format("%H:%M").to_string(),
        "restDay": preferences.rest_day.map(|day| day.to_string()),
        "typicalDurationMinutes": preferences.default_duration_minutes,
    })
}
