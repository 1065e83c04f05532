use std::time::Duration;

use chrono::NaiveDate;
use httpmock::prelude::*;
use reqwest::StatusCode;
use serde_json::json;

use traincal::error::{AppResult, ParserErrorCode};
use traincal::models::preferences::Preferences;
use traincal::services::parser_service::{testing, SessionParser};

fn chat_response(content: &str) -> serde_json::Value {
    json!({
        "choices": [
            { "message": { "role": "assistant", "content": content } }
        ]
    })
}

#[tokio::test]
async fn parse_program_returns_ordered_sessions() -> AppResult<()> {
    let server = MockServer::start_async().await;
    let content = json!({
        "program_name": "5k plan",
        "total_weeks": 6,
        "sessions": [
            { "title": "Easy run", "type": "cardio", "duration_minutes": 40,
              "intensity": "low", "notes": "" },
            { "title": "Intervals", "type": "cardio", "duration_minutes": 50,
              "intensity": "high", "notes": "track" }
        ]
    })
    .to_string();

    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/v1/chat/completions")
                .header("authorization", "Bearer test-key");
            then.status(200).json_body(chat_response(&content));
        })
        .await;

    let provider = testing::provider_for(&server.base_url(), Duration::from_secs(5))?;
    let program = provider
        .parse_program("run twice a week for six weeks", &Preferences::default())
        .await?;

    mock.assert_async().await;
    assert_eq!(program.name, "5k plan");
    assert_eq!(program.total_weeks, 6);
    let titles: Vec<&str> = program.sessions.iter().map(|s| s.title.as_str()).collect();
    assert_eq!(titles, vec!["Easy run", "Intervals"]);
    assert!(program.sessions.iter().all(|s| !s.is_scheduled()));
    Ok(())
}

#[tokio::test]
async fn fenced_response_content_is_recovered() -> AppResult<()> {
    let server = MockServer::start_async().await;
    let content = "```json\n{\"dates\": [\"2024-01-15\", \"2024-01-17\"]}\n```";

    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(chat_response(content));
        })
        .await;

    let provider = testing::provider_for(&server.base_url(), Duration::from_secs(5))?;
    let program = traincal::models::session::TrainingProgram {
        name: "plan".to_string(),
        sessions: Vec::new(),
        total_weeks: 1,
    };
    let start = NaiveDate::from_ymd_opt(2024, 1, 15).expect("date");
    let dates = provider
        .suggest_dates(&program, start, &Preferences::default())
        .await?;

    assert_eq!(
        dates,
        vec![
            NaiveDate::from_ymd_opt(2024, 1, 15).expect("date"),
            NaiveDate::from_ymd_opt(2024, 1, 17).expect("date"),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn unauthorized_is_not_retried() -> AppResult<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(401).json_body(json!({ "error": "bad key" }));
        })
        .await;

    let provider = testing::provider_for(&server.base_url(), Duration::from_secs(5))?;
    let error = provider
        .parse_program("some program", &Preferences::default())
        .await
        .unwrap_err();

    assert_eq!(error.ai_code(), Some(ParserErrorCode::MissingApiKey));
    assert!(error.ai_correlation_id().is_some());
    assert_eq!(mock.hits_async().await, 1);
    Ok(())
}

#[tokio::test]
async fn non_json_content_is_an_invalid_response() -> AppResult<()> {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200)
                .json_body(chat_response("sorry, I cannot help with that"));
        })
        .await;

    let provider = testing::provider_for(&server.base_url(), Duration::from_secs(5))?;
    let error = provider
        .parse_program("some program", &Preferences::default())
        .await
        .unwrap_err();

    assert_eq!(error.ai_code(), Some(ParserErrorCode::InvalidResponse));
    Ok(())
}

#[tokio::test]
async fn empty_input_is_rejected_without_a_request() -> AppResult<()> {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/v1/chat/completions");
            then.status(200).json_body(chat_response("{}"));
        })
        .await;

    let provider = testing::provider_for(&server.base_url(), Duration::from_secs(5))?;
    let error = provider
        .parse_program("   ", &Preferences::default())
        .await
        .unwrap_err();

    assert!(error.to_string().contains("验证失败"));
    assert_eq!(mock.hits_async().await, 0);
    Ok(())
}

#[test]
fn http_status_mapping_matches_retry_policy() {
    let cases = [
        (StatusCode::UNAUTHORIZED, ParserErrorCode::MissingApiKey, false),
        (StatusCode::FORBIDDEN, ParserErrorCode::Forbidden, false),
        (StatusCode::TOO_MANY_REQUESTS, ParserErrorCode::RateLimited, true),
        (StatusCode::INTERNAL_SERVER_ERROR, ParserErrorCode::ProviderUnavailable, true),
        (StatusCode::SERVICE_UNAVAILABLE, ParserErrorCode::ProviderUnavailable, true),
        (StatusCode::BAD_REQUEST, ParserErrorCode::InvalidRequest, false),
        (StatusCode::NOT_FOUND, ParserErrorCode::InvalidRequest, false),
        (StatusCode::IM_A_TEAPOT, ParserErrorCode::Unknown, false),
    ];

    for (status, expected_code, expected_retryable) in cases {
        let (error, retryable) = testing::map_http_error(status);
        assert_eq!(error.ai_code(), Some(expected_code), "status {status}");
        assert_eq!(retryable, expected_retryable, "status {status}");
    }
}
