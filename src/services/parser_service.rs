use std::time::{Duration as StdDuration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use serde_json::{json, Value as JsonValue};
use tokio::time::sleep;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, AppResult, ParserErrorCode};
use crate::models::preferences::Preferences;
use crate::models::session::{Session, TrainingProgram};
use crate::services::prompt_templates::{
    build_program_parse_payload, build_schedule_suggestion_payload, program_parsing_system_prompt,
    schedule_suggestion_system_prompt,
};

/// Boundary to the external text-to-structure service.
#[async_trait]
pub trait SessionParser: Send + Sync {
    /// Turn free text into an ordered, unscheduled session list.
    async fn parse_program(
        &self,
        raw_text: &str,
        preferences: &Preferences,
    ) -> AppResult<TrainingProgram>;

    /// Suggest one calendar date per session, in session order.
    async fn suggest_dates(
        &self,
        program: &TrainingProgram,
        start_date: NaiveDate,
        preferences: &Preferences,
    ) -> AppResult<Vec<NaiveDate>>;
}

#[derive(Debug, Clone)]
pub struct ParserConfig {
    pub api_key: Option<String>,
    pub api_base_url: String,
    pub model: String,
    pub http_timeout: StdDuration,
}

impl ParserConfig {
    pub fn from_env() -> Self {
        let api_key = std::env::var("TRAINCAL_PARSER_API_KEY").ok();
        let api_base_url = std::env::var("TRAINCAL_PARSER_BASE_URL")
            .ok()
            .unwrap_or_else(|| "https://api.deepseek.com".to_string());
        let model = std::env::var("TRAINCAL_PARSER_MODEL")
            .ok()
            .unwrap_or_else(|| "deepseek-chat".to_string());

        Self {
            api_key,
            api_base_url,
            model,
            http_timeout: StdDuration::from_secs(30),
        }
    }

    pub fn build_provider(&self) -> AppResult<Option<HttpSessionParser>> {
        match &self.api_key {
            Some(api_key) => Ok(Some(HttpSessionParser::try_new(self, api_key.clone())?)),
            None => Ok(None),
        }
    }
}

/// OpenAI-compatible chat-completions client for the structuring service.
pub struct HttpSessionParser {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    model: String,
}

#[derive(Clone, Copy)]
enum ParserOperation {
    ParseProgram,
    SuggestSchedule,
}

impl ParserOperation {
    fn as_str(self) -> &'static str {
        match self {
            ParserOperation::ParseProgram => "parseProgram",
            ParserOperation::SuggestSchedule => "suggestSchedule",
        }
    }

    fn system_prompt(self) -> &'static str {
        match self {
            ParserOperation::ParseProgram => program_parsing_system_prompt(),
            ParserOperation::SuggestSchedule => schedule_suggestion_system_prompt(),
        }
    }

    fn temperature(self) -> f32 {
        match self {
            ParserOperation::ParseProgram => 0.1,
            ParserOperation::SuggestSchedule => 0.1,
        }
    }
}

struct ChatInvocationResult {
    content: JsonValue,
    latency_ms: u128,
    correlation_id: String,
}

impl HttpSessionParser {
    fn try_new(config: &ParserConfig, api_key: String) -> AppResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Some(StdDuration::from_secs(90)))
            .build()
            .map_err(|err| AppError::other(format!("初始化结构化服务 HTTP 客户端失败: {err}")))?;

        let base_url = config.api_base_url.trim_end_matches('/').to_string();
        let endpoint = format!("{}/v1/chat/completions", base_url);

        Ok(Self {
            client,
            api_key,
            endpoint,
            model: config.model.clone(),
        })
    }

    async fn invoke_chat(
        &self,
        operation: ParserOperation,
        payload: JsonValue,
    ) -> AppResult<ChatInvocationResult> {
        let correlation_id = Uuid::new_v4().to_string();
        let request_body = self.build_request_body(operation, &payload);
        let backoff_schedule = [
            StdDuration::from_secs(0),
            StdDuration::from_secs(1),
            StdDuration::from_secs(2),
            StdDuration::from_secs(4),
        ];

        let mut last_error: Option<AppError> = None;

        for (attempt, delay) in backoff_schedule.iter().enumerate() {
            if *delay > StdDuration::from_secs(0) {
                sleep(*delay).await;
            }

            debug!(
                target: "app::parser",
                operation = operation.as_str(),
                attempt = attempt + 1,
                correlation_id = %correlation_id,
                "invoking structuring service"
            );

            let start = Instant::now();
            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&request_body)
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let latency_ms = start.elapsed().as_millis();

                        let body: JsonValue = resp.json().await.map_err(|err| {
                            AppError::ai_with_details(
                                ParserErrorCode::InvalidResponse,
                                "解析结构化服务响应失败",
                                Some(correlation_id.as_str()),
                                Some(json!({ "reason": err.to_string() })),
                            )
                        })?;

                        let content = body
                            .pointer("/choices/0/message/content")
                            .and_then(|value| value.as_str())
                            .ok_or_else(|| {
                                AppError::ai_with_details(
                                    ParserErrorCode::InvalidResponse,
                                    "结构化服务响应缺少 message.content 字段",
                                    Some(correlation_id.as_str()),
                                    Some(json!({ "reason": "missing_message_content" })),
                                )
                            })?;
                        let content_value = Self::parse_content(content, &correlation_id)?;

                        debug!(
                            target: "app::parser",
                            correlation_id = %correlation_id,
                            latency_ms,
                            "structuring service responded"
                        );

                        return Ok(ChatInvocationResult {
                            content: content_value,
                            latency_ms,
                            correlation_id,
                        });
                    }

                    let (error, retryable) = Self::map_http_error(status, correlation_id.as_str());
                    warn!(
                        target: "app::parser",
                        correlation_id = %correlation_id,
                        status = status.as_u16(),
                        retryable,
                        "structuring service returned non-success status"
                    );

                    if !retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(error);
                    }

                    last_error = Some(error);
                    continue;
                }
                Err(err) => {
                    let (error, retryable) = Self::error_from_reqwest(err, correlation_id.as_str());
                    warn!(
                        target: "app::parser",
                        correlation_id = %correlation_id,
                        retryable,
                        "structuring service request error"
                    );

                    if !retryable || attempt == backoff_schedule.len() - 1 {
                        return Err(error);
                    }

                    last_error = Some(error);
                    continue;
                }
            }
        }

        if let Some(error) = last_error {
            Err(error)
        } else {
            Err(AppError::ai_with_details(
                ParserErrorCode::ProviderUnavailable,
                "结构化服务请求失败",
                Some(correlation_id.as_str()),
                None,
            ))
        }
    }

    fn build_request_body(&self, operation: ParserOperation, payload: &JsonValue) -> JsonValue {
        let user_content = serde_json::to_string(payload).unwrap_or_else(|_| "{}".to_string());
        json!({
            "model": self.model,
            "temperature": operation.temperature(),
            "top_p": 0.9,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": operation.system_prompt() },
                { "role": "user", "content": user_content }
            ]
        })
    }

    fn parse_content(content: &str, correlation_id: &str) -> AppResult<JsonValue> {
        let trimmed = content.trim();
        let cleaned = if trimmed.starts_with("```") {
            let without_prefix = trimmed
                .trim_start_matches("```json")
                .trim_start_matches("```JSON")
                .trim_start_matches("```");
            let without_suffix = without_prefix.trim_end_matches("```").trim();
            without_suffix.to_string()
        } else {
            trimmed.to_string()
        };

        serde_json::from_str(&cleaned).map_err(|err| {
            AppError::ai_with_details(
                ParserErrorCode::InvalidResponse,
                format!("结构化服务响应内容非 JSON: {err}"),
                Some(correlation_id),
                Some(json!({ "reason": "invalid_json" })),
            )
        })
    }

    fn map_http_error(status: StatusCode, correlation_id: &str) -> (AppError, bool) {
        match status {
            StatusCode::UNAUTHORIZED => (
                AppError::ai_with_details(
                    ParserErrorCode::MissingApiKey,
                    "结构化服务 API Key 无效或未授权",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::FORBIDDEN => (
                AppError::ai_with_details(
                    ParserErrorCode::Forbidden,
                    "结构化服务 API 权限不足",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::TOO_MANY_REQUESTS => (
                AppError::ai_with_details(
                    ParserErrorCode::RateLimited,
                    "结构化服务请求过于频繁，请稍后重试",
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            status if status.is_server_error() => (
                AppError::ai_with_details(
                    ParserErrorCode::ProviderUnavailable,
                    format!("结构化服务暂时不可用 (状态码 {})", status.as_u16()),
                    Some(correlation_id),
                    None,
                ),
                true,
            ),
            StatusCode::BAD_REQUEST => (
                AppError::ai_with_details(
                    ParserErrorCode::InvalidRequest,
                    "结构化服务请求格式无效",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            StatusCode::NOT_FOUND => (
                AppError::ai_with_details(
                    ParserErrorCode::InvalidRequest,
                    "结构化服务接口地址无效",
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
            status => (
                AppError::ai_with_details(
                    ParserErrorCode::Unknown,
                    format!("结构化服务返回错误状态码 {}", status.as_u16()),
                    Some(correlation_id),
                    None,
                ),
                false,
            ),
        }
    }

    fn error_from_reqwest(err: reqwest::Error, correlation_id: &str) -> (AppError, bool) {
        if err.is_timeout() {
            (
                AppError::ai_with_details(
                    ParserErrorCode::HttpTimeout,
                    "结构化服务请求超时",
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else if err.is_connect() {
            (
                AppError::ai_with_details(
                    ParserErrorCode::ProviderUnavailable,
                    "结构化服务网络连接失败",
                    Some(correlation_id),
                    None,
                ),
                true,
            )
        } else if let Some(status) = err.status() {
            Self::map_http_error(status, correlation_id)
        } else {
            (
                AppError::ai_with_details(
                    ParserErrorCode::Unknown,
                    format!("结构化服务请求失败: {err}"),
                    Some(correlation_id),
                    None,
                ),
                false,
            )
        }
    }
}

/// Convert a parseProgram response payload into a validated program. Invalid
/// session records are logged and skipped; they never abort the rest.
fn program_from_payload(payload: &JsonValue, correlation_id: &str) -> AppResult<TrainingProgram> {
    let name = payload
        .get("program_name")
        .and_then(JsonValue::as_str)
        .unwrap_or("Training program")
        .to_string();

    let total_weeks = payload
        .get("total_weeks")
        .and_then(JsonValue::as_i64)
        .filter(|weeks| *weeks > 0)
        .unwrap_or(1);

    let records = payload
        .get("sessions")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| {
            AppError::ai_with_details(
                ParserErrorCode::InvalidResponse,
                "结构化服务响应缺少 sessions 数组",
                Some(correlation_id),
                None,
            )
        })?;

    let mut sessions = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        match Session::from_parsed_record(record) {
            Ok(session) => sessions.push(session),
            Err(error) => {
                warn!(
                    target: "app::parser",
                    correlation_id = %correlation_id,
                    index,
                    %error,
                    "skipping invalid session record from structuring service"
                );
            }
        }
    }

    if sessions.is_empty() {
        return Err(AppError::ai_with_details(
            ParserErrorCode::InvalidResponse,
            "解析结果不包含任何有效会话",
            Some(correlation_id),
            None,
        ));
    }

    Ok(TrainingProgram {
        name,
        sessions,
        total_weeks,
    })
}

fn dates_from_payload(payload: &JsonValue, correlation_id: &str) -> AppResult<Vec<NaiveDate>> {
    let raw_dates = payload
        .get("dates")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| {
            AppError::ai_with_details(
                ParserErrorCode::InvalidResponse,
                "结构化服务响应缺少 dates 数组",
                Some(correlation_id),
                None,
            )
        })?;

    raw_dates
        .iter()
        .map(|value| {
            let raw = value.as_str().unwrap_or_default();
            NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|err| {
                AppError::ai_with_details(
                    ParserErrorCode::InvalidResponse,
                    format!("建议日期格式无效: {raw}"),
                    Some(correlation_id),
                    Some(json!({ "error": err.to_string() })),
                )
            })
        })
        .collect()
}

#[async_trait]
impl SessionParser for HttpSessionParser {
    async fn parse_program(
        &self,
        raw_text: &str,
        preferences: &Preferences,
    ) -> AppResult<TrainingProgram> {
        let trimmed = raw_text.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("待解析内容不能为空"));
        }

        let payload = build_program_parse_payload(trimmed, preferences);
        let result = self.invoke_chat(ParserOperation::ParseProgram, payload).await?;

        let program = program_from_payload(&result.content, &result.correlation_id)?;
        debug!(
            target: "app::parser",
            correlation_id = %result.correlation_id,
            latency_ms = result.latency_ms,
            sessions = program.sessions.len(),
            "program parsed"
        );
        Ok(program)
    }

    async fn suggest_dates(
        &self,
        program: &TrainingProgram,
        start_date: NaiveDate,
        preferences: &Preferences,
    ) -> AppResult<Vec<NaiveDate>> {
        let payload = build_schedule_suggestion_payload(program, start_date, preferences);
        let result = self
            .invoke_chat(ParserOperation::SuggestSchedule, payload)
            .await?;

        dates_from_payload(&result.content, &result.correlation_id)
    }
}

pub mod testing {
    use super::*;

    /// Expose HTTP error mapping for integration tests without widening the
    /// public API surface.
    pub fn map_http_error(status: StatusCode) -> (AppError, bool) {
        HttpSessionParser::map_http_error(status, "test-correlation-id")
    }

    pub fn provider_for(base_url: &str, timeout: StdDuration) -> AppResult<HttpSessionParser> {
        let config = ParserConfig {
            api_key: Some("test-key".to_string()),
            api_base_url: base_url.trim_end_matches('/').to_string(),
            model: "deepseek-chat".to_string(),
            http_timeout: timeout,
        };
        HttpSessionParser::try_new(&config, "test-key".to_string())
    }
}
