use std::fmt;

use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParserErrorCode {
    MissingApiKey,
    Forbidden,
    HttpTimeout,
    RateLimited,
    InvalidResponse,
    InvalidRequest,
    ProviderUnavailable,
    Unknown,
}

impl ParserErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ParserErrorCode::MissingApiKey => "MISSING_API_KEY",
            ParserErrorCode::Forbidden => "FORBIDDEN",
            ParserErrorCode::HttpTimeout => "HTTP_TIMEOUT",
            ParserErrorCode::RateLimited => "RATE_LIMITED",
            ParserErrorCode::InvalidResponse => "INVALID_RESPONSE",
            ParserErrorCode::InvalidRequest => "INVALID_REQUEST",
            ParserErrorCode::ProviderUnavailable => "PROVIDER_UNAVAILABLE",
            ParserErrorCode::Unknown => "UNKNOWN_PARSER_ERROR",
        }
    }
}

impl fmt::Display for ParserErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("验证失败: {message}")]
    Validation {
        message: String,
        details: Option<JsonValue>,
    },

    #[error("获取忙碌时段失败: {message}")]
    BusyPeriodFetch { message: String },

    #[error("日程生成失败: {message}")]
    ScheduleGeneration { message: String },

    #[error("写入日历事件失败: {title} - {message}")]
    EventWrite { title: String, message: String },

    #[error("{message}")]
    Ai {
        code: ParserErrorCode,
        message: String,
        correlation_id: Option<String>,
        details: Option<JsonValue>,
    },

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("配置文件解析错误: {0}")]
    Config(#[from] serde_yaml::Error),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, details = %details, "validation error with details");
        AppError::Validation {
            message,
            details: Some(details),
        }
    }

    pub fn busy_period_fetch(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::scheduler", %message, "busy period fetch failed");
        AppError::BusyPeriodFetch { message }
    }

    pub fn schedule_generation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::planner", %message, "schedule generation failed");
        AppError::ScheduleGeneration { message }
    }

    pub fn event_write(title: impl Into<String>, message: impl Into<String>) -> Self {
        let title = title.into();
        let message = message.into();
        warn!(target: "app::scheduler", %title, %message, "event write failed");
        AppError::EventWrite { title, message }
    }

    pub fn ai(code: ParserErrorCode, message: impl Into<String>) -> Self {
        Self::ai_with_details(code, message, None, None)
    }

    pub fn ai_with_details(
        code: ParserErrorCode,
        message: impl Into<String>,
        correlation_id: Option<&str>,
        details: Option<JsonValue>,
    ) -> Self {
        let message = message.into();
        let correlation = correlation_id.map(|value| value.to_string());
        match (&correlation, &details) {
            (Some(id), Some(payload)) => {
                warn!(
                    target: "app::parser::error",
                    code = %code,
                    correlation_id = %id,
                    details = %payload,
                    %message
                );
            }
            (Some(id), None) => {
                warn!(
                    target: "app::parser::error",
                    code = %code,
                    correlation_id = %id,
                    %message
                );
            }
            (None, Some(payload)) => {
                warn!(target: "app::parser::error", code = %code, details = %payload, %message);
            }
            (None, None) => {
                warn!(target: "app::parser::error", code = %code, %message);
            }
        }

        AppError::Ai {
            code,
            message,
            correlation_id: correlation,
            details,
        }
    }

    pub fn ai_code(&self) -> Option<ParserErrorCode> {
        match self {
            AppError::Ai { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn ai_correlation_id(&self) -> Option<&str> {
        match self {
            AppError::Ai { correlation_id, .. } => correlation_id.as_deref(),
            _ => None,
        }
    }

    pub fn validation_details(&self) -> Option<&JsonValue> {
        match self {
            AppError::Validation { details, .. } => details.as_ref(),
            _ => None,
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }
}
