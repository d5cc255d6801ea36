use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::utils::{error_codes, error_to_api_response};

/// 同步相关的所有错误
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited by Spond, try again later")]
    RateLimit,

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected response from Spond{}: {message}", fmt_status(.status))]
    Protocol { status: Option<u16>, message: String },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Spond integration is not configured")]
    NotConfigured,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sync task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl SyncError {
    pub fn protocol(status: Option<u16>, message: impl Into<String>) -> Self {
        SyncError::Protocol {
            status,
            message: message.into(),
        }
    }

    /// 远端返回 404，说明事件在 Spond 上已被删除
    pub fn is_remote_not_found(&self) -> bool {
        matches!(
            self,
            SyncError::NotFound(_) | SyncError::Protocol { status: Some(404), .. }
        )
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            SyncError::Auth(_) => StatusCode::UNAUTHORIZED,
            SyncError::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            SyncError::Network(_) | SyncError::Protocol { .. } => StatusCode::BAD_GATEWAY,
            SyncError::Validation(_) | SyncError::NotConfigured => StatusCode::BAD_REQUEST,
            SyncError::NotFound(_) => StatusCode::NOT_FOUND,
            SyncError::Conflict(_) => StatusCode::CONFLICT,
            SyncError::Database(_)
            | SyncError::Cache(_)
            | SyncError::Serialization(_)
            | SyncError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> i32 {
        match self {
            SyncError::Auth(_) => error_codes::AUTH_FAILED,
            SyncError::RateLimit => error_codes::RATE_LIMIT,
            SyncError::Network(_) | SyncError::Protocol { .. } => error_codes::REMOTE_ERROR,
            SyncError::Validation(_) => error_codes::VALIDATION_ERROR,
            SyncError::NotConfigured => error_codes::NOT_CONFIGURED,
            SyncError::NotFound(_) => error_codes::NOT_FOUND,
            SyncError::Conflict(_) => error_codes::CONFLICT,
            SyncError::Database(_)
            | SyncError::Cache(_)
            | SyncError::Serialization(_)
            | SyncError::Task(_) => error_codes::INTERNAL_ERROR,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() || err.is_request() {
            SyncError::Network(err.to_string())
        } else if err.is_decode() {
            SyncError::protocol(None, format!("malformed response body: {}", err))
        } else {
            SyncError::protocol(err.status().map(|s| s.as_u16()), err.to_string())
        }
    }
}

impl IntoResponse for SyncError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (
            status,
            error_to_api_response::<()>(self.error_code(), self.to_string()),
        )
            .into_response()
    }
}
