use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

/// Application error taxonomy (§7): every failure belongs to one of these
/// categories, each with a stable `code` and a fixed HTTP status mapping so
/// callers can distinguish "retry me" from "fix your request" from "the
/// system is broken" without parsing message text. `Forbidden` is the one
/// addition past the original five — a request that is well-formed and
/// doesn't conflict with anything, but is rejected on its merits (e.g. an
/// insufficient stake proof), which doesn't fit `Input` or `Consistency`.
#[derive(Debug, Error)]
pub enum AppError {
    /// Transient: the caller should retry, optionally after `retry_after`.
    /// Covers RPC timeouts, connection resets, rate-limit backoff.
    #[error("{message}")]
    Transient {
        message: String,
        retry_after: Option<std::time::Duration>,
    },

    /// Input: the request itself is malformed or fails validation.
    #[error("{0}")]
    Input(String),

    /// Consistency: the request conflicts with current state (stale
    /// cursor version, regressing heartbeat sequence, double-assignment).
    #[error("{0}")]
    Consistency(String),

    /// Protocol: a decode/ABI/wire-format mismatch. Surfaced, not
    /// silently swallowed, per the undecodable-event design (§4.2).
    #[error("{0}")]
    Protocol(String),

    /// Forbidden: the request is well-formed but rejected on its merits
    /// (e.g. a stake proof below the required minimum).
    #[error("{0}")]
    Forbidden(String),

    /// Fatal: unrecoverable — missing migration, corrupted config,
    /// exhausted retries on a non-idempotent operation.
    #[error("{0}")]
    Fatal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// Stable machine-readable code, independent of the human message.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Transient { .. } => "transient",
            AppError::Input(_) => "input",
            AppError::Consistency(_) => "consistency",
            AppError::Protocol(_) => "protocol",
            AppError::Forbidden(_) => "forbidden",
            AppError::Fatal(_) => "fatal",
            AppError::Database(_) => "transient",
            AppError::Redis(_) => "transient",
            AppError::NotFound(_) => "input",
        }
    }

    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            AppError::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Transient { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Input(_) => StatusCode::BAD_REQUEST,
            AppError::Consistency(_) => StatusCode::CONFLICT,
            AppError::Protocol(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Fatal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Redis(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
        };

        let mut body = json!({
            "code": self.code(),
            "message": self.to_string(),
        });
        if let Some(retry_after) = self.retry_after() {
            body["retry_after"] = json!(retry_after.as_secs());
        }

        (status, Json(body)).into_response()
    }
}
