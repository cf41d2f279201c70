// src/error.rs

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::json;

use crate::models::{account::AccountRef, payment::PaymentStatus};

/// Stable classification of every failure the service can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    StateConflict,
    Integrity,
    Unauthorized,
    Forbidden,
    RateLimited,
    Upstream,
}

/// Global Application Error Enum.
/// Centralizes error handling and mapping to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed or incomplete request payload.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("account {0} does not exist")]
    AccountNotFound(AccountRef),

    #[error("account {account} holds {balance} coins, {requested} requested")]
    InsufficientFunds {
        account: AccountRef,
        balance: i64,
        requested: i64,
    },

    #[error("payment signature verification failed")]
    InvalidSignature,

    #[error("payment intent is {0}")]
    InvalidState(PaymentStatus),

    #[error("section {0} has no questions")]
    NoQuestionsAvailable(i32),

    #[error("not assigned to this test or no attempts remaining")]
    NotAssigned,

    #[error("attempt has already been started")]
    AlreadyStarted,

    #[error("attempt has not been started")]
    NotStarted,

    #[error("time window for this attempt has expired")]
    WindowExpired,

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    TooManyRequests(String),

    /// The payment gateway rejected or failed a call.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Lock, transaction or commit failure. Nothing was applied.
    #[error("storage failure: {0}")]
    Integrity(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) | AppError::InvalidSignature => ErrorKind::Validation,
            AppError::NotFound(_) | AppError::AccountNotFound(_) => ErrorKind::NotFound,
            AppError::InsufficientFunds { .. }
            | AppError::InvalidState(_)
            | AppError::NoQuestionsAvailable(_)
            | AppError::NotAssigned
            | AppError::AlreadyStarted
            | AppError::NotStarted
            | AppError::WindowExpired => ErrorKind::StateConflict,
            AppError::Unauthorized(_) => ErrorKind::Unauthorized,
            AppError::Forbidden(_) => ErrorKind::Forbidden,
            AppError::TooManyRequests(_) => ErrorKind::RateLimited,
            AppError::Gateway(_) => ErrorKind::Upstream,
            AppError::Integrity(_) | AppError::Internal(_) => ErrorKind::Integrity,
        }
    }

    /// Uniform rejection for any failed token check.
    pub fn invalid_token() -> Self {
        AppError::Unauthorized("Invalid or expired token".to_string())
    }
}

/// Converts the error into a JSON response with appropriate HTTP status code.
/// Storage and upstream details are logged, never echoed.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = match kind {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::StateConflict => StatusCode::CONFLICT,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Integrity => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match kind {
            ErrorKind::Integrity => {
                tracing::error!("Internal Server Error: {}", self);
                "Internal Server Error".to_string()
            }
            ErrorKind::Upstream => {
                tracing::error!("Upstream failure: {}", self);
                "Payment gateway unavailable".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "kind": kind,
        }));

        (status, body).into_response()
    }
}

/// Converts `sqlx::Error` into `AppError::Integrity`.
/// Allows using `?` operator on database queries.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Integrity(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Validation(err.to_string())
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}
