//! Error taxonomy shared by every handler.
//!
//! Every fallible operation in the core funnels into [`AppError`], which
//! carries enough classification to pick the right HTTP status and body
//! shape (see spec §7). Handlers return `Result<_, AppError>` and let
//! axum's `IntoResponse` impl below do the conversion.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// The core's error currency.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Malformed JSON, missing field, bad identifier, invalid filter grammar.
    #[error("{0}")]
    Validation(String),

    /// Missing/invalid session, wrong password.
    #[error("{0}")]
    Unauthorized(String),

    /// Caller is known but the operation is disallowed by policy (e.g.
    /// anonymous signup turned off). Distinct from `Unauthorized`, which
    /// means "who are you" rather than "not for you".
    #[error("{0}")]
    Forbidden(String),

    /// Unique-violation (duplicate policy, duplicate user, duplicate migration).
    #[error("{0}")]
    Conflict(String),

    /// Setup already done, required state missing.
    #[error("{0}")]
    Precondition(String),

    /// Missing table, policy, user, file, bucket.
    #[error("{0}")]
    NotFound(String),

    /// Raw SQL error, bcrypt failure, I/O failure. Message carried verbatim.
    #[error("{0}")]
    Internal(String),
}

impl AppError {
    fn code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            Self::Precondition(_) => (StatusCode::PRECONDITION_FAILED, "precondition_failed"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.code();
        let message = self.to_string();
        if matches!(self, Self::Unauthorized(_)) {
            tracing::warn!(error = %message, "request rejected");
        } else if matches!(self, Self::Internal(_)) {
            tracing::error!(error = %message, "internal failure");
        }
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;
