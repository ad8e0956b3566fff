//! Application error types.

use axum::extract::rejection::JsonRejection;
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use staffsec_core::auth::AuthError;
use staffsec_core::store::StoreError;
use thiserror::Error;
use tracing::error;

use crate::models::ErrorResponse;

/// Convenience alias for handler return types.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal server error")]
    Internal(String),
}

impl AppError {
    /// Map an access guard rejection. Signature and parse failures share
    /// one message.
    pub fn from_guard(e: AuthError) -> Self {
        match e {
            AuthError::Malformed => AppError::BadRequest("invalid token".into()),
            AuthError::InvalidSignature => AppError::Unauthorized("invalid token".into()),
            AuthError::Expired => AppError::Unauthorized("token expired".into()),
            AuthError::Denied => AppError::Unauthorized("access denied".into()),
            AuthError::Unauthorized => AppError::Unauthorized("unauthorized".into()),
            other => AppError::from(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.as_str()),
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.as_str()),
            AppError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.as_str()),
            AppError::Internal(detail) => {
                error!(%detail, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal server error")
            }
        };
        let body = Json(ErrorResponse {
            error: true,
            msg: msg.to_string(),
        });
        (status, body).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(e: JsonRejection) -> Self {
        AppError::BadRequest(e.body_text())
    }
}

impl From<StoreError> for AppError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(m) => AppError::NotFound(m),
            StoreError::Conflict(m) => AppError::BadRequest(m),
            StoreError::Db(e) => AppError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Malformed => AppError::BadRequest("malformed request".into()),
            AuthError::InvalidSignature
            | AuthError::Expired
            | AuthError::Denied
            | AuthError::Unauthorized => AppError::Unauthorized(e.to_string()),
            AuthError::Store(e) => AppError::from(e),
            AuthError::Cache(e) => AppError::Internal(e.to_string()),
            AuthError::Internal(m) => AppError::Internal(m),
        }
    }
}
