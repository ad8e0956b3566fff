//! Request and response bodies.
//!
//! Field names match what the existing web frontend sends and expects.

use serde::{Deserialize, Serialize};
use staffsec_core::models::auth::TokenPair;

/// Body of guard and server failures.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: bool,
    pub msg: String,
}

/// `POST /login`
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// `PATCH /login`
#[derive(Debug, Deserialize)]
pub struct PasswordChangeRequest {
    pub username: String,
    pub password: String,
    pub new_pswd: String,
}

/// `DELETE /login`, body optional.
#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Outcome of `POST /login` and `PATCH /login`.
#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
}

impl LoginResponse {
    pub const AUTHENTICATED: &'static str = "Authenticated";
    pub const EXPIRED: &'static str = "Expired";
    pub const DENIED: &'static str = "Denied";
    pub const UNAUTHORIZED: &'static str = "unauthorized";

    pub fn message(message: &'static str) -> Self {
        Self {
            message,
            tokens: None,
        }
    }

    pub fn authenticated(tokens: TokenPair) -> Self {
        Self {
            message: Self::AUTHENTICATED,
            tokens: Some(tokens),
        }
    }
}

/// `POST /user` and `PATCH /user`
#[derive(Debug, Deserialize)]
pub struct UserRequest {
    pub username: String,
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
}
