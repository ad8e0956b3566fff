//! Authentication domain models.
//!
//! These are internal domain models. Field names on the wire follow the
//! legacy frontend (`fullname`, `username`, `created`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored account.
///
/// The bcrypt hash stays inside the process: it is never serialised.
#[derive(Debug, Clone, Serialize)]
pub struct Credential {
    pub id: i64,
    #[serde(rename = "fullname")]
    pub full_name: String,
    #[serde(rename = "username")]
    pub user_name: String,
    pub email: String,
    #[serde(skip)]
    pub password_hash: String,
    #[serde(rename = "created")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updated")]
    pub updated_at: Option<DateTime<Utc>>,
    pub last_login: Option<DateTime<Utc>>,
    #[serde(rename = "password_changed")]
    pub password_changed_at: DateTime<Utc>,
    pub blocked: bool,
    pub attempt: i32,
    #[serde(skip)]
    pub deleted: bool,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

impl Credential {
    /// True when the account can be presented to a login or refresh flow.
    pub fn is_active(&self) -> bool {
        !self.blocked && !self.deleted
    }
}

/// Fields required to create an account.
#[derive(Debug, Clone)]
pub struct NewCredential {
    pub user_name: String,
    pub full_name: String,
    pub email: String,
    pub password_hash: String,
}

/// Mutable profile fields, applied by administrators.
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub full_name: String,
    pub email: String,
}

/// Lockout counters after a failed verification was recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub attempt: i32,
    pub blocked: bool,
}

impl LockoutState {
    /// State after one more failed verification: the counter grows until
    /// it reaches `ceiling`, the next failure blocks instead.
    pub fn after_failure(self, ceiling: i32) -> Self {
        if self.attempt < ceiling {
            Self {
                attempt: self.attempt + 1,
                blocked: self.blocked,
            }
        } else {
            Self {
                attempt: self.attempt,
                blocked: true,
            }
        }
    }
}

/// Claims embedded in access tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Credential id.
    pub id: i64,
    pub fullname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    /// Absolute expiry (unix seconds).
    pub expires: i64,
}

/// Claims embedded in refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub id: i64,
    pub expires: i64,
}

/// Freshly minted access + refresh tokens.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}
