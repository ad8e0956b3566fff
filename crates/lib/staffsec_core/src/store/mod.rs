//! Credential storage.
//!
//! The [`CredentialStore`] trait is the only way the authenticator, the
//! admin service and the bootstrap touch persisted accounts. Handles are
//! built once at startup and shared as `Arc<dyn CredentialStore>`.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::auth::{Credential, LockoutState, NewCredential, ProfileUpdate};

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Db(#[from] sqlx::Error),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// How a login name is matched against stored accounts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginLookup {
    /// Case-insensitive equality.
    #[default]
    Exact,
    /// Case-insensitive substring match, lowest id wins.
    Partial,
}

impl std::str::FromStr for LoginLookup {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(Self::Exact),
            "partial" => Ok(Self::Partial),
            other => Err(format!("unknown login lookup mode: {other}")),
        }
    }
}

/// The two authorization axes an account can be a member of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    Role,
    Group,
}

impl Membership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Membership::Role => "role",
            Membership::Group => "group",
        }
    }
}

/// Persisted accounts with their lockout counters and memberships.
///
/// Deleted accounts are invisible to every lookup.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find an active-or-blocked (not deleted) account by login name.
    async fn find_by_login(
        &self,
        login: &str,
        lookup: LoginLookup,
    ) -> StoreResult<Option<Credential>>;

    /// Find a not-deleted account by id.
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Credential>>;

    /// All not-deleted accounts, by id.
    async fn list(&self) -> StoreResult<Vec<Credential>>;

    /// Successful login: `last_login = at`, `attempt = 0`.
    async fn record_success(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()>;

    /// Failed verification, applied atomically. See [`LockoutState::after_failure`].
    async fn record_failure(&self, id: i64, ceiling: i32) -> StoreResult<LockoutState>;

    /// Replace the password hash, keeping lockout counters.
    async fn set_password(&self, id: i64, hash: &str, at: DateTime<Utc>) -> StoreResult<()>;

    /// Replace the password hash and clear `attempt` and `blocked`.
    async fn reset_password(&self, id: i64, hash: &str, at: DateTime<Utc>)
    -> StoreResult<Credential>;

    /// Create an account. Fails with `Conflict` when the login name is taken.
    async fn create(&self, new: NewCredential) -> StoreResult<Credential>;

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> StoreResult<Credential>;

    /// Set the blocked flag. Unblocking also resets `attempt`.
    async fn set_blocked(&self, id: i64, blocked: bool) -> StoreResult<Credential>;

    /// Mark an account deleted. Returns false when it did not exist.
    async fn soft_delete(&self, id: i64) -> StoreResult<bool>;

    /// Make sure a role or group name exists.
    async fn ensure_name(&self, kind: Membership, name: &str) -> StoreResult<()>;

    /// Add a role or group to an account. Unknown names are `NotFound`.
    async fn grant(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential>;

    /// Remove a role or group from an account.
    async fn revoke(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential>;
}
