//! Authentication and authorization logic.
//!
//! Password hashing, JWT issuance and verification, the login/refresh
//! flows with lockout bookkeeping, and the per-request access guard.

pub mod authenticator;
pub mod guard;
pub mod jwt;
pub mod password;

use thiserror::Error;

use crate::revocation::CacheError;
use crate::store::StoreError;

/// Authentication errors.
///
/// `Denied` covers wrong passwords, blocked accounts, unknown login
/// names and role/group mismatches alike.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("malformed token or request")]
    Malformed,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("expired")]
    Expired,

    #[error("denied")]
    Denied,

    #[error("unauthorized")]
    Unauthorized,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Revocation cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Internal error: {0}")]
    Internal(String),
}
