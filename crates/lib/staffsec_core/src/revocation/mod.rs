//! Revocation cache for logged-out tokens.
//!
//! Entries are keyed by the raw token string and live as long as the
//! token itself would have.

pub mod memory;
pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Revocation cache errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Tokens explicitly invalidated before their natural expiry.
#[async_trait]
pub trait RevocationCache: Send + Sync {
    /// Mark `token` revoked for `ttl`.
    async fn revoke(&self, token: &str, ttl: Duration) -> Result<(), CacheError>;

    /// True when `token` has been revoked and the entry has not yet lapsed.
    async fn is_revoked(&self, token: &str) -> Result<bool, CacheError>;
}
