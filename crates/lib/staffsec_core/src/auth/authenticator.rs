//! Login, password change, refresh and logout flows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::AuthError;
use super::jwt::TokenCodec;
use super::password::{hash_password, verify_password};
use crate::models::auth::{Credential, TokenPair};
use crate::revocation::RevocationCache;
use crate::store::{CredentialStore, LoginLookup};

/// Failed verifications tolerated before an account is blocked.
pub const MAX_FAILED_ATTEMPTS: i32 = 9;

/// Maximum account age before login answers `Expired`.
pub const ACCOUNT_MAX_AGE_DAYS: i64 = 365;

/// Tunables for the login flow.
#[derive(Debug, Clone, Copy)]
pub struct AuthPolicy {
    pub lookup: LoginLookup,
    pub max_failed_attempts: i32,
    pub account_max_age: Duration,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            lookup: LoginLookup::Exact,
            max_failed_attempts: MAX_FAILED_ATTEMPTS,
            account_max_age: Duration::days(ACCOUNT_MAX_AGE_DAYS),
        }
    }
}

/// Credential verification and token lifecycle.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn RevocationCache>,
    codec: TokenCodec,
    policy: AuthPolicy,
}

impl Authenticator {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn RevocationCache>,
        codec: TokenCodec,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            cache,
            codec,
            policy,
        }
    }

    /// Verify `password` for `username` and mint a token pair.
    ///
    /// Fails with `Denied` for unknown, blocked or deleted accounts and for
    /// wrong passwords, and with `Expired` when the account is too old.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, AuthError> {
        let credential = self.verified(username, password).await?;

        let now = Utc::now();
        if self.account_expired(&credential, now) {
            info!(user_id = credential.id, "login refused: account expired");
            return Err(AuthError::Expired);
        }

        self.store.record_success(credential.id, now).await?;
        let tokens = self.codec.issue_pair(&credential)?;
        info!(user_id = credential.id, "login succeeded");
        Ok(tokens)
    }

    /// Replace the password after re-verifying the current one.
    pub async fn change_password(
        &self,
        username: &str,
        password: &str,
        new_password: &str,
    ) -> Result<(), AuthError> {
        if new_password.is_empty() {
            return Err(AuthError::Malformed);
        }
        let credential = self.verified(username, password).await?;
        let hash = hash_password(new_password)?;
        self.store
            .set_password(credential.id, &hash, Utc::now())
            .await?;
        info!(user_id = credential.id, "password changed");
        Ok(())
    }

    /// Mint a new access token from a refresh token, or from an access
    /// token that has not yet expired.
    ///
    /// Roles and groups come from the live record, not from the claims.
    pub async fn refresh(&self, token: &str) -> Result<String, AuthError> {
        if self.cache.is_revoked(token).await? {
            return Err(AuthError::Unauthorized);
        }

        let (subject_id, expires) = match self.codec.verify_refresh(token) {
            Ok(claims) => (claims.id, claims.expires),
            Err(AuthError::InvalidSignature) => {
                let claims = self.codec.verify_access(token)?;
                (claims.id, claims.expires)
            }
            Err(e) => return Err(e),
        };

        if Utc::now().timestamp() > expires {
            return Err(AuthError::Expired);
        }

        let credential = self
            .store
            .find_by_id(subject_id)
            .await?
            .filter(Credential::is_active)
            .ok_or_else(|| {
                debug!(user_id = subject_id, "refresh for missing or blocked account");
                AuthError::Unauthorized
            })?;

        self.codec.issue_access(&credential)
    }

    /// Revoke `token` for the rest of its lifetime.
    ///
    /// Only the presented token is affected. A refresh token issued with it
    /// stays usable until [`Authenticator::revoke_refresh`] is called on it.
    pub async fn logout(&self, token: &str, expires: i64) -> Result<(), AuthError> {
        let remaining = expires - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }
        let ttl = std::time::Duration::from_secs(remaining.max(1) as u64);
        self.cache.revoke(token, ttl).await?;
        debug!(ttl_secs = ttl.as_secs(), "token revoked");
        Ok(())
    }

    /// Revoke a refresh token belonging to `subject_id`.
    pub async fn revoke_refresh(&self, token: &str, subject_id: i64) -> Result<(), AuthError> {
        let claims = self.codec.verify_refresh(token)?;
        if claims.id != subject_id {
            debug!(user_id = subject_id, "refresh token of another subject");
            return Err(AuthError::Unauthorized);
        }
        self.logout(token, claims.expires).await
    }

    /// Current record of an authenticated subject.
    pub async fn current(&self, id: i64) -> Result<Credential, AuthError> {
        self.store
            .find_by_id(id)
            .await?
            .ok_or(AuthError::Unauthorized)
    }

    /// Look up `username` and check `password`, recording a failure on
    /// mismatch.
    async fn verified(&self, username: &str, password: &str) -> Result<Credential, AuthError> {
        let Some(credential) = self
            .store
            .find_by_login(username, self.policy.lookup)
            .await?
        else {
            debug!("login for unknown account");
            return Err(AuthError::Denied);
        };

        if !credential.is_active() {
            debug!(user_id = credential.id, "login for blocked account");
            return Err(AuthError::Denied);
        }

        if !verify_password(password, &credential.password_hash) {
            let state = self
                .store
                .record_failure(credential.id, self.policy.max_failed_attempts)
                .await?;
            if state.blocked {
                warn!(user_id = credential.id, "account blocked after repeated failures");
            } else {
                debug!(user_id = credential.id, attempt = state.attempt, "wrong password");
            }
            return Err(AuthError::Denied);
        }

        Ok(credential)
    }

    fn account_expired(&self, credential: &Credential, now: DateTime<Utc>) -> bool {
        credential.updated_at.is_none() || now - credential.created_at >= self.policy.account_max_age
    }
}
