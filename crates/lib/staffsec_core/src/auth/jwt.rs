//! JWT token generation and verification.
//!
//! Access and refresh tokens are HS256 JWTs signed with two distinct
//! secrets. Verification checks the signature and the claim shape only;
//! comparing `expires` against the clock is left to the caller.

use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::info;

use super::AuthError;
use crate::models::auth::{AccessClaims, Credential, RefreshClaims, TokenPair};

/// Default access token lifetime.
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 15;

/// Default refresh token lifetime.
pub const DEFAULT_REFRESH_TTL_HOURS: i64 = 24;

/// Signs and verifies access and refresh tokens.
#[derive(Clone)]
pub struct TokenCodec {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenCodec {
    pub fn new(
        access_secret: &[u8],
        refresh_secret: &[u8],
        access_ttl: Duration,
        refresh_ttl: Duration,
    ) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(access_secret),
            access_decoding: DecodingKey::from_secret(access_secret),
            refresh_encoding: EncodingKey::from_secret(refresh_secret),
            refresh_decoding: DecodingKey::from_secret(refresh_secret),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn access_ttl(&self) -> Duration {
        self.access_ttl
    }

    /// Sign an access token for `subject`, expiring `ttl` from now.
    pub fn issue_access_with_ttl(
        &self,
        subject: &Credential,
        ttl: Duration,
    ) -> Result<String, AuthError> {
        let claims = AccessClaims {
            id: subject.id,
            fullname: subject.full_name.clone(),
            username: Some(subject.user_name.clone()),
            roles: subject.roles.clone(),
            groups: subject.groups.clone(),
            expires: expiry(ttl)?,
        };
        sign(&claims, &self.access_encoding)
    }

    /// Sign an access token with the configured lifetime.
    pub fn issue_access(&self, subject: &Credential) -> Result<String, AuthError> {
        self.issue_access_with_ttl(subject, self.access_ttl)
    }

    /// Sign a refresh token for `subject_id`, expiring `ttl` from now.
    pub fn issue_refresh_with_ttl(&self, subject_id: i64, ttl: Duration) -> Result<String, AuthError> {
        let claims = RefreshClaims {
            id: subject_id,
            expires: expiry(ttl)?,
        };
        sign(&claims, &self.refresh_encoding)
    }

    /// Sign a refresh token with the configured lifetime.
    pub fn issue_refresh(&self, subject_id: i64) -> Result<String, AuthError> {
        self.issue_refresh_with_ttl(subject_id, self.refresh_ttl)
    }

    /// Mint an access + refresh pair carrying the credential's current
    /// roles and groups.
    pub fn issue_pair(&self, subject: &Credential) -> Result<TokenPair, AuthError> {
        Ok(TokenPair {
            access: self.issue_access(subject)?,
            refresh: self.issue_refresh(subject.id)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, AuthError> {
        verify(token, &self.access_decoding)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, AuthError> {
        verify(token, &self.refresh_decoding)
    }
}

/// Unix time `ttl` from now.
fn expiry(ttl: Duration) -> Result<i64, AuthError> {
    Utc::now()
        .checked_add_signed(ttl)
        .map(|at| at.timestamp())
        .ok_or_else(|| AuthError::Internal(format!("token lifetime out of range: {ttl}")))
}

fn sign<T: Serialize>(claims: &T, key: &EncodingKey) -> Result<String, AuthError> {
    encode(&Header::new(Algorithm::HS256), claims, key)
        .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))
}

fn verify<T: DeserializeOwned>(token: &str, key: &DecodingKey) -> Result<T, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    // `expires` is a custom claim checked by the guard.
    validation.validate_exp = false;
    validation.required_spec_claims.clear();
    decode::<T>(token, key, &validation)
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => AuthError::InvalidSignature,
            _ => AuthError::Malformed,
        })
}

/// Resolve a signing secret: env var `var` → persisted file → generated.
pub fn resolve_secret(var: &str, file_name: &str) -> String {
    resolve_secret_at(var, &secret_path(file_name))
}

/// Resolve a secret from `var`, falling back to the file at `path`.
/// A fresh random secret is written to `path` when neither is usable.
pub fn resolve_secret_at(var: &str, path: &Path) -> String {
    if let Ok(secret) = std::env::var(var)
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(existing) = std::fs::read_to_string(path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, &secret);
    info!(path = %path.display(), var, "generated new signing secret");
    secret
}

/// Path to a persisted secret file.
fn secret_path(file_name: &str) -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("staffsec")
        .join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::new(
            b"access-secret",
            b"refresh-secret",
            Duration::minutes(DEFAULT_ACCESS_TTL_MINUTES),
            Duration::hours(DEFAULT_REFRESH_TTL_HOURS),
        )
    }

    fn alice() -> Credential {
        let now = Utc::now();
        Credential {
            id: 7,
            full_name: "Alice Example".into(),
            user_name: "alice".into(),
            email: "alice@example.com".into(),
            password_hash: String::new(),
            created_at: now,
            updated_at: Some(now),
            last_login: None,
            password_changed_at: now,
            blocked: false,
            attempt: 0,
            deleted: false,
            roles: vec!["admin".into(), "user".into()],
            groups: vec!["admins".into()],
        }
    }

    #[test]
    fn access_token_carries_claims_in_order() {
        let codec = codec();
        let token = codec.issue_access(&alice()).unwrap();
        let claims = codec.verify_access(&token).unwrap();
        assert_eq!(claims.id, 7);
        assert_eq!(claims.fullname, "Alice Example");
        assert_eq!(claims.username.as_deref(), Some("alice"));
        assert_eq!(claims.roles, vec!["admin", "user"]);
        assert_eq!(claims.groups, vec!["admins"]);
        let expected = (Utc::now() + Duration::minutes(15)).timestamp();
        assert!((claims.expires - expected).abs() <= 2);
    }

    #[test]
    fn refresh_token_carries_subject_and_expiry() {
        let codec = codec();
        let token = codec.issue_refresh(7).unwrap();
        let claims = codec.verify_refresh(&token).unwrap();
        assert_eq!(claims.id, 7);
        let expected = (Utc::now() + Duration::hours(24)).timestamp();
        assert!((claims.expires - expected).abs() <= 2);
    }

    #[test]
    fn expired_token_still_verifies() {
        let codec = codec();
        let token = codec
            .issue_access_with_ttl(&alice(), Duration::minutes(-5))
            .unwrap();
        let claims = codec.verify_access(&token).unwrap();
        assert!(claims.expires < Utc::now().timestamp());
    }

    #[test]
    fn secrets_are_not_interchangeable() {
        let codec = codec();
        let access = codec.issue_access(&alice()).unwrap();
        let refresh = codec.issue_refresh(7).unwrap();
        assert!(matches!(
            codec.verify_refresh(&access),
            Err(AuthError::InvalidSignature)
        ));
        assert!(matches!(
            codec.verify_access(&refresh),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn foreign_secret_is_invalid_signature() {
        let other = TokenCodec::new(b"x", b"y", Duration::minutes(1), Duration::hours(1));
        let token = other.issue_access(&alice()).unwrap();
        assert!(matches!(
            codec().verify_access(&token),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn unrepresentable_expiry_is_an_error() {
        let codec = TokenCodec::new(b"a", b"r", Duration::days(100_000_000), Duration::hours(1));
        assert!(matches!(codec.issue_access(&alice()), Err(AuthError::Internal(_))));
        assert!(matches!(
            codec.issue_refresh_with_ttl(7, Duration::days(100_000_000)),
            Err(AuthError::Internal(_))
        ));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            codec().verify_access("not.a.jwt"),
            Err(AuthError::Malformed)
        ));
        assert!(matches!(codec().verify_access(""), Err(AuthError::Malformed)));
    }

    #[test]
    fn access_token_missing_fields_is_malformed() {
        // A refresh-shaped payload signed with the access secret lacks roles/groups.
        let codec = codec();
        let token = sign(
            &RefreshClaims { id: 1, expires: 0 },
            &EncodingKey::from_secret(b"access-secret"),
        )
        .unwrap();
        assert!(matches!(codec.verify_access(&token), Err(AuthError::Malformed)));
    }

    #[test]
    fn resolve_secret_generates_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jwt-secret");
        let var = "STAFFSEC_TEST_SECRET_THAT_IS_NEVER_SET";
        let first = resolve_secret_at(var, &path);
        assert_eq!(first.len(), 64);
        let second = resolve_secret_at(var, &path);
        assert_eq!(first, second);
    }
}
