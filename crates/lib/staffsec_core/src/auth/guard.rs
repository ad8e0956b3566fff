//! Access guard: bearer token validation and role/group enforcement.
//!
//! Evaluated once at the start of every protected request, in a fixed
//! order: bearer extraction, revocation, signature, expiry, membership.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::debug;

use super::AuthError;
use super::jwt::TokenCodec;
use crate::models::auth::AccessClaims;
use crate::revocation::RevocationCache;

/// Roles and groups a route demands. An empty list leaves that axis open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequirement {
    pub roles: Vec<String>,
    pub groups: Vec<String>,
}

impl AuthorizationRequirement {
    /// Any valid token.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn new<R, G>(roles: R, groups: G) -> Self
    where
        R: IntoIterator,
        R::Item: Into<String>,
        G: IntoIterator,
        G::Item: Into<String>,
    {
        Self {
            roles: roles.into_iter().map(Into::into).collect(),
            groups: groups.into_iter().map(Into::into).collect(),
        }
    }

    /// Administrative routes: role `admin` and group `admins`.
    pub fn admin() -> Self {
        Self::new(["admin"], ["admins"])
    }

    /// Both axes must hold.
    pub fn is_satisfied_by(&self, roles: &[String], groups: &[String]) -> bool {
        axis_satisfied(&self.roles, roles) && axis_satisfied(&self.groups, groups)
    }
}

fn axis_satisfied(required: &[String], held: &[String]) -> bool {
    required.is_empty() || required.iter().any(|r| held.contains(r))
}

/// Identity resolved from a verified access token.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub id: i64,
    pub fullname: String,
    pub username: Option<String>,
    pub roles: Vec<String>,
    pub groups: Vec<String>,
    pub expires: i64,
    /// Raw bearer token, needed for logout.
    #[serde(skip)]
    pub token: String,
}

impl Principal {
    fn from_claims(claims: AccessClaims, token: &str) -> Self {
        Self {
            id: claims.id,
            fullname: claims.fullname,
            username: claims.username,
            roles: claims.roles,
            groups: claims.groups,
            expires: claims.expires,
            token: token.to_string(),
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` value.
pub fn bearer_token(header: Option<&str>) -> Result<&str, AuthError> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::Malformed)
}

/// Validates bearer tokens against the codec and the revocation cache.
#[derive(Clone)]
pub struct AccessGuard {
    codec: TokenCodec,
    cache: Arc<dyn RevocationCache>,
}

impl AccessGuard {
    pub fn new(codec: TokenCodec, cache: Arc<dyn RevocationCache>) -> Self {
        Self { codec, cache }
    }

    /// Resolve the caller of a request carrying `header`, or fail.
    pub async fn authorize(
        &self,
        header: Option<&str>,
        requirement: &AuthorizationRequirement,
    ) -> Result<Principal, AuthError> {
        let token = bearer_token(header)?;

        if self.cache.is_revoked(token).await? {
            debug!("rejected revoked token");
            return Err(AuthError::Unauthorized);
        }

        let claims = self.codec.verify_access(token)?;

        if Utc::now().timestamp() > claims.expires {
            return Err(AuthError::Expired);
        }

        if !requirement.is_satisfied_by(&claims.roles, &claims.groups) {
            debug!(user_id = claims.id, "role/group requirement not met");
            return Err(AuthError::Denied);
        }

        Ok(Principal::from_claims(claims, token))
    }
}
