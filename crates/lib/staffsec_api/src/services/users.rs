//! Account administration: create, edit, block, reset and delete
//! accounts, and manage role/group membership.

use std::str::FromStr;

use chrono::Utc;
use staffsec_core::auth::password::hash_password;
use staffsec_core::models::auth::{Credential, NewCredential, ProfileUpdate};
use staffsec_core::store::{CredentialStore, LoginLookup, Membership};
use tracing::info;

use crate::error::{AppError, AppResult};
use crate::models::UserRequest;

/// `GET /user/{action}/{id}` actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    /// Toggle the blocked flag.
    Block,
    /// Reset the password to the default and clear lockout.
    Drop,
}

impl FromStr for UserAction {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "block" => Ok(Self::Block),
            "drop" => Ok(Self::Drop),
            other => Err(AppError::BadRequest(format!("unknown action '{other}'"))),
        }
    }
}

pub async fn list(store: &dyn CredentialStore) -> AppResult<Vec<Credential>> {
    Ok(store.list().await?)
}

/// Create an account with `default_password`.
pub async fn create(
    store: &dyn CredentialStore,
    req: UserRequest,
    default_password: &str,
) -> AppResult<Credential> {
    let user_name = req.username.trim();
    if user_name.is_empty() {
        return Err(AppError::BadRequest("username is required".into()));
    }
    let created = store
        .create(NewCredential {
            user_name: user_name.to_string(),
            full_name: req.full_name,
            email: req.email,
            password_hash: hash_password(default_password)?,
        })
        .await?;
    info!(user_id = created.id, "account created");
    Ok(created)
}

/// Update the profile of the account whose login matches exactly.
pub async fn update(store: &dyn CredentialStore, req: UserRequest) -> AppResult<Credential> {
    let existing = store
        .find_by_login(req.username.trim(), LoginLookup::Exact)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user '{}'", req.username)))?;
    let updated = store
        .update_profile(
            existing.id,
            ProfileUpdate {
                full_name: req.full_name,
                email: req.email,
            },
        )
        .await?;
    Ok(updated)
}

pub async fn delete(store: &dyn CredentialStore, id: i64) -> AppResult<()> {
    if !store.soft_delete(id).await? {
        return Err(AppError::NotFound(format!("user {id}")));
    }
    info!(user_id = id, "account deleted");
    Ok(())
}

/// Apply `action` to account `id` on behalf of administrator `actor_id`.
pub async fn apply_action(
    store: &dyn CredentialStore,
    actor_id: i64,
    action: UserAction,
    id: i64,
    default_password: &str,
) -> AppResult<Credential> {
    let target = store
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("user {id}")))?;

    match action {
        UserAction::Block => {
            let block = !target.blocked;
            if block && actor_id == id {
                return Err(AppError::BadRequest("cannot block yourself".into()));
            }
            let updated = store.set_blocked(id, block).await?;
            info!(user_id = id, blocked = block, "block flag changed");
            Ok(updated)
        }
        UserAction::Drop => {
            let hash = hash_password(default_password)?;
            let updated = store.reset_password(id, &hash, Utc::now()).await?;
            info!(user_id = id, "password reset to default");
            Ok(updated)
        }
    }
}

pub async fn grant(
    store: &dyn CredentialStore,
    kind: Membership,
    name: &str,
    user_id: i64,
) -> AppResult<Credential> {
    let updated = store.grant(user_id, kind, name).await?;
    info!(user_id, kind = kind.as_str(), name, "membership granted");
    Ok(updated)
}

pub async fn revoke(
    store: &dyn CredentialStore,
    kind: Membership,
    name: &str,
    user_id: i64,
) -> AppResult<Credential> {
    let updated = store.revoke(user_id, kind, name).await?;
    info!(user_id, kind = kind.as_str(), name, "membership revoked");
    Ok(updated)
}
