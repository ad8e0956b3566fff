//! First-run setup: schema migrations and seed data.
//!
//! Safe to run repeatedly; existing roles, groups and the superadmin
//! account are left untouched.

use sqlx::PgPool;
use thiserror::Error;
use tracing::info;

use crate::auth::AuthError;
use crate::auth::password::hash_password;
use crate::models::auth::NewCredential;
use crate::store::{CredentialStore, LoginLookup, Membership, StoreError};

/// Roles every deployment starts with.
pub const DEFAULT_ROLES: [&str; 3] = ["admin", "user", "api"];

/// Groups every deployment starts with.
pub const DEFAULT_GROUPS: [&str; 3] = ["admins", "staffsec", "api"];

/// Login name of the seeded administrator.
pub const SUPERADMIN: &str = "superadmin";

/// Password given to seeded and administratively reset accounts.
pub const DEFAULT_PASSWORD: &str = "88888888";

/// Bootstrap errors.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Auth error: {0}")]
    Auth(#[from] AuthError),
}

/// What [`seed`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub superadmin_id: i64,
    pub superadmin_created: bool,
}

/// Run all embedded database migrations against the given pool.
pub async fn run_migrations(pool: &PgPool) -> Result<(), BootstrapError> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("database migrations applied");
    Ok(())
}

/// Insert default roles and groups and the superadmin account.
pub async fn seed(
    store: &dyn CredentialStore,
    default_password: &str,
) -> Result<SeedReport, BootstrapError> {
    for role in DEFAULT_ROLES {
        store.ensure_name(Membership::Role, role).await?;
    }
    for group in DEFAULT_GROUPS {
        store.ensure_name(Membership::Group, group).await?;
    }

    if let Some(existing) = store.find_by_login(SUPERADMIN, LoginLookup::Exact).await? {
        info!(user_id = existing.id, "superadmin already present");
        return Ok(SeedReport {
            superadmin_id: existing.id,
            superadmin_created: false,
        });
    }

    let created = store
        .create(NewCredential {
            user_name: SUPERADMIN.to_string(),
            full_name: "Super Admin".to_string(),
            email: String::new(),
            password_hash: hash_password(default_password)?,
        })
        .await?;
    store.grant(created.id, Membership::Role, "admin").await?;
    store.grant(created.id, Membership::Group, "admins").await?;
    info!(user_id = created.id, "superadmin created");

    Ok(SeedReport {
        superadmin_id: created.id,
        superadmin_created: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryCredentialStore;

    #[tokio::test]
    async fn seed_is_idempotent() {
        let store = MemoryCredentialStore::new();

        let first = seed(&store, "secret").await.unwrap();
        assert!(first.superadmin_created);

        let second = seed(&store, "other").await.unwrap();
        assert!(!second.superadmin_created);
        assert_eq!(second.superadmin_id, first.superadmin_id);
        assert_eq!(store.list().await.unwrap().len(), 1);

        let admin = store.find_by_id(first.superadmin_id).await.unwrap().unwrap();
        assert_eq!(admin.roles, vec!["admin"]);
        assert_eq!(admin.groups, vec!["admins"]);
        assert!(crate::auth::password::verify_password("secret", &admin.password_hash));
    }

    #[tokio::test]
    async fn seeded_names_can_be_granted() {
        let store = MemoryCredentialStore::new();
        seed(&store, DEFAULT_PASSWORD).await.unwrap();
        let bob = store
            .create(NewCredential {
                user_name: "bob".into(),
                full_name: "Bob".into(),
                email: String::new(),
                password_hash: "x".into(),
            })
            .await
            .unwrap();
        for group in DEFAULT_GROUPS {
            store.grant(bob.id, Membership::Group, group).await.unwrap();
        }
        let bob = store.grant(bob.id, Membership::Role, "api").await.unwrap();
        assert_eq!(bob.groups.len(), 3);
        assert_eq!(bob.roles, vec!["api"]);
    }
}
