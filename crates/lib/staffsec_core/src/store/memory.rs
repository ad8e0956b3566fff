//! In-process credential store.
//!
//! Used by tests and single-process development setups. Every operation
//! takes one lock, so lockout updates are atomic just like the
//! PostgreSQL `UPDATE ... RETURNING` statements.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{CredentialStore, LoginLookup, Membership, StoreError, StoreResult};
use crate::models::auth::{Credential, LockoutState, NewCredential, ProfileUpdate};

#[derive(Default)]
struct Inner {
    next_id: i64,
    credentials: BTreeMap<i64, Credential>,
    roles: Vec<String>,
    groups: Vec<String>,
}

impl Inner {
    fn names(&self, kind: Membership) -> &Vec<String> {
        match kind {
            Membership::Role => &self.roles,
            Membership::Group => &self.groups,
        }
    }

    fn live_mut(&mut self, id: i64) -> StoreResult<&mut Credential> {
        self.credentials
            .get_mut(&id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }
}

/// `Mutex<BTreeMap>`-backed [`CredentialStore`].
#[derive(Default)]
pub struct MemoryCredentialStore {
    inner: Mutex<Inner>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a fully specified record, assigning a fresh id.
    ///
    /// Roles and groups on the record are registered as known names.
    pub async fn insert(&self, mut credential: Credential) -> i64 {
        let mut inner = self.inner.lock().await;
        inner.next_id += 1;
        credential.id = inner.next_id;
        for role in &credential.roles {
            if !inner.roles.contains(role) {
                inner.roles.push(role.clone());
            }
        }
        for group in &credential.groups {
            if !inner.groups.contains(group) {
                inner.groups.push(group.clone());
            }
        }
        let id = credential.id;
        inner.credentials.insert(id, credential);
        id
    }

    /// Raw record, including deleted ones.
    pub async fn get_raw(&self, id: i64) -> Option<Credential> {
        self.inner.lock().await.credentials.get(&id).cloned()
    }
}

fn matches(credential: &Credential, login: &str, lookup: LoginLookup) -> bool {
    let stored = credential.user_name.to_lowercase();
    let wanted = login.to_lowercase();
    match lookup {
        LoginLookup::Exact => stored == wanted,
        LoginLookup::Partial => stored.contains(&wanted),
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn find_by_login(
        &self,
        login: &str,
        lookup: LoginLookup,
    ) -> StoreResult<Option<Credential>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .credentials
            .values()
            .find(|c| !c.deleted && matches(c, login, lookup))
            .cloned())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Credential>> {
        let inner = self.inner.lock().await;
        Ok(inner.credentials.get(&id).filter(|c| !c.deleted).cloned())
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .credentials
            .values()
            .filter(|c| !c.deleted)
            .cloned()
            .collect())
    }

    async fn record_success(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        credential.last_login = Some(at);
        credential.attempt = 0;
        credential.updated_at = Some(at);
        Ok(())
    }

    async fn record_failure(&self, id: i64, ceiling: i32) -> StoreResult<LockoutState> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        let next = LockoutState {
            attempt: credential.attempt,
            blocked: credential.blocked,
        }
        .after_failure(ceiling);
        credential.attempt = next.attempt;
        credential.blocked = next.blocked;
        credential.updated_at = Some(Utc::now());
        Ok(next)
    }

    async fn set_password(&self, id: i64, hash: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        credential.password_hash = hash.to_string();
        credential.password_changed_at = at;
        credential.updated_at = Some(at);
        Ok(())
    }

    async fn reset_password(
        &self,
        id: i64,
        hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        credential.password_hash = hash.to_string();
        credential.password_changed_at = at;
        credential.updated_at = Some(at);
        credential.attempt = 0;
        credential.blocked = false;
        Ok(credential.clone())
    }

    async fn create(&self, new: NewCredential) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        let taken = inner
            .credentials
            .values()
            .any(|c| !c.deleted && matches(c, &new.user_name, LoginLookup::Exact));
        if taken {
            return Err(StoreError::Conflict(format!(
                "user '{}' already exists",
                new.user_name
            )));
        }
        inner.next_id += 1;
        let now = Utc::now();
        let credential = Credential {
            id: inner.next_id,
            full_name: new.full_name,
            user_name: new.user_name,
            email: new.email,
            password_hash: new.password_hash,
            created_at: now,
            updated_at: Some(now),
            last_login: None,
            password_changed_at: now,
            blocked: false,
            attempt: 0,
            deleted: false,
            roles: Vec::new(),
            groups: Vec::new(),
        };
        inner.credentials.insert(credential.id, credential.clone());
        Ok(credential)
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        credential.full_name = update.full_name;
        credential.email = update.email;
        credential.updated_at = Some(Utc::now());
        Ok(credential.clone())
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        credential.blocked = blocked;
        if !blocked {
            credential.attempt = 0;
        }
        credential.updated_at = Some(Utc::now());
        Ok(credential.clone())
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<bool> {
        let mut inner = self.inner.lock().await;
        match inner.live_mut(id) {
            Ok(credential) => {
                credential.deleted = true;
                credential.updated_at = Some(Utc::now());
                Ok(true)
            }
            Err(StoreError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn ensure_name(&self, kind: Membership, name: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().await;
        let names = match kind {
            Membership::Role => &mut inner.roles,
            Membership::Group => &mut inner.groups,
        };
        if !names.iter().any(|n| n == name) {
            names.push(name.to_string());
        }
        Ok(())
    }

    async fn grant(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        if !inner.names(kind).iter().any(|n| n == name) {
            return Err(StoreError::NotFound(format!("{} '{name}'", kind.as_str())));
        }
        let credential = inner.live_mut(id)?;
        let list = match kind {
            Membership::Role => &mut credential.roles,
            Membership::Group => &mut credential.groups,
        };
        if !list.iter().any(|n| n == name) {
            list.push(name.to_string());
        }
        Ok(credential.clone())
    }

    async fn revoke(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential> {
        let mut inner = self.inner.lock().await;
        let credential = inner.live_mut(id)?;
        let list = match kind {
            Membership::Role => &mut credential.roles,
            Membership::Group => &mut credential.groups,
        };
        list.retain(|n| n != name);
        Ok(credential.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn new_user(name: &str) -> NewCredential {
        NewCredential {
            user_name: name.to_string(),
            full_name: format!("{name} full"),
            email: format!("{name}@example.com"),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn exact_lookup_is_case_insensitive_but_not_partial() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("alice")).await.unwrap();

        let found = store.find_by_login("ALICE", LoginLookup::Exact).await.unwrap();
        assert_eq!(found.map(|c| c.user_name), Some("alice".to_string()));
        assert!(
            store
                .find_by_login("ali", LoginLookup::Exact)
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn partial_lookup_picks_lowest_id() {
        let store = MemoryCredentialStore::new();
        let first = store.create(new_user("alice")).await.unwrap();
        store.create(new_user("malice")).await.unwrap();

        let found = store
            .find_by_login("lice", LoginLookup::Partial)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn create_rejects_duplicate_login() {
        let store = MemoryCredentialStore::new();
        store.create(new_user("bob")).await.unwrap();
        let err = store.create(new_user("Bob")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn deleted_accounts_are_invisible() {
        let store = MemoryCredentialStore::new();
        let bob = store.create(new_user("bob")).await.unwrap();
        assert!(store.soft_delete(bob.id).await.unwrap());
        assert!(!store.soft_delete(bob.id).await.unwrap());

        assert!(store.find_by_id(bob.id).await.unwrap().is_none());
        assert!(
            store
                .find_by_login("bob", LoginLookup::Exact)
                .await
                .unwrap()
                .is_none()
        );
        assert!(store.list().await.unwrap().is_empty());
        assert!(store.get_raw(bob.id).await.unwrap().deleted);

        // The login name can be reused once the old account is gone.
        store.create(new_user("bob")).await.unwrap();
    }

    #[tokio::test]
    async fn unblock_resets_attempts() {
        let store = MemoryCredentialStore::new();
        let bob = store.create(new_user("bob")).await.unwrap();
        for _ in 0..10 {
            store.record_failure(bob.id, 9).await.unwrap();
        }
        let blocked = store.find_by_id(bob.id).await.unwrap().unwrap();
        assert!(blocked.blocked);
        assert_eq!(blocked.attempt, 9);

        let unblocked = store.set_blocked(bob.id, false).await.unwrap();
        assert!(!unblocked.blocked);
        assert_eq!(unblocked.attempt, 0);
    }

    #[tokio::test]
    async fn grant_requires_known_name() {
        let store = MemoryCredentialStore::new();
        let bob = store.create(new_user("bob")).await.unwrap();

        let err = store.grant(bob.id, Membership::Role, "admin").await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        store.ensure_name(Membership::Role, "admin").await.unwrap();
        let granted = store.grant(bob.id, Membership::Role, "admin").await.unwrap();
        assert_eq!(granted.roles, vec!["admin"]);

        // Granting twice keeps a single entry.
        let again = store.grant(bob.id, Membership::Role, "admin").await.unwrap();
        assert_eq!(again.roles, vec!["admin"]);

        let revoked = store.revoke(bob.id, Membership::Role, "admin").await.unwrap();
        assert!(revoked.roles.is_empty());
    }

    async fn hammer(failures: i32) -> Credential {
        let store = Arc::new(MemoryCredentialStore::new());
        let id = store.create(new_user("bob")).await.unwrap().id;
        let tasks: Vec<_> = (0..failures)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.record_failure(id, 9).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        store.get_raw(id).await.unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_failures_are_not_lost() {
        let after_five = hammer(5).await;
        assert_eq!(after_five.attempt, 5);
        assert!(!after_five.blocked);

        let after_nine = hammer(9).await;
        assert_eq!(after_nine.attempt, 9);
        assert!(!after_nine.blocked);

        let after_forty = hammer(40).await;
        assert_eq!(after_forty.attempt, 9);
        assert!(after_forty.blocked);
    }
}
