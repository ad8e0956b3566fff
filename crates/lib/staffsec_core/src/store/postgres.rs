//! PostgreSQL-backed credential store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::postgres::PgQueryResult;

use super::{CredentialStore, LoginLookup, Membership, StoreError, StoreResult};
use crate::models::auth::{Credential, LockoutState, NewCredential, ProfileUpdate};

const USER_COLUMNS: &str = "id, full_name, user_name, email, password_hash, created_at, \
     updated_at, last_login, password_changed_at, blocked, attempt, deleted";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    full_name: String,
    user_name: String,
    email: String,
    password_hash: String,
    created_at: DateTime<Utc>,
    updated_at: Option<DateTime<Utc>>,
    last_login: Option<DateTime<Utc>>,
    password_changed_at: DateTime<Utc>,
    blocked: bool,
    attempt: i32,
    deleted: bool,
}

impl UserRow {
    fn into_credential(self, roles: Vec<String>, groups: Vec<String>) -> Credential {
        Credential {
            id: self.id,
            full_name: self.full_name,
            user_name: self.user_name,
            email: self.email,
            password_hash: self.password_hash,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_login: self.last_login,
            password_changed_at: self.password_changed_at,
            blocked: self.blocked,
            attempt: self.attempt,
            deleted: self.deleted,
            roles,
            groups,
        }
    }
}

/// Escape `%`, `_` and `\` so user input is matched literally inside `ILIKE`.
pub fn like_pattern(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len() + 2);
    escaped.push('%');
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

/// [`CredentialStore`] over the `users`, `roles`, `groups`, `user_roles`
/// and `user_groups` tables.
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

/// Fail with `NotFound` when an `UPDATE users ... WHERE id = $1` matched nothing.
fn ensure_updated(result: PgQueryResult, id: i64) -> StoreResult<()> {
    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound(format!("user {id}")));
    }
    Ok(())
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn names_for(&self, user_id: i64, kind: Membership) -> StoreResult<Vec<String>> {
        let sql = match kind {
            Membership::Role => {
                "SELECT r.name_role FROM roles r \
                 JOIN user_roles ur ON ur.role_id = r.id \
                 WHERE ur.user_id = $1 ORDER BY r.id"
            }
            Membership::Group => {
                "SELECT g.name_group FROM groups g \
                 JOIN user_groups ug ON ug.group_id = g.id \
                 WHERE ug.user_id = $1 ORDER BY g.id"
            }
        };
        let rows = sqlx::query_scalar::<_, String>(sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn hydrate(&self, row: UserRow) -> StoreResult<Credential> {
        let roles = self.names_for(row.id, Membership::Role).await?;
        let groups = self.names_for(row.id, Membership::Group).await?;
        Ok(row.into_credential(roles, groups))
    }

    async fn hydrate_opt(&self, row: Option<UserRow>) -> StoreResult<Option<Credential>> {
        match row {
            Some(row) => Ok(Some(self.hydrate(row).await?)),
            None => Ok(None),
        }
    }

    async fn require(&self, id: i64) -> StoreResult<Credential> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("user {id}")))
    }

    async fn name_id(&self, kind: Membership, name: &str) -> StoreResult<i64> {
        let sql = match kind {
            Membership::Role => "SELECT id FROM roles WHERE name_role = $1",
            Membership::Group => "SELECT id FROM groups WHERE name_group = $1",
        };
        sqlx::query_scalar::<_, i64>(sql)
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(format!("{} '{name}'", kind.as_str())))
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn find_by_login(
        &self,
        login: &str,
        lookup: LoginLookup,
    ) -> StoreResult<Option<Credential>> {
        let row = match lookup {
            LoginLookup::Exact => {
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users \
                     WHERE lower(user_name) = lower($1) AND NOT deleted \
                     ORDER BY id LIMIT 1"
                ))
                .bind(login)
                .fetch_optional(&self.pool)
                .await?
            }
            LoginLookup::Partial => {
                sqlx::query_as::<_, UserRow>(&format!(
                    "SELECT {USER_COLUMNS} FROM users \
                     WHERE user_name ILIKE $1 AND NOT deleted \
                     ORDER BY id LIMIT 1"
                ))
                .bind(like_pattern(login))
                .fetch_optional(&self.pool)
                .await?
            }
        };
        self.hydrate_opt(row).await
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Credential>> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND NOT deleted"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        self.hydrate_opt(row).await
    }

    async fn list(&self) -> StoreResult<Vec<Credential>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE NOT deleted ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        let mut credentials = Vec::with_capacity(rows.len());
        for row in rows {
            credentials.push(self.hydrate(row).await?);
        }
        Ok(credentials)
    }

    async fn record_success(&self, id: i64, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET last_login = $2, attempt = 0, updated_at = $2 \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)
    }

    async fn record_failure(&self, id: i64, ceiling: i32) -> StoreResult<LockoutState> {
        // Right-hand sides see the pre-update row, so this is one atomic step.
        let row = sqlx::query_as::<_, (i32, bool)>(
            "UPDATE users SET \
                 blocked = blocked OR attempt >= $2, \
                 attempt = CASE WHEN attempt < $2 THEN attempt + 1 ELSE attempt END, \
                 updated_at = now() \
             WHERE id = $1 AND NOT deleted \
             RETURNING attempt, blocked",
        )
        .bind(id)
        .bind(ceiling)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::NotFound(format!("user {id}")))?;
        Ok(LockoutState {
            attempt: row.0,
            blocked: row.1,
        })
    }

    async fn set_password(&self, id: i64, hash: &str, at: DateTime<Utc>) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = $3 \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)
    }

    async fn reset_password(
        &self,
        id: i64,
        hash: &str,
        at: DateTime<Utc>,
    ) -> StoreResult<Credential> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, password_changed_at = $3, updated_at = $3, \
                 attempt = 0, blocked = false \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(hash)
        .bind(at)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)?;
        self.require(id).await
    }

    async fn create(&self, new: NewCredential) -> StoreResult<Credential> {
        if self
            .find_by_login(&new.user_name, LoginLookup::Exact)
            .await?
            .is_some()
        {
            return Err(StoreError::Conflict(format!(
                "user '{}' already exists",
                new.user_name
            )));
        }
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO users (user_name, full_name, email, password_hash) \
             VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
        ))
        .bind(&new.user_name)
        .bind(&new.full_name)
        .bind(&new.email)
        .bind(&new.password_hash)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            // Lost a race against the unique index on lower(user_name).
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Conflict(format!("user '{}' already exists", new.user_name))
            }
            other => StoreError::Db(other),
        })?;
        Ok(row.into_credential(Vec::new(), Vec::new()))
    }

    async fn update_profile(&self, id: i64, update: ProfileUpdate) -> StoreResult<Credential> {
        let result = sqlx::query(
            "UPDATE users SET full_name = $2, email = $3, updated_at = now() \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(&update.full_name)
        .bind(&update.email)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)?;
        self.require(id).await
    }

    async fn set_blocked(&self, id: i64, blocked: bool) -> StoreResult<Credential> {
        let result = sqlx::query(
            "UPDATE users SET blocked = $2, \
                 attempt = CASE WHEN $2 THEN attempt ELSE 0 END, \
                 updated_at = now() \
             WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .bind(blocked)
        .execute(&self.pool)
        .await?;
        ensure_updated(result, id)?;
        self.require(id).await
    }

    async fn soft_delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query(
            "UPDATE users SET deleted = true, updated_at = now() WHERE id = $1 AND NOT deleted",
        )
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn ensure_name(&self, kind: Membership, name: &str) -> StoreResult<()> {
        let sql = match kind {
            Membership::Role => {
                "INSERT INTO roles (name_role) VALUES ($1) ON CONFLICT (name_role) DO NOTHING"
            }
            Membership::Group => {
                "INSERT INTO groups (name_group) VALUES ($1) ON CONFLICT (name_group) DO NOTHING"
            }
        };
        sqlx::query(sql).bind(name).execute(&self.pool).await?;
        Ok(())
    }

    async fn grant(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential> {
        let name_id = self.name_id(kind, name).await?;
        self.require(id).await?;
        let sql = match kind {
            Membership::Role => {
                "INSERT INTO user_roles (user_id, role_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
            Membership::Group => {
                "INSERT INTO user_groups (user_id, group_id) VALUES ($1, $2) ON CONFLICT DO NOTHING"
            }
        };
        sqlx::query(sql)
            .bind(id)
            .bind(name_id)
            .execute(&self.pool)
            .await?;
        self.require(id).await
    }

    async fn revoke(&self, id: i64, kind: Membership, name: &str) -> StoreResult<Credential> {
        self.require(id).await?;
        let sql = match kind {
            Membership::Role => {
                "DELETE FROM user_roles ur USING roles r \
                 WHERE ur.role_id = r.id AND ur.user_id = $1 AND r.name_role = $2"
            }
            Membership::Group => {
                "DELETE FROM user_groups ug USING groups g \
                 WHERE ug.group_id = g.id AND ug.user_id = $1 AND g.name_group = $2"
            }
        };
        sqlx::query(sql).bind(id).bind(name).execute(&self.pool).await?;
        self.require(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_wraps_and_escapes() {
        assert_eq!(like_pattern("alice"), "%alice%");
        assert_eq!(like_pattern("a_b%c"), "%a\\_b\\%c%");
        assert_eq!(like_pattern("back\\slash"), "%back\\\\slash%");
    }
}
