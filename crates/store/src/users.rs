//! User records (§3) and password verification. Registration mechanics
//! and session/refresh-token flows are explicitly out of scope per §1 —
//! this only carries what `/auth/login` (§6) needs: a lookup by username
//! and a bcrypt hash to verify against.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use sa_domain::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

impl Role {
    fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    fn parse(s: &str) -> Role {
        match s {
            "admin" => Role::Admin,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
}

pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Creates a user with a bcrypt-hashed password. Rejects a duplicate
    /// `user_id`.
    pub async fn create(&self, user_id: &str, password: &str, role: Role) -> Result<User> {
        let hash = bcrypt::hash(password, bcrypt::DEFAULT_COST)
            .map_err(|e| Error::Internal(format!("hashing password: {e}")))?;
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO users (user_id, password_hash, role, created_at, is_active) VALUES (?, ?, ?, ?, 1)",
        )
        .bind(user_id)
        .bind(&hash)
        .bind(role.as_str())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Error::InvalidInput(format!("user {user_id} already exists"))
            }
            other => Error::Internal(format!("creating user: {other}")),
        })?;

        Ok(User {
            user_id: user_id.to_string(),
            role,
            created_at: now,
            is_active: true,
        })
    }

    /// Verifies a password against the stored hash. `None` if the user
    /// doesn't exist, is soft-deleted, or the password doesn't match —
    /// callers map all three to the same `unauthenticated` response so
    /// login never discloses which case occurred.
    pub async fn authenticate(&self, user_id: &str, password: &str) -> Result<Option<User>> {
        let row: Option<(String, String, String, String, i64)> = sqlx::query_as(
            "SELECT password_hash, role, created_at, user_id, is_active FROM users WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::from)?;

        let Some((hash, role, created_at, user_id, is_active)) = row else {
            return Ok(None);
        };
        if is_active == 0 {
            return Ok(None);
        }

        let matches = bcrypt::verify(password, &hash)
            .map_err(|e| Error::Internal(format!("verifying password: {e}")))?;
        if !matches {
            return Ok(None);
        }

        Ok(Some(User {
            user_id,
            role: Role::parse(&role),
            created_at: created_at
                .parse()
                .unwrap_or_else(|_| Utc::now()),
            is_active: true,
        }))
    }

    pub async fn deactivate(&self, user_id: &str) -> Result<()> {
        sqlx::query("UPDATE users SET is_active = 0 WHERE user_id = ?")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> UserStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        UserStore::new(pool)
    }

    #[tokio::test]
    async fn create_then_authenticate_succeeds() {
        let store = store().await;
        store.create("alice", "hunter2", Role::User).await.unwrap();
        let user = store.authenticate("alice", "hunter2").await.unwrap();
        assert!(user.is_some());
        assert_eq!(user.unwrap().user_id, "alice");
    }

    #[tokio::test]
    async fn wrong_password_fails() {
        let store = store().await;
        store.create("alice", "hunter2", Role::User).await.unwrap();
        let user = store.authenticate("alice", "wrong").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn unknown_user_fails() {
        let store = store().await;
        let user = store.authenticate("nobody", "x").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn deactivated_user_cannot_authenticate() {
        let store = store().await;
        store.create("alice", "hunter2", Role::User).await.unwrap();
        store.deactivate("alice").await.unwrap();
        let user = store.authenticate("alice", "hunter2").await.unwrap();
        assert!(user.is_none());
    }

    #[tokio::test]
    async fn duplicate_user_id_rejected() {
        let store = store().await;
        store.create("alice", "hunter2", Role::User).await.unwrap();
        let err = store.create("alice", "other", Role::User).await;
        assert!(err.is_err());
    }
}
