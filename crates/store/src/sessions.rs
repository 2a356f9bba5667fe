//! C3: durable per-session message log with ordering, ownership, and
//! branching (§4.3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{Row, SqlitePool};

use sa_domain::error::{Error, Result};
use sa_domain::message::Role;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub parent_session_id: Option<String>,
    pub branch_point_message_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub name: String,
    pub message_count: i64,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    pub message_id: i64,
    pub session_id: String,
    pub role: Role,
    pub content: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub token_usage: Option<TokenUsage>,
    pub edited_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Pagination {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    pub fn default_page() -> Self {
        Self { offset: 0, limit: 50 }
    }
}

pub struct SessionStore {
    pool: SqlitePool,
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session> {
    Ok(Session {
        session_id: row.try_get("session_id").map_err(Error::from)?,
        user_id: row.try_get("user_id").map_err(Error::from)?,
        name: row.try_get("name").map_err(Error::from)?,
        created_at: parse_ts(row.try_get("created_at").map_err(Error::from)?)?,
        updated_at: parse_ts(row.try_get("updated_at").map_err(Error::from)?)?,
        parent_session_id: row.try_get("parent_session_id").map_err(Error::from)?,
        branch_point_message_id: row.try_get("branch_point_message_id").map_err(Error::from)?,
    })
}

fn parse_ts(s: String) -> Result<DateTime<Utc>> {
    s.parse()
        .map_err(|_| Error::Internal(format!("corrupt timestamp in storage: {s}")))
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage> {
    let role_str: String = row.try_get("role").map_err(Error::from)?;
    let role = Role::parse(&role_str)
        .ok_or_else(|| Error::Internal(format!("corrupt role in storage: {role_str}")))?;

    let input: Option<i64> = row.try_get("input_tokens").map_err(Error::from)?;
    let output: Option<i64> = row.try_get("output_tokens").map_err(Error::from)?;
    let total: Option<i64> = row.try_get("total_tokens").map_err(Error::from)?;
    let token_usage = match (input, output, total) {
        (Some(i), Some(o), Some(t)) => Some(TokenUsage { input_tokens: i, output_tokens: o, total_tokens: t }),
        _ => None,
    };

    let edited_at: Option<String> = row.try_get("edited_at").map_err(Error::from)?;

    Ok(StoredMessage {
        message_id: row.try_get("message_id").map_err(Error::from)?,
        session_id: row.try_get("session_id").map_err(Error::from)?,
        role,
        content: row.try_get("content").map_err(Error::from)?,
        provider: row.try_get("provider").map_err(Error::from)?,
        model: row.try_get("model").map_err(Error::from)?,
        created_at: parse_ts(row.try_get("created_at").map_err(Error::from)?)?,
        token_usage,
        edited_at: edited_at.map(parse_ts).transpose()?,
    })
}

impl SessionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_session(&self, user_id: &str, initial_name: Option<&str>) -> Result<String> {
        let session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let name = initial_name.unwrap_or("New conversation");

        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, name, created_at, updated_at, parent_session_id, branch_point_message_id)
             VALUES (?, ?, ?, ?, ?, NULL, NULL)",
        )
        .bind(&session_id)
        .bind(user_id)
        .bind(name)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(session_id)
    }

    pub async fn list_sessions(&self, user_id: &str, page: Pagination) -> Result<Vec<SessionSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.session_id, s.name, s.updated_at,
                   (SELECT COUNT(*) FROM messages m WHERE m.session_id = s.session_id) AS message_count
            FROM sessions s
            WHERE s.user_id = ?
            ORDER BY s.updated_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(user_id)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;

        rows.iter()
            .map(|row| {
                Ok(SessionSummary {
                    session_id: row.try_get("session_id").map_err(Error::from)?,
                    name: row.try_get("name").map_err(Error::from)?,
                    message_count: row.try_get("message_count").map_err(Error::from)?,
                    updated_at: parse_ts(row.try_get("updated_at").map_err(Error::from)?)?,
                })
            })
            .collect()
    }

    /// Loads a session and enforces ownership. Distinguishes "doesn't
    /// exist" from "exists but belongs to someone else" (§4.3).
    pub async fn get_session(&self, session_id: &str, user_id: &str) -> Result<Session> {
        let row = sqlx::query("SELECT * FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;

        let row = row.ok_or_else(|| Error::NotFound(format!("session {session_id}")))?;
        let session = row_to_session(&row)?;
        if session.user_id != user_id {
            return Err(Error::Forbidden);
        }
        Ok(session)
    }

    pub async fn rename_session(&self, session_id: &str, user_id: &str, new_name: &str) -> Result<()> {
        self.get_session(session_id, user_id).await?;
        sqlx::query("UPDATE sessions SET name = ?, updated_at = ? WHERE session_id = ?")
            .bind(new_name)
            .bind(Utc::now().to_rfc3339())
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    /// Deletes a session and cascades to its messages (§3, §4.3).
    pub async fn delete_session(&self, session_id: &str, user_id: &str) -> Result<()> {
        self.get_session(session_id, user_id).await?;
        let mut tx = self.pool.begin().await.map_err(Error::from)?;
        sqlx::query("DELETE FROM messages WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        sqlx::query("DELETE FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }

    /// Appends a message and updates the session's `updated_at` in one
    /// transaction — §4.3 forbids a partial write where the message lands
    /// but the timestamp doesn't move.
    #[allow(clippy::too_many_arguments)]
    pub async fn append_message(
        &self,
        session_id: &str,
        user_id: &str,
        role: Role,
        content: &str,
        provider: Option<&str>,
        model: Option<&str>,
        token_usage: Option<TokenUsage>,
    ) -> Result<i64> {
        self.get_session(session_id, user_id).await?;
        let now = Utc::now().to_rfc3339();

        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages
                (session_id, role, content, provider, model, created_at, input_tokens, output_tokens, total_tokens, edited_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
            "#,
        )
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .bind(provider)
        .bind(model)
        .bind(&now)
        .bind(token_usage.map(|u| u.input_tokens))
        .bind(token_usage.map(|u| u.output_tokens))
        .bind(token_usage.map(|u| u.total_tokens))
        .execute(&mut *tx)
        .await
        .map_err(Error::from)?;

        sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ?")
            .bind(&now)
            .bind(session_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;

        tx.commit().await.map_err(Error::from)?;
        Ok(result.last_insert_rowid())
    }

    pub async fn list_messages(
        &self,
        session_id: &str,
        user_id: &str,
        after_id: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<StoredMessage>> {
        self.get_session(session_id, user_id).await?;
        let after_id = after_id.unwrap_or(0);
        let limit = limit.unwrap_or(1000);

        let rows = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? AND message_id > ? ORDER BY message_id ASC LIMIT ?",
        )
        .bind(session_id)
        .bind(after_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;

        rows.iter().map(row_to_message).collect()
    }

    /// Edits a user-role message's content (§4.3). Records an edit
    /// marker; permitted only on the `user` role.
    pub async fn edit_message(&self, message_id: i64, user_id: &str, new_content: &str) -> Result<()> {
        let (session_id, role) = self.message_owner(message_id, user_id).await?;
        if role != Role::User {
            return Err(Error::InvalidInput("only user messages can be edited".into()));
        }
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(Error::from)?;
        sqlx::query("UPDATE messages SET content = ?, edited_at = ? WHERE message_id = ?")
            .bind(new_content)
            .bind(&now)
            .bind(message_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ?")
            .bind(&now)
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }

    /// Deletes this message and everything after it in the session — a
    /// conversation is a causal chain (§4.3).
    pub async fn delete_message(&self, message_id: i64, user_id: &str) -> Result<()> {
        let (session_id, _role) = self.message_owner(message_id, user_id).await?;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.map_err(Error::from)?;
        sqlx::query("DELETE FROM messages WHERE session_id = ? AND message_id >= ?")
            .bind(&session_id)
            .bind(message_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        sqlx::query("UPDATE sessions SET updated_at = ? WHERE session_id = ?")
            .bind(&now)
            .bind(&session_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        tx.commit().await.map_err(Error::from)?;
        Ok(())
    }

    /// Creates a child session inheriting every message up to and
    /// including `at_message_id`. Chosen implementation: copy (§4.3 —
    /// "implementation may copy ... externally observable behavior is
    /// identical") so edits to the branch never touch the parent.
    pub async fn branch_session(
        &self,
        session_id: &str,
        user_id: &str,
        at_message_id: i64,
        new_name: Option<&str>,
    ) -> Result<String> {
        self.get_session(session_id, user_id).await?;

        let prefix = sqlx::query(
            "SELECT * FROM messages WHERE session_id = ? AND message_id <= ? ORDER BY message_id ASC",
        )
        .bind(session_id)
        .bind(at_message_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::from)?;

        if prefix.is_empty() {
            return Err(Error::NotFound(format!("message {at_message_id}")));
        }
        let last_id: i64 = prefix.last().unwrap().try_get("message_id").map_err(Error::from)?;
        if last_id != at_message_id {
            return Err(Error::NotFound(format!("message {at_message_id}")));
        }

        let new_session_id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();
        let name = new_name.unwrap_or("Branch");

        let mut tx = self.pool.begin().await.map_err(Error::from)?;

        sqlx::query(
            "INSERT INTO sessions (session_id, user_id, name, created_at, updated_at, parent_session_id, branch_point_message_id)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&new_session_id)
        .bind(user_id)
        .bind(name)
        .bind(&now)
        .bind(&now)
        .bind(session_id)
        .bind(at_message_id)
        .execute(&mut *tx)
        .await
        .map_err(Error::from)?;

        for row in &prefix {
            let role: String = row.try_get("role").map_err(Error::from)?;
            let content: String = row.try_get("content").map_err(Error::from)?;
            let provider: Option<String> = row.try_get("provider").map_err(Error::from)?;
            let model: Option<String> = row.try_get("model").map_err(Error::from)?;
            let created_at: String = row.try_get("created_at").map_err(Error::from)?;
            let input_tokens: Option<i64> = row.try_get("input_tokens").map_err(Error::from)?;
            let output_tokens: Option<i64> = row.try_get("output_tokens").map_err(Error::from)?;
            let total_tokens: Option<i64> = row.try_get("total_tokens").map_err(Error::from)?;

            sqlx::query(
                r#"
                INSERT INTO messages
                    (session_id, role, content, provider, model, created_at, input_tokens, output_tokens, total_tokens, edited_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, NULL)
                "#,
            )
            .bind(&new_session_id)
            .bind(&role)
            .bind(&content)
            .bind(&provider)
            .bind(&model)
            .bind(&created_at)
            .bind(input_tokens)
            .bind(output_tokens)
            .bind(total_tokens)
            .execute(&mut *tx)
            .await
            .map_err(Error::from)?;
        }

        tx.commit().await.map_err(Error::from)?;
        Ok(new_session_id)
    }

    async fn message_owner(&self, message_id: i64, user_id: &str) -> Result<(String, Role)> {
        let row = sqlx::query("SELECT session_id, role FROM messages WHERE message_id = ?")
            .bind(message_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from)?;
        let row = row.ok_or_else(|| Error::NotFound(format!("message {message_id}")))?;
        let session_id: String = row.try_get("session_id").map_err(Error::from)?;
        let role_str: String = row.try_get("role").map_err(Error::from)?;
        let role = Role::parse(&role_str)
            .ok_or_else(|| Error::Internal(format!("corrupt role in storage: {role_str}")))?;

        // Ownership is enforced transitively through the session.
        self.get_session(&session_id, user_id).await?;
        Ok((session_id, role))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> SessionStore {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        crate::migrate::run(&pool).await.unwrap();
        SessionStore::new(pool)
    }

    #[tokio::test]
    async fn create_then_get_session() {
        let store = store().await;
        let id = store.create_session("u1", Some("hello")).await.unwrap();
        let session = store.get_session(&id, "u1").await.unwrap();
        assert_eq!(session.name, "hello");
        assert_eq!(session.user_id, "u1");
    }

    #[tokio::test]
    async fn get_session_wrong_owner_is_forbidden() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let err = store.get_session(&id, "u2").await.unwrap_err();
        assert!(matches!(err, Error::Forbidden));
    }

    #[tokio::test]
    async fn get_missing_session_is_not_found() {
        let store = store().await;
        let err = store.get_session("nope", "u1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn append_then_list_in_order() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let m1 = store.append_message(&id, "u1", Role::User, "hi", None, None, None).await.unwrap();
        let m2 = store
            .append_message(&id, "u1", Role::Assistant, "hello!", Some("provider-a"), Some("chat-standard"), None)
            .await
            .unwrap();
        assert!(m2 > m1);

        let messages = store.list_messages(&id, "u1", None, None).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[1].role, Role::Assistant);
    }

    #[tokio::test]
    async fn append_updates_session_timestamp() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let before = store.get_session(&id, "u1").await.unwrap().updated_at;
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.append_message(&id, "u1", Role::User, "hi", None, None, None).await.unwrap();
        let after = store.get_session(&id, "u1").await.unwrap().updated_at;
        assert!(after >= before);
    }

    #[tokio::test]
    async fn delete_session_cascades_to_messages() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        store.append_message(&id, "u1", Role::User, "hi", None, None, None).await.unwrap();
        store.delete_session(&id, "u1").await.unwrap();
        let err = store.get_session(&id, "u1").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn edit_message_only_allowed_on_user_role() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let user_msg = store.append_message(&id, "u1", Role::User, "hi", None, None, None).await.unwrap();
        let asst_msg = store
            .append_message(&id, "u1", Role::Assistant, "hello", None, None, None)
            .await
            .unwrap();

        store.edit_message(user_msg, "u1", "edited").await.unwrap();
        let err = store.edit_message(asst_msg, "u1", "nope").await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let messages = store.list_messages(&id, "u1", None, None).await.unwrap();
        assert_eq!(messages[0].content, "edited");
        assert!(messages[0].edited_at.is_some());
    }

    #[tokio::test]
    async fn delete_message_removes_everything_after() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let m1 = store.append_message(&id, "u1", Role::User, "m1", None, None, None).await.unwrap();
        store.append_message(&id, "u1", Role::Assistant, "m2", None, None, None).await.unwrap();
        store.append_message(&id, "u1", Role::User, "m3", None, None, None).await.unwrap();

        store.delete_message(m1, "u1").await.unwrap();
        let messages = store.list_messages(&id, "u1", None, None).await.unwrap();
        assert!(messages.is_empty());
    }

    #[tokio::test]
    async fn branch_session_inherits_prefix_only() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let m1 = store.append_message(&id, "u1", Role::User, "m1", None, None, None).await.unwrap();
        let m2 = store.append_message(&id, "u1", Role::Assistant, "m2", None, None, None).await.unwrap();
        store.append_message(&id, "u1", Role::User, "m3", None, None, None).await.unwrap();
        store.append_message(&id, "u1", Role::Assistant, "m4", None, None, None).await.unwrap();

        let branch_id = store.branch_session(&id, "u1", m2, Some("branch")).await.unwrap();
        let branch_messages = store.list_messages(&branch_id, "u1", None, None).await.unwrap();
        assert_eq!(branch_messages.len(), 2);
        assert_eq!(branch_messages[0].content, "m1");
        assert_eq!(branch_messages[1].content, "m2");
        let _ = m1;
    }

    #[tokio::test]
    async fn branching_is_independent_of_parent() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        let m1 = store.append_message(&id, "u1", Role::User, "m1", None, None, None).await.unwrap();

        let branch_id = store.branch_session(&id, "u1", m1, None).await.unwrap();
        store.append_message(&branch_id, "u1", Role::Assistant, "only on branch", None, None, None).await.unwrap();

        let parent_messages = store.list_messages(&id, "u1", None, None).await.unwrap();
        assert_eq!(parent_messages.len(), 1);

        store.append_message(&id, "u1", Role::Assistant, "only on parent", None, None, None).await.unwrap();
        let branch_messages = store.list_messages(&branch_id, "u1", None, None).await.unwrap();
        assert_eq!(branch_messages.len(), 2);
        assert_eq!(branch_messages[1].content, "only on branch");
    }

    #[tokio::test]
    async fn branch_at_unknown_message_not_found() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        store.append_message(&id, "u1", Role::User, "m1", None, None, None).await.unwrap();
        let err = store.branch_session(&id, "u1", 9999, None).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn list_sessions_paginated_and_ordered() {
        let store = store().await;
        store.create_session("u1", Some("first")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        store.create_session("u1", Some("second")).await.unwrap();

        let page = store.list_sessions("u1", Pagination::default_page()).await.unwrap();
        assert_eq!(page.len(), 2);
        assert_eq!(page[0].name, "second"); // most recently updated first
    }

    #[tokio::test]
    async fn rename_is_idempotent() {
        let store = store().await;
        let id = store.create_session("u1", None).await.unwrap();
        store.rename_session(&id, "u1", "renamed").await.unwrap();
        store.rename_session(&id, "u1", "renamed").await.unwrap();
        let session = store.get_session(&id, "u1").await.unwrap();
        assert_eq!(session.name, "renamed");
    }
}
