//! Schema creation. Per §6, v1 needs no migration story beyond
//! create-on-first-run — operators take file-level backups.

use sqlx::SqlitePool;

use sa_domain::error::{Error, Result};

pub async fn run(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            user_id       TEXT PRIMARY KEY,
            password_hash TEXT NOT NULL,
            role          TEXT NOT NULL,
            created_at    TEXT NOT NULL,
            is_active     INTEGER NOT NULL DEFAULT 1
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Internal(format!("creating users table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            user_id       TEXT NOT NULL,
            provider      TEXT NOT NULL,
            ciphertext    BLOB NOT NULL,
            created_at    TEXT NOT NULL,
            last_used_at  TEXT,
            PRIMARY KEY (user_id, provider)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Internal(format!("creating api_keys table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            session_id              TEXT PRIMARY KEY,
            user_id                 TEXT NOT NULL,
            name                    TEXT NOT NULL,
            created_at               TEXT NOT NULL,
            updated_at               TEXT NOT NULL,
            parent_session_id        TEXT,
            branch_point_message_id  INTEGER
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Internal(format!("creating sessions table: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS messages (
            message_id    INTEGER PRIMARY KEY AUTOINCREMENT,
            session_id    TEXT NOT NULL,
            role          TEXT NOT NULL,
            content       TEXT NOT NULL,
            provider      TEXT,
            model         TEXT,
            created_at    TEXT NOT NULL,
            input_tokens  INTEGER,
            output_tokens INTEGER,
            total_tokens  INTEGER,
            edited_at     TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(session_id)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| Error::Internal(format!("creating messages table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_session ON messages(session_id, message_id)")
        .execute(pool)
        .await
        .map_err(|e| Error::Internal(format!("creating messages index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id)")
        .execute(pool)
        .await
        .map_err(|e| Error::Internal(format!("creating sessions index: {e}")))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn schema_creates_on_memory_db() {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        run(&pool).await.unwrap();
        run(&pool).await.unwrap(); // idempotent
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM sessions")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
