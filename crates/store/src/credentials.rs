//! C1: encrypted, durable per-user provider API keys (§4.1).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use sa_domain::error::{Error, Result};

use crate::crypto;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeySummary {
    pub provider: String,
    pub has_key: bool,
    pub last_used_at: Option<DateTime<Utc>>,
}

pub struct CredentialStore {
    pool: SqlitePool,
    key: [u8; 32],
}

impl CredentialStore {
    pub fn new(pool: SqlitePool, encryption_key: [u8; 32]) -> Self {
        Self { pool, key: encryption_key }
    }

    /// Encrypts and persists `raw_key`. Rejects empty keys (§4.1) before
    /// touching the database.
    pub async fn store(&self, user_id: &str, provider: &str, raw_key: &str) -> Result<()> {
        if raw_key.trim().is_empty() {
            return Err(Error::InvalidInput("api key must not be empty".into()));
        }

        let ciphertext = crypto::encrypt(&self.key, raw_key)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO api_keys (user_id, provider, ciphertext, created_at, last_used_at)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT(user_id, provider) DO UPDATE SET
                ciphertext = excluded.ciphertext,
                created_at = excluded.created_at,
                last_used_at = NULL
            "#,
        )
        .bind(user_id)
        .bind(provider.to_lowercase())
        .bind(&ciphertext)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(Error::from)?;

        Ok(())
    }

    /// Decrypts and returns the stored key, touching `last_used_at`.
    /// A decrypt failure is logged and surfaced as "not found" (§4.1,
    /// §7) — it is never a fatal error for the caller.
    pub async fn retrieve(&self, user_id: &str, provider: &str) -> Result<Option<String>> {
        let row: Option<(Vec<u8>,)> =
            sqlx::query_as("SELECT ciphertext FROM api_keys WHERE user_id = ? AND provider = ?")
                .bind(user_id)
                .bind(provider.to_lowercase())
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::from)?;

        let Some((ciphertext,)) = row else {
            return Ok(None);
        };

        match crypto::decrypt(&self.key, &ciphertext) {
            Ok(plaintext) => {
                let now = Utc::now().to_rfc3339();
                sqlx::query(
                    "UPDATE api_keys SET last_used_at = ? WHERE user_id = ? AND provider = ?",
                )
                .bind(&now)
                .bind(user_id)
                .bind(provider.to_lowercase())
                .execute(&self.pool)
                .await
                .map_err(Error::from)?;
                Ok(Some(plaintext))
            }
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    provider = %provider,
                    "credential decrypt failed, treating as not-found"
                );
                Ok(None)
            }
        }
    }

    /// Lists configured providers for a user. Never returns plaintext.
    pub async fn list(&self, user_id: &str) -> Result<Vec<KeySummary>> {
        let rows: Vec<(String, Option<String>)> =
            sqlx::query_as("SELECT provider, last_used_at FROM api_keys WHERE user_id = ?")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::from)?;

        Ok(rows
            .into_iter()
            .map(|(provider, last_used_at)| KeySummary {
                provider,
                has_key: true,
                last_used_at: last_used_at.and_then(|s| s.parse().ok()),
            })
            .collect())
    }

    pub async fn delete(&self, user_id: &str, provider: &str) -> Result<()> {
        sqlx::query("DELETE FROM api_keys WHERE user_id = ? AND provider = ?")
            .bind(user_id)
            .bind(provider.to_lowercase())
            .execute(&self.pool)
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
