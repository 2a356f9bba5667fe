//! `AppState` construction and background-task spawning extracted from
//! `main.rs`, in the order each subsystem is validated, opened, and
//! logged into existence.

use std::sync::Arc;

use anyhow::Context;

use sa_domain::config::{Config, ConfigSeverity};
use sa_providers::ProviderRegistry;
use sa_ratelimit::RateLimiter;

use crate::auth::JwtCodec;
use crate::connections::ConnectionRegistry;
use crate::state::AppState;

/// Reads a 32-byte AES key from the env var named by
/// `security.encryption_key_env`, base64-decoded. Absence or a malformed
/// value is fatal — there is no default (§4.1).
fn load_encryption_key(env_var: &str) -> anyhow::Result<[u8; 32]> {
    let raw = std::env::var(env_var)
        .with_context(|| format!("{env_var} must be set (base64-encoded 32-byte key)"))?;
    sa_store::crypto::parse_key(&raw).with_context(|| format!("{env_var} is invalid"))
}

/// Builds the full `AppState`, validating configuration and every
/// subsystem it touches before the server starts accepting connections.
pub async fn build_app_state(config: Arc<Config>) -> anyhow::Result<AppState> {
    tracing::info!("serialagent gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    // ── Storage ──────────────────────────────────────────────────────
    let pool = sa_store::connect(&config.database.path)
        .await
        .context("opening database")?;
    let encryption_key = load_encryption_key(&config.security.encryption_key_env)?;
    let store = sa_store::Store::new(pool, encryption_key);
    tracing::info!(path = %config.database.path, "storage ready");

    // ── LLM providers ────────────────────────────────────────────────
    let providers = Arc::new(
        ProviderRegistry::from_config(&config.llm).context("initializing LLM providers")?,
    );
    if providers.is_empty() {
        tracing::warn!("no LLM providers configured — chat requests will fail");
    } else {
        tracing::info!(providers = providers.len(), "LLM provider registry ready");
    }

    // ── Rate limiter ─────────────────────────────────────────────────
    let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone()));
    tracing::info!("rate limiter ready");

    // ── Identity tokens ──────────────────────────────────────────────
    let jwt_secret = std::env::var(&config.security.jwt_secret_env)
        .with_context(|| format!("{} must be set", config.security.jwt_secret_env))?;
    let jwt = Arc::new(JwtCodec::new(&jwt_secret, config.security.token_expiry_secs));
    tracing::info!("identity token codec ready");

    // ── Connection registry (WebSocket transport) ───────────────────
    let connections = Arc::new(ConnectionRegistry::new());

    Ok(AppState {
        config,
        store,
        providers,
        rate_limiter,
        jwt,
        connections,
    })
}

/// Spawns the gateway's periodic background maintenance: idle session
/// locks and stale rate-limit counters are both bounded structures that
/// only shrink on a timer, never on the request path.
pub fn spawn_background_tasks(state: &AppState) {
    let locks = state.store.locks.clone();
    let rate_limiter = state.rate_limiter.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            locks.prune_idle();
            rate_limiter.gc();
        }
    });
}
