//! `GET/POST/DELETE /api-keys/{provider}` (§4.1, §6): per-user stored
//! provider credentials. Storing one replaces any previous key for that
//! provider; the stored value is never returned once written.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn get_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let keys = state.store.credentials.list(&auth.user_id).await?;
    let summary = keys.into_iter().find(|k| k.provider.eq_ignore_ascii_case(&provider));
    Ok(Json(serde_json::json!({
        "provider": provider,
        "has_key": summary.is_some(),
        "last_used_at": summary.and_then(|k| k.last_used_at),
    })))
}

#[derive(Debug, Deserialize)]
pub struct StoreApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize)]
pub struct StoreApiKeyResponse {
    pub ok: bool,
}

pub async fn store_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
    Json(body): Json<StoreApiKeyRequest>,
) -> ApiResult<Json<StoreApiKeyResponse>> {
    state.store.credentials.store(&auth.user_id, &provider, &body.api_key).await?;
    Ok(Json(StoreApiKeyResponse { ok: true }))
}

pub async fn delete_api_key(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(provider): Path<String>,
) -> ApiResult<Json<StoreApiKeyResponse>> {
    state.store.credentials.delete(&auth.user_id, &provider).await?;
    Ok(Json(StoreApiKeyResponse { ok: true }))
}
