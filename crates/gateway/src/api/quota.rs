//! `GET /rate-limits/quota` (§4.2, §6): per-identity usage against every
//! endpoint class, for clients to back off before they'd otherwise hit a
//! `429`.

use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::state::AppState;

pub async fn get_quota(State(state): State<AppState>, auth: AuthUser) -> Json<serde_json::Value> {
    let quota = state.rate_limiter.quota(&auth.user_id);
    Json(serde_json::json!({ "quota": quota }))
}
