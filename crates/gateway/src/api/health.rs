//! `GET /health` (§6): unauthenticated liveness/readiness probe.

use axum::extract::State;
use axum::Json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "providers": state.providers.list_providers(),
    }))
}
