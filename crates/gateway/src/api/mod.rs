pub mod api_keys;
pub mod auth;
pub mod chat;
pub mod health;
pub mod quota;
pub mod sessions;
pub mod ws;

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, patch, post};
use axum::Router;

use crate::state::AppState;

/// Builds the full API router (§6's route table).
///
/// Routes are split into **public** (`/auth/login`, `/health`, the
/// WebSocket upgrade — which authenticates itself via a query-parameter
/// token, since browsers can't set headers on a socket upgrade) and
/// **protected** (everything else, gated behind [`crate::auth::require_auth`]).
/// Everything under `/sessions`, `/api-keys`, and `/rate-limits` additionally
/// runs behind the `general` rate-limit class (§4.2's default table); `/chat`
/// is rate-limited separately, under the `chat` class, inside the
/// orchestrator itself (§4.5 step 2).
pub fn router(state: AppState) -> Router<AppState> {
    let max_request_bytes = state.config.transport.max_request_bytes;

    let public = Router::new()
        .route("/auth/login", post(auth::login))
        .route("/health", get(health::health))
        .route("/ws/chat/:session_id", get(ws::ws_chat));

    let general_limited = Router::new()
        .route("/sessions", get(sessions::list_sessions))
        .route("/sessions/:session_id/messages", get(sessions::list_messages))
        .route("/sessions/:session_id", patch(sessions::rename_session))
        .route("/sessions/:session_id", delete(sessions::delete_session))
        .route("/sessions/:session_id/branch", post(sessions::branch_session))
        .route(
            "/api-keys/:provider",
            get(api_keys::get_api_key)
                .post(api_keys::store_api_key)
                .delete(api_keys::delete_api_key),
        )
        .route("/rate-limits/quota", get(quota::get_quota))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            crate::auth::rate_limit_general,
        ));

    let protected = Router::new()
        .route("/chat", post(chat::chat).layer(DefaultBodyLimit::max(max_request_bytes)))
        .merge(general_limited)
        .route_layer(middleware::from_fn_with_state(state, crate::auth::require_auth));

    Router::new().merge(public).merge(protected)
}
