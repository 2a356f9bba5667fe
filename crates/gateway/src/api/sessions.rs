//! Session management routes (§3, §4.3, §6). Chat itself lives in
//! [`crate::api::chat`]; this module only covers listing, renaming,
//! deleting, branching, and reading history.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use sa_domain::trace::TraceEvent;
use sa_store::sessions::Pagination;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ListSessionsQuery {
    pub offset: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListSessionsQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let default = Pagination::default_page();
    let page = Pagination {
        offset: query.offset.unwrap_or(default.offset),
        limit: query.limit.unwrap_or(default.limit),
    };
    let sessions = state.store.sessions.list_sessions(&auth.user_id, page).await?;
    Ok(Json(serde_json::json!({ "sessions": sessions })))
}

#[derive(Debug, Deserialize)]
pub struct ListMessagesQuery {
    pub after_id: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
    Query(query): Query<ListMessagesQuery>,
) -> ApiResult<Json<serde_json::Value>> {
    let messages = state
        .store
        .sessions
        .list_messages(&session_id, &auth.user_id, query.after_id, query.limit)
        .await?;
    Ok(Json(serde_json::json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct RenameSessionRequest {
    pub name: String,
}

pub async fn rename_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<RenameSessionRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    state
        .store
        .sessions
        .rename_session(&session_id, &auth.user_id, &body.name)
        .await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    state.store.sessions.delete_session(&session_id, &auth.user_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct BranchSessionRequest {
    pub at_message_id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct BranchSessionResponse {
    pub session_id: String,
}

pub async fn branch_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
    Json(body): Json<BranchSessionRequest>,
) -> ApiResult<Json<BranchSessionResponse>> {
    let new_session_id = state
        .store
        .sessions
        .branch_session(&session_id, &auth.user_id, body.at_message_id, body.name.as_deref())
        .await?;

    TraceEvent::SessionBranched {
        parent_session_id: session_id,
        new_session_id: new_session_id.clone(),
        at_message_id: body.at_message_id,
    }
    .emit();

    Ok(Json(BranchSessionResponse { session_id: new_session_id }))
}
