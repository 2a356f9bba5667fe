//! `POST /auth/login` (§6): the one unauthenticated, mutating route.
//! Everything else about account lifecycle — registration, password
//! reset, refresh tokens — is out of scope (§1); this only exchanges a
//! username/password pair already provisioned out of band for an
//! identity token.

use axum::extract::{ConnectInfo, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use sa_domain::error::Error;
use sa_domain::trace::TraceEvent;
use sa_ratelimit::{Decision, EndpointClass};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub user_id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    match state.rate_limiter.admit(&addr.ip().to_string(), EndpointClass::Auth) {
        Decision::Admitted => {}
        Decision::Rejected { retry_after_secs } => {
            TraceEvent::RateLimitRejected {
                identity: addr.ip().to_string(),
                class: "auth".to_string(),
                retry_after_secs,
            }
            .emit();
            return Err(Error::RateLimited { retry_after_secs }.into());
        }
    }

    let user = state
        .store
        .users
        .authenticate(&body.user_id, &body.password)
        .await?
        .ok_or(Error::Unauthenticated)?;

    let (token, expires_at) = state.jwt.issue(&user.user_id)?;

    Ok(Json(LoginResponse { token, expires_at }))
}
