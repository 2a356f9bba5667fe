//! Request-level identity (§6, §9).
//!
//! `require_auth` is the single transport-level guard: it validates the
//! bearer token once per request and attaches `user_id` to the request's
//! extensions. Downstream handlers extract [`AuthUser`] instead of
//! re-parsing or re-validating the token — consolidating what the source
//! project spread across multiple ad-hoc checks (§9's redesign flag).

pub mod jwt;

use axum::body::Body;
use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Json, Response};

use sa_domain::trace::TraceEvent;
use sa_ratelimit::{Decision, EndpointClass};

pub use jwt::{Claims, JwtCodec, VerifyError};

use crate::state::AppState;

/// The authenticated caller, attached to request extensions by
/// [`require_auth`]. Handlers that need identity extract this directly.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, Json<serde_json::Value>);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthUser>()
            .cloned()
            .ok_or_else(|| {
                (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "unauthenticated" })),
                )
            })
    }
}

fn bearer_token(req: &Request<Body>) -> &str {
    req.headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .unwrap_or("")
}

/// Axum middleware enforcing identity-token validation on every protected
/// route. Attach via `axum::middleware::from_fn_with_state`.
pub async fn require_auth(State(state): State<AppState>, mut req: Request<Body>, next: Next) -> Response {
    let token = bearer_token(&req);
    match state.jwt.verify(token) {
        Ok(user_id) => {
            req.extensions_mut().insert(AuthUser { user_id });
            next.run(req).await
        }
        Err(VerifyError::Expired) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "token_expired" })),
        )
            .into_response(),
        Err(VerifyError::Missing) | Err(VerifyError::Invalid) => (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "unauthenticated" })),
        )
            .into_response(),
    }
}

/// Enforces the `general` endpoint class (§4.2's default table) on every
/// protected route other than `/chat`, which carries its own `chat`-class
/// check inside the orchestrator (§4.5 step 2). Runs after [`require_auth`]
/// so it can scope quota by `user_id` rather than remote address.
pub async fn rate_limit_general(State(state): State<AppState>, req: Request<Body>, next: Next) -> Response {
    let user_id = match req.extensions().get::<AuthUser>() {
        Some(auth) => auth.user_id.clone(),
        None => return next.run(req).await,
    };

    match state.rate_limiter.admit(&user_id, EndpointClass::General) {
        Decision::Admitted => next.run(req).await,
        Decision::Rejected { retry_after_secs } => {
            TraceEvent::RateLimitRejected {
                identity: user_id,
                class: "general".to_string(),
                retry_after_secs,
            }
            .emit();
            crate::error::ApiError(sa_domain::error::Error::RateLimited { retry_after_secs }).into_response()
        }
    }
}
