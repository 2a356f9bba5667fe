//! Maps the shared error taxonomy onto HTTP responses.
//!
//! Every handler returns `Result<T, ApiError>`; this is the single place
//! a status code is derived from an [`Error`] variant, so no handler ever
//! has to write `StatusCode::...` by hand.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use sa_domain::error::Error;

pub struct ApiError(pub Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (
            status,
            Json(serde_json::json!({
                "error": self.0.kind(),
                "message": self.0.user_message(),
            })),
        )
            .into_response();

        if let Error::RateLimited { retry_after_secs } = &self.0 {
            if let Ok(value) = axum::http::HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert("retry-after", value);
            }
        }

        response
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Builds a bare `401` JSON body for call sites that authenticate outside
/// the normal extractor path (the WebSocket upgrade, which reads its
/// token from a query parameter rather than a header).
pub fn unauthorized_json(reason: &'static str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({ "error": reason })),
    )
        .into_response()
}
