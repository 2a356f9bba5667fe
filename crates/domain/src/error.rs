/// Shared error type used across the gateway's crates.
///
/// Every variant maps to exactly one HTTP status via [`Error::status_code`],
/// so transport code never has to re-derive a status from a message string.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unauthenticated")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("provider {provider}: {message}")]
    ProviderError { provider: String, message: String },

    #[error("provider {provider} unavailable: {message}")]
    ProviderUnavailable { provider: String, message: String },

    #[error("internal: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The eight-kind taxonomy exposed to clients as `error_kind`.
impl Error {
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::Unauthenticated => "unauthenticated",
            Error::Forbidden => "forbidden",
            Error::NotFound(_) => "not_found",
            Error::RateLimited { .. } => "rate_limited",
            Error::ProviderError { .. } => "provider_error",
            Error::ProviderUnavailable { .. } => "provider_unavailable",
            Error::Internal(_) => "internal",
        }
    }

    /// HTTP status code for this error kind. Kept here (rather than in the
    /// gateway crate) so every caller derives the same status from the
    /// same variant.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::InvalidInput(_) => 400,
            Error::Unauthenticated => 401,
            Error::Forbidden => 403,
            Error::NotFound(_) => 404,
            Error::RateLimited { .. } => 429,
            Error::ProviderError { .. } => 502,
            Error::ProviderUnavailable { .. } => 503,
            Error::Internal(_) => 500,
        }
    }

    /// Message safe to return to a client: never a raw I/O path, DB error,
    /// or stack trace.
    pub fn user_message(&self) -> String {
        match self {
            Error::Internal(_) => "internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Internal(format!("io: {e}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Internal(format!("json: {e}"))
    }
}

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Error::NotFound("record not found".to_string()),
            other => Error::Internal(format!("storage: {other}")),
        }
    }
}

/// Maps a provider HTTP client failure to the taxonomy. Timeouts and
/// connect failures are `provider_unavailable` (retryable); everything
/// else from the wire is `provider_error`.
pub fn from_reqwest(provider: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() || e.is_connect() {
        Error::ProviderUnavailable {
            provider: provider.to_string(),
            message: "request timed out or could not connect".to_string(),
        }
    } else {
        Error::ProviderError {
            provider: provider.to_string(),
            message: e.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(Error::InvalidInput("x".into()).status_code(), 400);
        assert_eq!(Error::Unauthenticated.status_code(), 401);
        assert_eq!(Error::Forbidden.status_code(), 403);
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::RateLimited { retry_after_secs: 5 }.status_code(), 429);
        assert_eq!(
            Error::ProviderError { provider: "a".into(), message: "m".into() }.status_code(),
            502
        );
        assert_eq!(
            Error::ProviderUnavailable { provider: "a".into(), message: "m".into() }.status_code(),
            503
        );
        assert_eq!(Error::Internal("x".into()).status_code(), 500);
    }

    #[test]
    fn internal_user_message_never_leaks_detail() {
        let e = Error::Internal("sqlite path /home/alice/secrets.db".to_string());
        assert_eq!(e.user_message(), "internal error");
    }

    #[test]
    fn sqlx_row_not_found_maps_to_not_found() {
        let e: Error = sqlx::Error::RowNotFound.into();
        assert_eq!(e.kind(), "not_found");
    }
}
