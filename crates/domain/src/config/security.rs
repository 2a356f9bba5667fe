use serde::{Deserialize, Serialize};

/// Names of the environment variables carrying the two required startup
/// secrets. The values themselves are never stored in config (on disk or
/// in memory as part of `Config`) — only the name of the env var to read.
///
/// Both are **required**: a missing env var is a fatal startup condition,
/// not a warning, because all API-key ciphertext becomes unreadable on a
/// key change and all issued tokens become unverifiable on a secret change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Env var holding the process-wide AES-256-GCM key (32 raw bytes,
    /// base64-encoded) used to encrypt stored provider API keys at rest.
    #[serde(default = "d_encryption_key_env")]
    pub encryption_key_env: String,

    /// Env var holding the HMAC signing secret for identity (JWT) tokens.
    #[serde(default = "d_jwt_secret_env")]
    pub jwt_secret_env: String,

    /// Identity token lifetime.
    #[serde(default = "d_token_expiry_secs")]
    pub token_expiry_secs: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key_env: d_encryption_key_env(),
            jwt_secret_env: d_jwt_secret_env(),
            token_expiry_secs: d_token_expiry_secs(),
        }
    }
}

fn d_encryption_key_env() -> String {
    "SA_ENCRYPTION_KEY".into()
}
fn d_jwt_secret_env() -> String {
    "SA_JWT_SECRET".into()
}
fn d_token_expiry_secs() -> u64 {
    86_400
}
