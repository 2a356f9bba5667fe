use serde::{Deserialize, Serialize};

/// A single (window, limit) policy for one endpoint class.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub window_secs: u64,
    pub limit: u32,
}

/// Per-endpoint-class rate limit table. Identity scope is fixed per class
/// (auth is scoped by remote address since it runs before authentication;
/// the rest are scoped by user_id) rather than made configurable, since the
/// scope choice is a correctness property of each class, not a policy knob.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "d_auth")]
    pub auth: RateLimitPolicy,
    #[serde(default = "d_chat")]
    pub chat: RateLimitPolicy,
    #[serde(default = "d_file")]
    pub file: RateLimitPolicy,
    #[serde(default = "d_general")]
    pub general: RateLimitPolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            auth: d_auth(),
            chat: d_chat(),
            file: d_file(),
            general: d_general(),
        }
    }
}

fn d_auth() -> RateLimitPolicy {
    RateLimitPolicy { window_secs: 60, limit: 5 }
}
fn d_chat() -> RateLimitPolicy {
    RateLimitPolicy { window_secs: 60, limit: 20 }
}
fn d_file() -> RateLimitPolicy {
    RateLimitPolicy { window_secs: 60, limit: 10 }
}
fn d_general() -> RateLimitPolicy {
    RateLimitPolicy { window_secs: 60, limit: 60 }
}
