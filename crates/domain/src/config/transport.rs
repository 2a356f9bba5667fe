use serde::{Deserialize, Serialize};

/// Transport-wide limits shared by the HTTP and WebSocket surfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Reject an incoming chat message larger than this with a 413-equivalent.
    #[serde(default = "d_max_request_bytes")]
    pub max_request_bytes: usize,

    /// Close a WebSocket connection idle longer than this.
    #[serde(default = "d_ws_idle_timeout_secs")]
    pub ws_idle_timeout_secs: u64,

    /// Hard upper bound on a single provider call, regardless of class.
    #[serde(default = "d_provider_call_timeout_secs")]
    pub provider_call_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_request_bytes: d_max_request_bytes(),
            ws_idle_timeout_secs: d_ws_idle_timeout_secs(),
            provider_call_timeout_secs: d_provider_call_timeout_secs(),
        }
    }
}

fn d_max_request_bytes() -> usize {
    1_048_576 // 1 MiB
}
fn d_ws_idle_timeout_secs() -> u64 {
    300 // 5 minutes
}
fn d_provider_call_timeout_secs() -> u64 {
    120
}
