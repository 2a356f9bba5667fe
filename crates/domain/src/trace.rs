use serde::Serialize;

/// Structured trace events emitted across the gateway's crates. Each is
/// logged as a single `tracing::info!` line carrying the event's JSON
/// representation under the `trace_event` field, so log aggregators can
/// filter/parse without a bespoke schema per call site.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    TurnStarted {
        session_id: String,
        turn_id: String,
        provider: String,
        model: String,
    },
    TurnChunk {
        turn_id: String,
        seq: u64,
    },
    TurnCompleted {
        session_id: String,
        turn_id: String,
        provider: String,
        model: String,
        duration_ms: u64,
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
    TurnFailed {
        session_id: String,
        turn_id: String,
        provider: String,
        reason: String,
    },
    TurnCancelled {
        session_id: String,
        turn_id: String,
        elapsed_ms: u64,
    },
    RateLimitRejected {
        identity: String,
        class: String,
        retry_after_secs: u64,
    },
    CredentialResolved {
        user_id: String,
        provider: String,
        source: String,
    },
    CredentialResolutionFailed {
        user_id: String,
        provider: String,
    },
    SessionBranched {
        parent_session_id: String,
        new_session_id: String,
        at_message_id: i64,
    },
    ConnectionAttached {
        session_id: String,
        connection_count: usize,
    },
    ConnectionClosed {
        session_id: String,
        reason: String,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "sa_event");
    }
}
