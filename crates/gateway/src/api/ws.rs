//! C6: the WebSocket half of the transport layer (§4.6, §6).
//!
//! Browsers can't set an `Authorization` header on a WebSocket upgrade, so
//! this route authenticates via a `token` query parameter instead of the
//! generic [`crate::auth::require_auth`] middleware — the same shape the
//! node-facing socket upgrade used for its own bearer token.

use std::time::Instant;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{Path, Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration, MissedTickBehavior};

use sa_domain::message::Message;
use sa_providers::ChatOptions;

use crate::auth::VerifyError;
use crate::orchestrator::{self, TurnEvent, TurnInput};
use crate::state::AppState;

const PING_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientFrame {
    Chat {
        provider: String,
        model: String,
        content: String,
        #[serde(default)]
        api_keys: std::collections::HashMap<String, String>,
        #[serde(default)]
        options: Option<ClientChatOptions>,
    },
    Ping,
}

#[derive(Debug, Deserialize)]
struct ClientChatOptions {
    max_output_tokens: Option<u32>,
    #[serde(default)]
    extended_thinking: bool,
    temperature: Option<f32>,
}

impl From<ClientChatOptions> for ChatOptions {
    fn from(o: ClientChatOptions) -> Self {
        ChatOptions {
            max_output_tokens: o.max_output_tokens,
            extended_thinking: o.extended_thinking,
            temperature: o.temperature,
        }
    }
}

/// Outbound server frames (§6's WebSocket frame shapes). `Clone` because
/// [`crate::connections::ConnectionRegistry`] fans one frame out to every
/// connection registered for a session.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Start { turn_id: String },
    Chunk { turn_id: String, seq: u64, text: String },
    Complete {
        turn_id: String,
        full_text: String,
        model: String,
        provider: String,
        usage: Option<sa_domain::stream::Usage>,
    },
    Error { turn_id: String, message: String },
    Pong,
}

impl From<TurnEvent> for ServerFrame {
    fn from(event: TurnEvent) -> Self {
        match event {
            TurnEvent::Start { turn_id, .. } => ServerFrame::Start { turn_id },
            TurnEvent::Chunk { turn_id, seq, text } => ServerFrame::Chunk { turn_id, seq, text },
            TurnEvent::Complete { turn_id, full_text, model, provider, usage } => {
                ServerFrame::Complete { turn_id, full_text, model, provider, usage }
            }
            TurnEvent::Error { turn_id, message } => ServerFrame::Error { turn_id, message },
        }
    }
}

pub async fn ws_chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let user_id = match state.jwt.verify(&query.token) {
        Ok(user_id) => user_id,
        Err(VerifyError::Expired) => return crate::error::unauthorized_json("token_expired"),
        Err(VerifyError::Missing) | Err(VerifyError::Invalid) => {
            return crate::error::unauthorized_json("unauthenticated")
        }
    };

    if let Err(e) = state.store.sessions.get_session(&session_id, &user_id).await {
        return crate::error::ApiError(e).into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String, user_id: String) {
    let (mut ws_sink, mut ws_stream) = socket.split();
    let (handle, mut outbound_rx) = state.connections.register(&session_id);

    let mut ping_interval = interval(Duration::from_secs(PING_INTERVAL_SECS));
    ping_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let idle_timeout = Duration::from_secs(state.config.transport.ws_idle_timeout_secs);
    let mut idle_check = interval(Duration::from_secs(5).min(idle_timeout));
    idle_check.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_activity = Instant::now();

    let reason = loop {
        tokio::select! {
            outbound = outbound_rx.recv() => {
                let Some(frame) = outbound else { break "channel_closed" };
                let Ok(text) = serde_json::to_string(&frame) else { continue };
                if ws_sink.send(WsMessage::Text(text)).await.is_err() {
                    break "send_error";
                }
            }
            _ = ping_interval.tick() => {
                if ws_sink.send(WsMessage::Ping(Vec::new())).await.is_err() {
                    break "send_error";
                }
            }
            _ = idle_check.tick() => {
                if last_activity.elapsed() >= idle_timeout {
                    break "idle_timeout";
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(WsMessage::Text(text))) => {
                        last_activity = Instant::now();
                        handle_client_frame(&state, &session_id, &user_id, &text).await;
                    }
                    Some(Ok(WsMessage::Pong(_))) => {
                        last_activity = Instant::now();
                    }
                    Some(Ok(WsMessage::Close(_))) => break "client_closed",
                    Some(Ok(_)) => {
                        last_activity = Instant::now();
                    }
                    _ => break "read_error",
                }
            }
        }
    };

    state.connections.deregister(&handle, reason);
}

async fn handle_client_frame(state: &AppState, session_id: &str, user_id: &str, text: &str) {
    if text.len() > state.config.transport.max_request_bytes {
        state
            .connections
            .broadcast(
                session_id,
                ServerFrame::Error {
                    turn_id: String::new(),
                    message: "message exceeds the configured size limit".to_string(),
                },
            )
            .await;
        return;
    }

    let frame: ClientFrame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(_) => return,
    };

    match frame {
        ClientFrame::Ping => {
            state.connections.broadcast(session_id, ServerFrame::Pong).await;
        }
        ClientFrame::Chat { provider, model, content, api_keys, options } => {
            let input = TurnInput {
                user_id: user_id.to_string(),
                session_id: Some(session_id.to_string()),
                provider,
                model,
                messages: vec![Message::user(content)],
                api_keys,
                options: options.map(ChatOptions::from).unwrap_or_default(),
            };

            let (_turn_id, mut rx) = orchestrator::run_turn(state.clone(), input);
            while let Some(event) = rx.recv().await {
                match event {
                    Ok(event) => state.connections.broadcast(session_id, event.into()).await,
                    Err(e) => {
                        state
                            .connections
                            .broadcast(
                                session_id,
                                ServerFrame::Error { turn_id: String::new(), message: e.user_message() },
                            )
                            .await;
                    }
                }
            }
        }
    }
}
