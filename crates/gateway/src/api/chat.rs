//! `POST /chat` (§4.5, §6): submit a turn, stream the response back as
//! server-sent events. One HTTP request drives exactly one turn; the
//! session-scoped, potentially-long-lived conversation lives in the
//! session store across many such requests (and, on the WebSocket
//! transport, many frames over one connection — see [`crate::api::ws`]).

use std::convert::Infallible;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::Stream;
use serde::Deserialize;

use sa_domain::message::Message;
use sa_providers::ChatOptions;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::orchestrator::{self, TurnEvent, TurnInput};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequestOptions {
    pub max_output_tokens: Option<u32>,
    #[serde(default)]
    pub extended_thinking: bool,
    pub temperature: Option<f32>,
}

impl From<ChatRequestOptions> for ChatOptions {
    fn from(o: ChatRequestOptions) -> Self {
        ChatOptions {
            max_output_tokens: o.max_output_tokens,
            extended_thinking: o.extended_thinking,
            temperature: o.temperature,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub api_keys: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub options: Option<ChatRequestOptions>,
}

pub async fn chat(
    State(state): State<AppState>,
    auth: AuthUser,
    axum::Json(body): axum::Json<ChatRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let input = TurnInput {
        user_id: auth.user_id,
        session_id: body.session_id,
        provider: body.provider,
        model: body.model,
        messages: body.messages,
        api_keys: body.api_keys,
        options: body.options.map(ChatOptions::from).unwrap_or_default(),
    };

    let (_turn_id, rx) = orchestrator::run_turn(state, input);
    Ok(Sse::new(make_sse_stream(rx)).keep_alive(KeepAlive::default()))
}

fn make_sse_stream(
    mut rx: tokio::sync::mpsc::Receiver<sa_domain::error::Result<TurnEvent>>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    async_stream::stream! {
        while let Some(item) = rx.recv().await {
            match item {
                Ok(TurnEvent::Start { turn_id, session_id }) => {
                    yield Ok(Event::default()
                        .event("start")
                        .json_data(serde_json::json!({ "turn_id": turn_id, "session_id": session_id }))
                        .unwrap_or_else(|_| Event::default().event("start")));
                }
                Ok(TurnEvent::Chunk { turn_id, seq, text }) => {
                    yield Ok(Event::default()
                        .event("chunk")
                        .json_data(serde_json::json!({ "turn_id": turn_id, "seq": seq, "text": text }))
                        .unwrap_or_else(|_| Event::default().event("chunk")));
                }
                Ok(TurnEvent::Complete { turn_id, full_text, model, provider, usage }) => {
                    yield Ok(Event::default().event("complete").json_data(serde_json::json!({
                        "turn_id": turn_id,
                        "full_text": full_text,
                        "model": model,
                        "provider": provider,
                        "usage": usage,
                    })).unwrap_or_else(|_| Event::default().event("complete")));
                }
                Ok(TurnEvent::Error { turn_id, message }) => {
                    yield Ok(Event::default()
                        .event("error")
                        .json_data(serde_json::json!({ "turn_id": turn_id, "message": message }))
                        .unwrap_or_else(|_| Event::default().event("error")));
                }
                Err(e) => {
                    yield Ok(Event::default()
                        .event("error")
                        .json_data(serde_json::json!({ "message": e.user_message() }))
                        .unwrap_or_else(|_| Event::default().event("error")));
                    break;
                }
            }
        }
    }
}
