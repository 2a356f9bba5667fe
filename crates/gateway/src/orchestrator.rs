//! C5: drives one chat turn end to end (§4.5).
//!
//! `run_turn` spawns a task that owns the turn's lifetime and returns a
//! receiver of [`TurnEvent`]s; the transport layer (HTTP SSE, WebSocket)
//! only has to forward what it receives. The per-session mutex is held
//! only for the session-store reads/writes bracketing the turn — never
//! across the provider network call (§5).

use std::time::Instant;

use futures_util::StreamExt;
use tokio::sync::mpsc;

use sa_domain::error::{Error, Result};
use sa_domain::message::{Message, Role};
use sa_domain::stream::{ChatChunk, Usage};
use sa_domain::trace::TraceEvent;
use sa_providers::ChatOptions;
use sa_ratelimit::EndpointClass;
use sa_store::sessions::TokenUsage;

use crate::state::AppState;

/// Context-window budget, in characters, used as a cheap proxy for token
/// count when deciding whether to prune (§4.5 step 5). A real token
/// count would need a per-model tokenizer; this is the same kind of
/// approximation the rate limiter's sliding window makes (bounded error,
/// documented, not exact).
const CONTEXT_BUDGET_CHARS: usize = 64_000;

#[derive(Debug, Clone)]
pub struct TurnInput {
    pub user_id: String,
    pub session_id: Option<String>,
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    pub api_keys: std::collections::HashMap<String, String>,
    pub options: ChatOptions,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    Start {
        turn_id: String,
        session_id: String,
    },
    Chunk {
        turn_id: String,
        seq: u64,
        text: String,
    },
    Complete {
        turn_id: String,
        full_text: String,
        model: String,
        provider: String,
        usage: Option<Usage>,
    },
    Error {
        turn_id: String,
        message: String,
    },
}

/// Starts a turn as a background task. Returns immediately with the turn
/// id and a channel the caller drains for events. An error occurring
/// before any chunk is produced (rate limit, unknown session, unknown
/// provider, missing credentials) is reported as the single item `Err`;
/// after that point, errors are reported as a terminal `TurnEvent::Error`.
pub fn run_turn(
    state: AppState,
    input: TurnInput,
) -> (String, mpsc::Receiver<Result<TurnEvent>>) {
    let turn_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = mpsc::channel(64);

    let turn_id_for_task = turn_id.clone();
    tokio::spawn(async move {
        if let Err(e) = drive_turn(state, input, turn_id_for_task, tx.clone()).await {
            let _ = tx.send(Err(e)).await;
        }
    });

    (turn_id, rx)
}

async fn drive_turn(
    state: AppState,
    input: TurnInput,
    turn_id: String,
    tx: mpsc::Sender<Result<TurnEvent>>,
) -> Result<()> {
    let started_at = Instant::now();

    // Step 2: admit against the rate limiter before touching storage.
    match state.rate_limiter.admit(&input.user_id, EndpointClass::Chat) {
        sa_ratelimit::Decision::Admitted => {}
        sa_ratelimit::Decision::Rejected { retry_after_secs } => {
            TraceEvent::RateLimitRejected {
                identity: input.user_id.clone(),
                class: "chat".to_string(),
                retry_after_secs,
            }
            .emit();
            return Err(Error::RateLimited { retry_after_secs });
        }
    }

    // Provider lookup happens before any network call and before
    // credential resolution (§4.4 — unknown provider fails immediately).
    let provider = state
        .providers
        .get(&input.provider)
        .ok_or_else(|| Error::InvalidInput(format!("provider not configured: {}", input.provider)))?;

    // Steps 3-4: load/create the session and append the incoming
    // message(s), bracketed by the per-session mutex.
    let session_id = {
        let session_id = match &input.session_id {
            Some(id) => id.clone(),
            None => state.store.sessions.create_session(&input.user_id, None).await?,
        };

        let _guard = state.store.locks.acquire(&session_id).await;
        // Ownership check happens inside append_message/get_session.
        state.store.sessions.get_session(&session_id, &input.user_id).await?;

        for message in &input.messages {
            if message.role != Role::User {
                return Err(Error::InvalidInput(
                    "only user-role messages may be submitted in a turn".into(),
                ));
            }
            state
                .store
                .sessions
                .append_message(&session_id, &input.user_id, message.role, &message.content, None, None, None)
                .await?;
        }
        session_id
    };

    TraceEvent::TurnStarted {
        session_id: session_id.clone(),
        turn_id: turn_id.clone(),
        provider: input.provider.clone(),
        model: input.model.clone(),
    }
    .emit();

    let _ = tx
        .send(Ok(TurnEvent::Start {
            turn_id: turn_id.clone(),
            session_id: session_id.clone(),
        }))
        .await;

    // Step 5: assemble the prompt and prune if needed.
    let history = state
        .store
        .sessions
        .list_messages(&session_id, &input.user_id, None, None)
        .await?;
    let prompt = prune_to_budget(
        history
            .into_iter()
            .map(|m| Message { role: m.role, content: m.content })
            .collect(),
        CONTEXT_BUDGET_CHARS,
    );

    // Step 6: resolve credentials (§4.1's resolution order).
    let api_key = resolve_credentials(&state, &input).await?;

    // Step 7: invoke the adapter. A hard upper bound on the whole call
    // (connect through final chunk) prevents one hung provider stream from
    // pinning the turn's resources indefinitely (§5).
    let call_timeout = std::time::Duration::from_secs(state.config.transport.provider_call_timeout_secs);
    let deadline = tokio::time::Instant::now() + call_timeout;

    let mut stream = match tokio::time::timeout_at(deadline, provider.stream_chat(&input.model, &prompt, &input.options, &api_key)).await {
        Ok(result) => result?,
        Err(_) => {
            return Err(Error::ProviderUnavailable {
                provider: input.provider.clone(),
                message: "provider call timed out".to_string(),
            })
        }
    };

    // Step 8: forward chunks, accumulating text for the final message.
    let mut accumulated = String::new();
    let mut usage = None;
    let mut seq: u64 = 0;
    let mut adapter_error: Option<String> = None;
    let mut client_gone = false;

    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = tokio::time::sleep_until(deadline) => {
                adapter_error = Some("provider call timed out".to_string());
                break;
            }
        };
        let Some(chunk) = chunk else { break };
        match chunk {
            Ok(ChatChunk::Content { text }) => {
                accumulated.push_str(&text);
                let event = TurnEvent::Chunk {
                    turn_id: turn_id.clone(),
                    seq,
                    text,
                };
                TraceEvent::TurnChunk { turn_id: turn_id.clone(), seq }.emit();
                seq += 1;
                if tx.send(Ok(event)).await.is_err() {
                    // Client disconnected: stop polling the adapter so its
                    // connection is released promptly (§4.5 cancellation).
                    client_gone = true;
                    break;
                }
            }
            Ok(ChatChunk::Usage { usage: u }) => usage = Some(u),
            Ok(ChatChunk::End { .. }) => break,
            Ok(ChatChunk::Error { message }) => {
                adapter_error = Some(message);
                break;
            }
            Err(e) => {
                adapter_error = Some(e.user_message());
                break;
            }
        }
    }
    drop(stream);

    // Steps 9-10: persist the final (or partial) assistant message,
    // reacquiring the session lock — released above for the streaming
    // call, per §5.
    {
        let _guard = state.store.locks.acquire(&session_id).await;
        let token_usage = usage.map(|u| TokenUsage {
            input_tokens: u.input_tokens as i64,
            output_tokens: u.output_tokens as i64,
            total_tokens: u.total_tokens as i64,
        });
        state
            .store
            .sessions
            .append_message(
                &session_id,
                &input.user_id,
                Role::Assistant,
                &accumulated,
                Some(&input.provider),
                Some(&input.model),
                token_usage,
            )
            .await?;
    }

    if client_gone {
        TraceEvent::TurnCancelled {
            session_id: session_id.clone(),
            turn_id: turn_id.clone(),
            elapsed_ms: started_at.elapsed().as_millis() as u64,
        }
        .emit();
        return Ok(());
    }

    if let Some(message) = adapter_error {
        TraceEvent::TurnFailed {
            session_id: session_id.clone(),
            turn_id: turn_id.clone(),
            provider: input.provider.clone(),
            reason: message.clone(),
        }
        .emit();
        let _ = tx
            .send(Ok(TurnEvent::Error {
                turn_id: turn_id.clone(),
                message,
            }))
            .await;
    } else {
        TraceEvent::TurnCompleted {
            session_id: session_id.clone(),
            turn_id: turn_id.clone(),
            provider: input.provider.clone(),
            model: input.model.clone(),
            duration_ms: started_at.elapsed().as_millis() as u64,
            input_tokens: usage.map(|u| u.input_tokens),
            output_tokens: usage.map(|u| u.output_tokens),
        }
        .emit();
        let _ = tx
            .send(Ok(TurnEvent::Complete {
                turn_id: turn_id.clone(),
                full_text: accumulated,
                model: input.model.clone(),
                provider: input.provider.clone(),
                usage,
            }))
            .await;
    }

    Ok(())
}

/// §4.1's resolution order: inline keys win, then the user's stored key,
/// then the process-wide default, then failure.
async fn resolve_credentials(state: &AppState, input: &TurnInput) -> Result<String> {
    let resolved = resolve_credentials_inner(state, input).await;

    match &resolved {
        Ok((_, source)) => {
            TraceEvent::CredentialResolved {
                user_id: input.user_id.clone(),
                provider: input.provider.clone(),
                source: source.to_string(),
            }
            .emit();
        }
        Err(_) => {
            TraceEvent::CredentialResolutionFailed {
                user_id: input.user_id.clone(),
                provider: input.provider.clone(),
            }
            .emit();
        }
    }

    resolved.map(|(key, _)| key)
}

async fn resolve_credentials_inner(state: &AppState, input: &TurnInput) -> Result<(String, &'static str)> {
    if let Some(inline) = input.api_keys.get(&input.provider) {
        return Ok((inline.clone(), "inline"));
    }

    if let Some(stored) = state.store.credentials.retrieve(&input.user_id, &input.provider).await? {
        return Ok((stored, "stored"));
    }

    let default_env = state
        .config
        .llm
        .providers
        .iter()
        .find(|p| p.id.eq_ignore_ascii_case(&input.provider))
        .and_then(|p| p.default_auth_env.as_deref());

    if let Some(env_var) = default_env {
        if let Ok(value) = std::env::var(env_var) {
            if !value.is_empty() {
                return Ok((value, "default"));
            }
        }
    }

    Err(Error::InvalidInput(format!(
        "no credentials available for provider {}",
        input.provider
    )))
}

/// Drops oldest non-system messages first until the assembled prompt fits
/// the budget; system messages are never pruned (§4.5 step 5).
fn prune_to_budget(messages: Vec<Message>, budget_chars: usize) -> Vec<Message> {
    let total: usize = messages.iter().map(|m| m.content.len()).sum();
    if total <= budget_chars {
        return messages;
    }

    let mut kept: Vec<Message> = Vec::with_capacity(messages.len());
    let mut droppable: Vec<Message> = Vec::new();
    for m in messages {
        if m.role == Role::System {
            kept.push(m);
        } else {
            droppable.push(m);
        }
    }

    let mut used: usize = kept.iter().map(|m| m.content.len()).sum();
    let mut start = 0;
    for (i, m) in droppable.iter().enumerate() {
        used += m.content.len();
        if used > budget_chars {
            start = i + 1;
        }
    }

    let mut result = kept;
    result.extend(droppable.into_iter().skip(start));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_keeps_system_messages() {
        let messages = vec![
            Message::system("s"),
            Message::user(&"a".repeat(40)),
            Message::assistant(&"b".repeat(40)),
            Message::user(&"c".repeat(40)),
        ];
        let pruned = prune_to_budget(messages, 50);
        assert!(pruned.iter().any(|m| m.role == Role::System));
        assert_eq!(pruned.last().unwrap().content, "c".repeat(40));
    }

    #[test]
    fn prune_is_noop_under_budget() {
        let messages = vec![Message::user("hi")];
        let pruned = prune_to_budget(messages.clone(), 1000);
        assert_eq!(pruned.len(), messages.len());
    }
}
