//! Provider-B adapter: Anthropic-style Messages API.
//!
//! System messages move to a top-level `system` field. When
//! `options.extended_thinking` is set, the request gets a `thinking` block
//! with a fixed token budget and `max_tokens` is raised to accommodate it.

use sa_domain::error::{self, Error, Result};
use sa_domain::message::{Message, Role};
use sa_domain::stream::{BoxStream, ChatChunk, Usage};
use serde_json::Value;

use crate::traits::{ChatOptions, LlmProvider};

const API_VERSION: &str = "2023-06-01";
const THINKING_BUDGET_TOKENS: u32 = 4096;
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    id: String,
    label: &'static str,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn from_config(cfg: &sa_domain::config::ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| error::from_reqwest(&cfg.id, e))?;

        Ok(Self {
            id: cfg.id.clone(),
            label: Box::leak(cfg.id.clone().into_boxed_str()),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            default_model: cfg
                .default_model
                .clone()
                .unwrap_or_else(|| "provider-b-default".into()),
            client,
        })
    }

    fn build_body(&self, model: &str, messages: &[Message], options: &ChatOptions) -> Value {
        let mut system_parts: Vec<&str> = Vec::new();
        let mut api_messages: Vec<Value> = Vec::new();

        for m in messages {
            match m.role {
                Role::System => system_parts.push(&m.content),
                Role::User => api_messages.push(serde_json::json!({
                    "role": "user",
                    "content": m.content,
                })),
                Role::Assistant => api_messages.push(serde_json::json!({
                    "role": "assistant",
                    "content": m.content,
                })),
            }
        }

        let base_max = options.max_output_tokens.unwrap_or(DEFAULT_MAX_TOKENS);
        let max_tokens = if options.extended_thinking {
            base_max.max(THINKING_BUDGET_TOKENS + 1024)
        } else {
            base_max
        };

        let mut body = serde_json::json!({
            "model": model,
            "messages": api_messages,
            "stream": true,
            "max_tokens": max_tokens,
        });

        if !system_parts.is_empty() {
            body["system"] = Value::String(system_parts.join("\n\n"));
        }

        if options.extended_thinking {
            body["thinking"] = serde_json::json!({
                "type": "enabled",
                "budget_tokens": THINKING_BUDGET_TOKENS,
            });
        } else if let Some(temp) = options.temperature {
            body["temperature"] = serde_json::json!(temp);
        }

        body
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let input = v.get("input_tokens")?.as_u64()? as u32;
    let output = v.get("output_tokens").and_then(|v| v.as_u64()).unwrap_or(0) as u32;
    Some(Usage {
        input_tokens: input,
        output_tokens: output,
        total_tokens: input + output,
    })
}

/// Running state for one stream, tracking usage across `message_start` and
/// `message_delta` events so the final `Usage` chunk carries both sides.
#[derive(Default)]
struct StreamState {
    usage: Option<Usage>,
}

fn parse_sse(data: &str, state: &mut StreamState) -> Vec<Result<ChatChunk>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::from(e))],
    };

    let event_type = v.get("type").and_then(|v| v.as_str()).unwrap_or("");
    let mut events = Vec::new();

    match event_type {
        "message_start" => {
            if let Some(usage) = v.get("message").and_then(|m| m.get("usage")).and_then(parse_usage) {
                state.usage = Some(usage);
            }
        }
        "content_block_delta" => {
            if let Some(text) = v
                .get("delta")
                .and_then(|d| d.get("text"))
                .and_then(|t| t.as_str())
            {
                if !text.is_empty() {
                    events.push(Ok(ChatChunk::Content { text: text.to_string() }));
                }
            }
        }
        "message_delta" => {
            if let Some(output) = v
                .get("usage")
                .and_then(|u| u.get("output_tokens"))
                .and_then(|v| v.as_u64())
            {
                if let Some(ref mut usage) = state.usage {
                    usage.output_tokens = output as u32;
                    usage.total_tokens = usage.input_tokens + usage.output_tokens;
                }
            }
            if let Some(usage) = state.usage {
                events.push(Ok(ChatChunk::Usage { usage }));
            }
            let stop_reason = v
                .get("delta")
                .and_then(|d| d.get("stop_reason"))
                .and_then(|v| v.as_str())
                .map(normalize_stop_reason);
            if let Some(reason) = stop_reason {
                events.push(Ok(ChatChunk::End { finish_reason: Some(reason) }));
            }
        }
        "message_stop" => {
            events.push(Ok(ChatChunk::End { finish_reason: Some("stop".into()) }));
        }
        "error" => {
            let msg = v
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            events.push(Ok(ChatChunk::Error { message: msg.to_string() }));
        }
        _ => {}
    }

    events
}

fn normalize_stop_reason(s: &str) -> String {
    match s {
        "end_turn" => "stop".to_string(),
        other => other.to_string(),
    }
}

#[async_trait::async_trait]
impl LlmProvider for AnthropicProvider {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        api_key: &str,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>> {
        let model = if model.is_empty() { &self.default_model } else { model };
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(model, messages, options);

        tracing::debug!(provider = %self.id, url = %url, "provider-b stream request");

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| error::from_reqwest(&self.id, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderError {
                provider: self.id.clone(),
                message: crate::util::mask_secrets(&format!("HTTP {} - {}", status.as_u16(), text)),
            });
        }

        let mut state = StreamState::default();
        Ok(crate::sse::sse_response_stream(self.label, resp, move |data| {
            parse_sse(data, &mut state)
        }))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
