//! Provider-A adapter: OpenAI-compatible chat completions.
//!
//! Works with any endpoint that follows the OpenAI `/chat/completions`
//! contract. Reasoning models (`o1`/`o3`/`gpt-5` prefixes) reject
//! `temperature` and take `max_completion_tokens` instead of `max_tokens` --
//! [`crate::util::is_reasoning_model`] switches the body shape accordingly.

use sa_domain::error::{self, Error, Result};
use sa_domain::message::{Message, Role};
use sa_domain::stream::{BoxStream, ChatChunk, Usage};
use serde_json::Value;

use crate::traits::{ChatOptions, LlmProvider};
use crate::util::is_reasoning_model;

pub struct OpenAiCompatProvider {
    id: String,
    /// Same value as `id`, leaked once at construction so the SSE stream
    /// (which outlives this call) can tag errors without cloning per chunk.
    label: &'static str,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &sa_domain::config::ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| error::from_reqwest(&cfg.id, e))?;

        Ok(Self {
            id: cfg.id.clone(),
            label: Box::leak(cfg.id.clone().into_boxed_str()),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            default_model: cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into()),
            client,
        })
    }

    fn build_body(&self, model: &str, messages: &[Message], options: &ChatOptions) -> Value {
        let msgs: Vec<Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": role_str(m.role),
                    "content": m.content,
                })
            })
            .collect();

        let mut body = serde_json::json!({
            "model": model,
            "messages": msgs,
            "stream": true,
            "stream_options": {"include_usage": true},
        });

        if is_reasoning_model(model) {
            if let Some(max) = options.max_output_tokens {
                body["max_completion_tokens"] = serde_json::json!(max);
            }
        } else {
            if let Some(max) = options.max_output_tokens {
                body["max_tokens"] = serde_json::json!(max);
            }
            if let Some(temp) = options.temperature {
                body["temperature"] = serde_json::json!(temp);
            }
        }

        body
    }
}

fn role_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        input_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        output_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<ChatChunk>> {
    if data.trim() == "[DONE]" {
        return vec![Ok(ChatChunk::End {
            finish_reason: Some("stop".into()),
        })];
    }

    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::from(e))],
    };

    let choice = v
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first());

    let choice = match choice {
        Some(c) => c,
        None => {
            if let Some(usage) = v.get("usage").and_then(parse_usage) {
                return vec![Ok(ChatChunk::Usage { usage })];
            }
            return Vec::new();
        }
    };

    let delta = choice.get("delta").unwrap_or(&Value::Null);
    let mut events = Vec::new();

    if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
        if !text.is_empty() {
            events.push(Ok(ChatChunk::Content {
                text: text.to_string(),
            }));
        }
    }

    if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
        events.push(Ok(ChatChunk::End {
            finish_reason: Some(fr.to_string()),
        }));
    }

    events
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        api_key: &str,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>> {
        let model = if model.is_empty() { &self.default_model } else { model };
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_body(model, messages, options);

        tracing::debug!(provider = %self.id, url = %url, "provider-a stream request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
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

        Ok(crate::sse::sse_response_stream(self.label, resp, parse_sse_data))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
