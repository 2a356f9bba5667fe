//! Provider-C adapter: Gemini-style `streamGenerateContent` API.
//!
//! Auth is a query-string `key=` parameter rather than a header, so
//! [`redact_url_key`] scrubs it before any URL is logged.

use sa_domain::error::{self, Error, Result};
use sa_domain::message::{Message, Role};
use sa_domain::stream::{BoxStream, ChatChunk, Usage};
use serde_json::Value;

use crate::traits::{ChatOptions, LlmProvider};

pub struct GoogleProvider {
    id: String,
    label: &'static str,
    base_url: String,
    default_model: String,
    client: reqwest::Client,
}

impl GoogleProvider {
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
                .unwrap_or_else(|| "provider-c-default".into()),
            client,
        })
    }

    fn stream_url(&self, model: &str, api_key: &str) -> String {
        format!(
            "{}/v1beta/models/{}:streamGenerateContent?alt=sse&key={}",
            self.base_url, model, api_key
        )
    }

    fn build_body(&self, messages: &[Message], options: &ChatOptions) -> Value {
        let mut contents: Vec<Value> = Vec::new();
        let mut system_instruction: Option<Value> = None;

        for m in messages {
            match m.role {
                Role::System => {
                    system_instruction = Some(serde_json::json!({"parts": [{"text": m.content}]}));
                }
                Role::User => contents.push(serde_json::json!({
                    "role": "user",
                    "parts": [{"text": m.content}],
                })),
                Role::Assistant => contents.push(serde_json::json!({
                    "role": "model",
                    "parts": [{"text": m.content}],
                })),
            }
        }

        let mut body = serde_json::json!({ "contents": contents });
        if let Some(si) = system_instruction {
            body["systemInstruction"] = si;
        }

        let mut gen_config = serde_json::json!({});
        if let Some(max) = options.max_output_tokens {
            gen_config["maxOutputTokens"] = serde_json::json!(max);
        }
        if let Some(temp) = options.temperature {
            gen_config["temperature"] = serde_json::json!(temp);
        }
        if gen_config.as_object().is_some_and(|o| !o.is_empty()) {
            body["generationConfig"] = gen_config;
        }

        body
    }
}

/// Redact the `key=` query parameter before a URL reaches a log line.
fn redact_url_key(url: &str) -> String {
    if let Some(idx) = url.find("key=") {
        let prefix = &url[..idx + 4];
        let rest = &url[idx + 4..];
        let end = rest.find('&').unwrap_or(rest.len());
        format!("{prefix}[REDACTED]{}", &rest[end..])
    } else {
        url.to_string()
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    let prompt = v.get("promptTokenCount")?.as_u64()? as u32;
    let completion = v
        .get("candidatesTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or(0) as u32;
    let total = v
        .get("totalTokenCount")
        .and_then(|v| v.as_u64())
        .unwrap_or((prompt + completion) as u64) as u32;
    Some(Usage {
        input_tokens: prompt,
        output_tokens: completion,
        total_tokens: total,
    })
}

fn parse_sse_data(data: &str) -> Vec<Result<ChatChunk>> {
    let v: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return vec![Err(Error::from(e))],
    };

    let candidate = match v
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
    {
        Some(c) => c,
        None => return Vec::new(),
    };

    let mut events = Vec::new();

    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
                if !text.is_empty() {
                    events.push(Ok(ChatChunk::Content { text: text.to_string() }));
                }
            }
        }
    }

    if let Some(usage) = v.get("usageMetadata").and_then(parse_usage) {
        events.push(Ok(ChatChunk::Usage { usage }));
    }

    if let Some(fr) = candidate.get("finishReason").and_then(|v| v.as_str()) {
        let finish_reason = match fr {
            "STOP" => "stop".to_string(),
            "MAX_TOKENS" => "length".to_string(),
            other => other.to_lowercase(),
        };
        events.push(Ok(ChatChunk::End { finish_reason: Some(finish_reason) }));
    }

    events
}

#[async_trait::async_trait]
impl LlmProvider for GoogleProvider {
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        api_key: &str,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>> {
        let model = if model.is_empty() { &self.default_model } else { model };
        let url = self.stream_url(model, api_key);
        let body = self.build_body(messages, options);

        tracing::debug!(provider = %self.id, url = %redact_url_key(&url), "provider-c stream request");

        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| error::from_reqwest(&self.id, e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::ProviderError {
                provider: self.id.clone(),
                message: crate::util::mask_secrets(&redact_url_key(&format!(
                    "HTTP {} - {}",
                    status.as_u16(),
                    text
                ))),
            });
        }

        Ok(crate::sse::sse_response_stream(self.label, resp, parse_sse_data))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_key_in_middle_of_query_string() {
        let url = "https://api.example/v1beta/models/x:streamGenerateContent?alt=sse&key=SECRET123&foo=bar";
        let redacted = redact_url_key(url);
        assert!(!redacted.contains("SECRET123"));
        assert!(redacted.ends_with("&foo=bar"));
    }

    #[test]
    fn redacts_key_at_end_of_query_string() {
        let url = "https://api.example/x?key=SECRET123";
        assert_eq!(redact_url_key(url), "https://api.example/x?key=[REDACTED]");
    }

    #[test]
    fn content_part_extracted() {
        let data = r#"{"candidates":[{"content":{"parts":[{"text":"hi"}]}}]}"#;
        let events = parse_sse_data(data);
        assert!(matches!(&events[0], Ok(ChatChunk::Content { text }) if text == "hi"));
    }

    #[test]
    fn stop_finish_reason_normalized() {
        let data = r#"{"candidates":[{"content":{"parts":[]},"finishReason":"STOP"}]}"#;
        let events = parse_sse_data(data);
        assert!(matches!(&events[0], Ok(ChatChunk::End { finish_reason: Some(r) }) if r == "stop"));
    }
}
