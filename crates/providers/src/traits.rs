use sa_domain::error::Result;
use sa_domain::message::Message;
use sa_domain::stream::{BoxStream, ChatChunk};

/// Generation controls common to every provider. A provider maps these onto
/// whatever wire field its API actually uses (e.g. Provider-A's
/// `max_tokens` vs `max_completion_tokens` switch).
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub max_output_tokens: Option<u32>,
    /// Provider-B's extended-thinking mode: allocate a reasoning-token
    /// budget before producing the final output. Ignored by adapters that
    /// don't support it.
    pub extended_thinking: bool,
    pub temperature: Option<f32>,
}

/// Common streaming interface implemented by every provider adapter.
///
/// Credentials are a per-call argument, never a field baked into the
/// adapter at construction: the same `Arc<dyn LlmProvider>` serves requests
/// carrying inline keys, user-stored keys, and the process default alike.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Stream a chat completion. Returns a finite sequence of chunks
    /// terminated by `ChatChunk::End` or `ChatChunk::Error`.
    async fn stream_chat(
        &self,
        model: &str,
        messages: &[Message],
        options: &ChatOptions,
        api_key: &str,
    ) -> Result<BoxStream<'static, Result<ChatChunk>>>;

    /// The provider id this adapter was configured under (e.g. "provider-a").
    fn provider_id(&self) -> &str;
}
