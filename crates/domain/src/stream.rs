use serde::{Deserialize, Serialize};
use std::pin::Pin;

/// A boxed async stream, used for provider streaming responses.
pub type BoxStream<'a, T> = Pin<Box<dyn futures_core::Stream<Item = T> + Send + 'a>>;

/// One unit emitted by a provider adapter's chat stream. A finite sequence
/// of these, always terminated by `End` or `Error`, carries one turn's
/// generation from adapter to orchestrator to transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChatChunk {
    /// A fragment of generated text.
    Content { text: String },

    /// Token accounting, typically emitted once near the end of a stream.
    Usage { usage: Usage },

    /// The stream has finished normally.
    End { finish_reason: Option<String> },

    /// The stream ended because of a provider-side error. Terminal, like
    /// `End` — no further chunks follow.
    Error { message: String },
}

/// Token usage for a completion.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub total_tokens: u32,
}
