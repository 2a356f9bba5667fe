//! Shared utility functions for provider adapters.

use sa_domain::error::Error;

/// True for OpenAI-style reasoning models, which reject `temperature` and
/// use `max_completion_tokens` instead of `max_tokens`.
pub(crate) fn is_reasoning_model(model: &str) -> bool {
    model.starts_with("o1") || model.starts_with("o3") || model.starts_with("gpt-5")
}

/// Redact API-key-shaped substrings from a message before it's logged or
/// returned to a client. Mirrors the provider registry's masking so a
/// stray key embedded in a provider error body never leaks.
pub fn mask_secrets(msg: &str) -> String {
    let mut out = String::with_capacity(msg.len());
    let mut token = String::new();

    let flush = |token: &mut String, out: &mut String| {
        if token.len() >= 20 {
            if token.len() > 8 {
                out.push_str(&token[..4]);
                out.push_str("...");
                out.push_str(&token[token.len() - 4..]);
            } else {
                out.push_str("***masked***");
            }
        } else {
            out.push_str(token);
        }
        token.clear();
    };

    for c in msg.chars() {
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            token.push(c);
        } else {
            flush(&mut token, &mut out);
            out.push(c);
        }
    }
    flush(&mut token, &mut out);
    out
}

/// Maps a provider not configured under the given id into the taxonomy.
/// Callers check this BEFORE any network call — an unknown provider name
/// must never reach an adapter.
pub fn provider_not_configured(provider: &str) -> Error {
    Error::InvalidInput(format!("provider not configured: {provider}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasoning_models_detected_by_prefix() {
        assert!(is_reasoning_model("o1-mini"));
        assert!(is_reasoning_model("o3"));
        assert!(is_reasoning_model("gpt-5-turbo"));
        assert!(!is_reasoning_model("gpt-4o"));
        assert!(!is_reasoning_model("chat-standard"));
    }

    #[test]
    fn mask_secrets_redacts_long_tokens() {
        let msg = "invalid key sk-abcdefghijklmnopqrstuvwxyz1234567890 rejected";
        let masked = mask_secrets(msg);
        assert!(!masked.contains("abcdefghijklmnopqrstuvwxyz"));
        assert!(masked.contains("..."));
    }

    #[test]
    fn mask_secrets_leaves_short_words_alone() {
        let msg = "model gpt-4o not found";
        assert_eq!(mask_secrets(msg), msg);
    }
}
