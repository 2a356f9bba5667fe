use serde::{Deserialize, Serialize};

/// The three fixed providers the gateway knows how to speak to. Selection
/// is always by exact `id`, not by kind — `kind` only picks which wire
/// protocol adapter to instantiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI-compatible chat completions (reasoning-model param switch).
    OpenaiCompat,
    /// Anthropic-style messages API (extended thinking).
    Anthropic,
    /// Google Gemini-style generateContent/streamGenerateContent API.
    Google,
}

/// One configured provider adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub base_url: String,
    #[serde(default)]
    pub default_model: Option<String>,
    /// Process-wide default credential source, used only when a request
    /// carries no inline key and the user has no stored key for this
    /// provider. Absent means this provider has no fallback.
    #[serde(default)]
    pub default_auth_env: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct LlmConfig {
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_config_round_trips_through_json() {
        let p = ProviderConfig {
            id: "provider-a".into(),
            kind: ProviderKind::OpenaiCompat,
            base_url: "https://api.provider-a.example/v1".into(),
            default_model: Some("chat-standard".into()),
            default_auth_env: Some("PROVIDER_A_API_KEY".into()),
        };
        let json = serde_json::to_string(&p).unwrap();
        let back: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, p.id);
        assert_eq!(back.kind, ProviderKind::OpenaiCompat);
    }
}
