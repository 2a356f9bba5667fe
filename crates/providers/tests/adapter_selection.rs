//! Cross-module contract: a mixed-kind `LlmConfig` produces a registry
//! whose lookups return the matching adapter, independent of provider id
//! casing or declaration order.

use sa_domain::config::{LlmConfig, ProviderConfig, ProviderKind};
use sa_providers::ProviderRegistry;

fn mixed_config() -> LlmConfig {
    LlmConfig {
        providers: vec![
            ProviderConfig {
                id: "Anthropic".into(),
                kind: ProviderKind::Anthropic,
                base_url: "https://api.anthropic.example/v1".into(),
                default_model: Some("claude-test".into()),
                default_auth_env: Some("SA_ANTHROPIC_KEY".into()),
            },
            ProviderConfig {
                id: "openai".into(),
                kind: ProviderKind::OpenaiCompat,
                base_url: "https://api.openai.example/v1".into(),
                default_model: None,
                default_auth_env: None,
            },
            ProviderConfig {
                id: "Google-Gemini".into(),
                kind: ProviderKind::Google,
                base_url: "https://generativelanguage.googleapis.com".into(),
                default_model: None,
                default_auth_env: None,
            },
        ],
    }
}

#[test]
fn every_configured_kind_is_reachable_by_id() {
    let registry = ProviderRegistry::from_config(&mixed_config()).unwrap();
    assert_eq!(registry.len(), 3);

    let anthropic = registry.get("anthropic").expect("anthropic adapter missing");
    assert_eq!(anthropic.provider_id(), "Anthropic");

    let openai = registry.get("OpenAI").expect("openai adapter missing");
    assert_eq!(openai.provider_id(), "openai");

    let google = registry.get("google-gemini").expect("google adapter missing");
    assert_eq!(google.provider_id(), "Google-Gemini");
}

#[test]
fn unconfigured_provider_resolves_to_none_regardless_of_casing() {
    let registry = ProviderRegistry::from_config(&mixed_config()).unwrap();
    assert!(registry.get("mistral").is_none());
    assert!(registry.get("MISTRAL").is_none());
}

#[test]
fn list_providers_is_stable_and_sorted_independent_of_declaration_order() {
    let registry = ProviderRegistry::from_config(&mixed_config()).unwrap();
    assert_eq!(
        registry.list_providers(),
        vec!["anthropic", "google-gemini", "openai"]
    );
}
