//! Provider registry.
//!
//! Constructs and holds all configured provider adapter instances. Lookup
//! is by exact provider id, case-insensitively, and never touches the
//! network — an unknown id is rejected before any adapter is invoked.

use std::collections::HashMap;
use std::sync::Arc;

use sa_domain::config::{LlmConfig, ProviderKind};
use sa_domain::error::Result;

use crate::provider_a::OpenAiCompatProvider;
use crate::provider_b::AnthropicProvider;
use crate::provider_c::GoogleProvider;
use crate::traits::LlmProvider;

pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let mut providers = HashMap::new();
        for pc in &config.providers {
            let provider: Arc<dyn LlmProvider> = match pc.kind {
                ProviderKind::OpenaiCompat => Arc::new(OpenAiCompatProvider::from_config(pc)?),
                ProviderKind::Anthropic => Arc::new(AnthropicProvider::from_config(pc)?),
                ProviderKind::Google => Arc::new(GoogleProvider::from_config(pc)?),
            };
            providers.insert(pc.id.to_lowercase(), provider);
        }
        Ok(Self { providers })
    }

    /// Case-insensitive lookup by provider id. `None` means "not
    /// configured" — callers must turn this into an `invalid_input` error
    /// before attempting any network call.
    pub fn get(&self, provider_id: &str) -> Option<Arc<dyn LlmProvider>> {
        self.providers.get(&provider_id.to_lowercase()).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn list_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.providers.keys().cloned().collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sa_domain::config::ProviderConfig;

    #[test]
    fn empty_config_yields_empty_registry() {
        let reg = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        assert!(reg.is_empty());
        assert!(reg.get("provider-a").is_none());
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let cfg = LlmConfig {
            providers: vec![ProviderConfig {
                id: "Provider-A".into(),
                kind: ProviderKind::OpenaiCompat,
                base_url: "https://api.provider-a.example/v1".into(),
                default_model: None,
                default_auth_env: None,
            }],
        };
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert!(reg.get("provider-a").is_some());
        assert!(reg.get("PROVIDER-A").is_some());
        assert!(reg.get("provider-z").is_none());
    }

    #[test]
    fn list_providers_is_sorted() {
        let cfg = LlmConfig {
            providers: vec![
                ProviderConfig {
                    id: "provider-c".into(),
                    kind: ProviderKind::Google,
                    base_url: "https://generativelanguage.googleapis.com".into(),
                    default_model: None,
                    default_auth_env: None,
                },
                ProviderConfig {
                    id: "provider-a".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.provider-a.example/v1".into(),
                    default_model: None,
                    default_auth_env: None,
                },
            ],
        };
        let reg = ProviderRegistry::from_config(&cfg).unwrap();
        assert_eq!(reg.list_providers(), vec!["provider-a", "provider-c"]);
    }
}
