mod database;
mod llm;
mod rate_limit;
mod security;
mod server;
mod transport;

pub use database::*;
pub use llm::*;
pub use rate_limit::*;
pub use security::*;
pub use server::*;
pub use transport::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub transport: TransportConfig,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Config validation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Severity level for a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Error,
    Warning,
}

/// A single configuration validation issue.
#[derive(Debug, Clone)]
pub struct ConfigError {
    pub severity: ConfigSeverity,
    pub field: String,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.severity {
            ConfigSeverity::Error => "ERROR",
            ConfigSeverity::Warning => "WARN",
        };
        write!(f, "[{tag}] {}: {}", self.field, self.message)
    }
}

impl Config {
    /// Validate the configuration and return a list of issues.
    ///
    /// This checks structural well-formedness only. It does NOT check
    /// whether `security.encryption_key_env` / `security.jwt_secret_env`
    /// actually resolve to a set environment variable — that check runs at
    /// startup (see the gateway binary), since it's a property of the
    /// process environment, not of the config file, and must be fatal
    /// rather than recorded as one issue among many.
    pub fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.port".into(),
                message: "port must be greater than 0".into(),
            });
        }

        if self.server.host.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "server.host".into(),
                message: "host must not be empty".into(),
            });
        }

        if self.database.path.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "database.path".into(),
                message: "database.path must not be empty".into(),
            });
        }

        if self.security.encryption_key_env.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "security.encryption_key_env".into(),
                message: "encryption_key_env must name an environment variable".into(),
            });
        }

        if self.security.jwt_secret_env.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "security.jwt_secret_env".into(),
                message: "jwt_secret_env must name an environment variable".into(),
            });
        }

        if self.llm.providers.is_empty() {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "llm.providers".into(),
                message: "no LLM providers configured".into(),
            });
        }

        let mut seen_ids: HashSet<&str> = HashSet::new();
        for (i, provider) in self.llm.providers.iter().enumerate() {
            if provider.id.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].id"),
                    message: "provider id must not be empty".into(),
                });
            }
            if provider.base_url.is_empty() {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: "provider base_url must not be empty".into(),
                });
            }
            if !provider.base_url.is_empty()
                && !provider.base_url.starts_with("http://")
                && !provider.base_url.starts_with("https://")
            {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("llm.providers[{i}].base_url"),
                    message: format!(
                        "base_url must start with http:// or https:// (got \"{}\")",
                        provider.base_url
                    ),
                });
            }
            if !provider.id.is_empty() && !seen_ids.insert(&provider.id) {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Warning,
                    field: format!("llm.providers[{i}].id"),
                    message: format!(
                        "duplicate provider id \"{}\" — later provider will shadow earlier one",
                        provider.id
                    ),
                });
            }
        }

        if self.server.cors.allowed_origins.len() == 1
            && self.server.cors.allowed_origins[0] == "*"
        {
            errors.push(ConfigError {
                severity: ConfigSeverity::Warning,
                field: "server.cors.allowed_origins".into(),
                message: "wildcard \"*\" allows all origins (not recommended for production)".into(),
            });
        }

        for (field, policy) in [
            ("rate_limit.auth", self.rate_limit.auth),
            ("rate_limit.chat", self.rate_limit.chat),
            ("rate_limit.file", self.rate_limit.file),
            ("rate_limit.general", self.rate_limit.general),
        ] {
            if policy.limit == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.limit"),
                    message: "limit must be greater than 0".into(),
                });
            }
            if policy.window_secs == 0 {
                errors.push(ConfigError {
                    severity: ConfigSeverity::Error,
                    field: format!("{field}.window_secs"),
                    message: "window_secs must be greater than 0".into(),
                });
            }
        }

        if self.transport.max_request_bytes == 0 {
            errors.push(ConfigError {
                severity: ConfigSeverity::Error,
                field: "transport.max_request_bytes".into(),
                message: "max_request_bytes must be greater than 0".into(),
            });
        }

        errors
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> Config {
        Config {
            llm: LlmConfig {
                providers: vec![ProviderConfig {
                    id: "provider-a".into(),
                    kind: ProviderKind::OpenaiCompat,
                    base_url: "https://api.provider-a.example/v1".into(),
                    default_model: Some("chat-standard".into()),
                    default_auth_env: Some("PROVIDER_A_API_KEY".into()),
                }],
                ..LlmConfig::default()
            },
            ..Config::default()
        }
    }

    fn find_issue<'a>(issues: &'a [ConfigError], field_prefix: &str) -> Option<&'a ConfigError> {
        issues.iter().find(|e| e.field.starts_with(field_prefix))
    }

    #[test]
    fn valid_config_has_no_errors() {
        let issues = valid_config().validate();
        let errors: Vec<_> = issues.iter().filter(|e| e.severity == ConfigSeverity::Error).collect();
        assert!(errors.is_empty(), "expected no errors, got: {errors:?}");
    }

    #[test]
    fn server_port_zero_is_error() {
        let mut cfg = valid_config();
        cfg.server.port = 0;
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "server.port").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_database_path_is_error() {
        let mut cfg = valid_config();
        cfg.database.path = String::new();
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "database.path").unwrap().severity, ConfigSeverity::Error);
    }

    #[test]
    fn empty_encryption_key_env_is_error() {
        let mut cfg = valid_config();
        cfg.security.encryption_key_env = String::new();
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "security.encryption_key_env").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn empty_jwt_secret_env_is_error() {
        let mut cfg = valid_config();
        cfg.security.jwt_secret_env = String::new();
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "security.jwt_secret_env").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn provider_base_url_invalid_scheme_is_error() {
        let mut cfg = valid_config();
        cfg.llm.providers[0].base_url = "ws://localhost:1234".into();
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "llm.providers[0].base_url").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn duplicate_provider_ids_is_warning() {
        let mut cfg = valid_config();
        let mut second = cfg.llm.providers[0].clone();
        second.default_auth_env = Some("PROVIDER_A_API_KEY_2".into());
        cfg.llm.providers.push(second);
        let issues = cfg.validate();
        let dup: Vec<_> = issues.iter().filter(|e| e.message.contains("duplicate provider id")).collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].severity, ConfigSeverity::Warning);
    }

    #[test]
    fn no_providers_is_warning() {
        let mut cfg = valid_config();
        cfg.llm.providers.clear();
        let issues = cfg.validate();
        assert_eq!(find_issue(&issues, "llm.providers").unwrap().severity, ConfigSeverity::Warning);
    }

    #[test]
    fn cors_wildcard_is_warning() {
        let mut cfg = valid_config();
        cfg.server.cors.allowed_origins = vec!["*".into()];
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "server.cors.allowed_origins").unwrap().severity,
            ConfigSeverity::Warning
        );
    }

    #[test]
    fn rate_limit_zero_limit_is_error() {
        let mut cfg = valid_config();
        cfg.rate_limit.chat.limit = 0;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "rate_limit.chat.limit").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn max_request_bytes_zero_is_error() {
        let mut cfg = valid_config();
        cfg.transport.max_request_bytes = 0;
        let issues = cfg.validate();
        assert_eq!(
            find_issue(&issues, "transport.max_request_bytes").unwrap().severity,
            ConfigSeverity::Error
        );
    }

    #[test]
    fn config_error_display_format() {
        let err = ConfigError {
            severity: ConfigSeverity::Error,
            field: "server.port".into(),
            message: "port must be greater than 0".into(),
        };
        assert_eq!(format!("{err}"), "[ERROR] server.port: port must be greater than 0");
    }
}
