use serde::{Deserialize, Serialize};

/// Location of the single relational store backing users, credentials,
/// sessions, and messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: d_path() }
    }
}

fn d_path() -> String {
    "./data/gateway.db".into()
}
