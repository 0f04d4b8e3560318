pub mod chat;
pub mod discovery;

use reqwest::StatusCode;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434/v1";
pub const DEFAULT_API_KEY: &str = "ollama";

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
        }
    }
}

impl LlmConfig {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    /// `route` appended to the base URL with exactly one slash between them.
    pub fn endpoint(&self, route: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), route.trim_start_matches('/'))
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Request to provider failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("Could not decode provider response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Provider response contained no choices")]
    EmptyResponse,

    #[error("Provider reported an error mid-stream: {0}")]
    Stream(String),

    #[error("Invalid API key format: {0}")]
    InvalidApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_with_single_slash() {
        let config = LlmConfig::new("http://localhost:11434/v1/", "k");
        assert_eq!(config.endpoint("/chat/completions"), "http://localhost:11434/v1/chat/completions");
        assert_eq!(LlmConfig::default().endpoint("models"), "http://localhost:11434/v1/models");
    }
}
