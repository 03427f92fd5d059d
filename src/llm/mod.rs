pub mod chat;

use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama3-8b-8192";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("upstream API key is not configured")]
    MissingApiKey,
    #[error("upstream request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },
    #[error("upstream stream error: {0}")]
    Stream(String),
}

/// Raw upstream bytes, in the order the provider produced them.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            completion_model: None,
            base_url: None,
        }
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        self.completion_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_groq() {
        let config = LlmConfig::default();
        assert_eq!(config.model(), "llama3-8b-8192");
        assert_eq!(config.base_url(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn overrides_win_over_defaults() {
        let config = LlmConfig {
            api_key: Some("k".into()),
            completion_model: Some("llama-3.1-8b-instant".into()),
            base_url: Some("http://localhost:9000/v1".into()),
        };
        assert_eq!(config.model(), "llama-3.1-8b-instant");
        assert_eq!(config.base_url(), "http://localhost:9000/v1");
    }
}
