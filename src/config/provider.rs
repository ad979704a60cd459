//! LLM backend configuration

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of backend behind an OpenAI-compatible endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiType {
    /// Hosted OpenAI-compatible API
    OpenAi,
    /// Local LM Studio server (placeholder API key accepted)
    LmStudio,
}

/// Configuration for one LLM backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Backend kind
    #[serde(default = "default_api_type")]
    pub api_type: ApiType,
    /// Model to request
    #[serde(default = "default_model")]
    pub model: String,
    /// Base URL of the chat-completions API
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// API key
    #[serde(skip_serializing, default = "default_secret")]
    pub api_key: SecretString,
    /// Models to switch to, in order, when the current one is unavailable
    #[serde(default)]
    pub fallback_models: Vec<String>,
    /// Maximum fallback switches within one client lifetime
    #[serde(default = "default_max_fallback_attempts")]
    pub max_fallback_attempts: u32,
    /// Context window of the model
    #[serde(default = "default_context_length")]
    pub context_length: u32,
    /// Default sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Default completion token budget
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Retry attempts for transport failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Request timeout
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_api_type() -> ApiType {
    ApiType::OpenAi
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_secret() -> SecretString {
    SecretString::from(String::new())
}

fn default_max_fallback_attempts() -> u32 {
    3
}

fn default_context_length() -> u32 {
    8192
}

fn default_temperature() -> f32 {
    0.7
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_retries() -> u32 {
    4
}

fn default_timeout() -> Duration {
    Duration::from_secs(120)
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            api_type: default_api_type(),
            model: default_model(),
            api_base: default_api_base(),
            api_key: default_secret(),
            fallback_models: Vec::new(),
            max_fallback_attempts: default_max_fallback_attempts(),
            context_length: default_context_length(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            timeout: default_timeout(),
        }
    }
}

impl LlmConfig {
    /// Configuration for a local LM Studio server.
    pub fn lm_studio() -> Self {
        LlmConfig {
            api_type: ApiType::LmStudio,
            model: "local-model".to_string(),
            api_base: "http://localhost:1234/v1".to_string(),
            api_key: SecretString::from("lm-studio".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LlmConfig::default();
        assert_eq!(config.api_type, ApiType::OpenAi);
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.max_fallback_attempts, 3);
        assert!(config.fallback_models.is_empty());
    }

    #[test]
    fn test_lm_studio_preset() {
        let config = LlmConfig::lm_studio();
        assert_eq!(config.api_type, ApiType::LmStudio);
        assert!(config.api_base.contains("localhost"));
    }

    #[test]
    fn test_api_key_is_not_serialized() {
        let toml = toml::to_string(&LlmConfig::default()).unwrap();
        assert!(!toml.contains("api_key"));
    }
}
