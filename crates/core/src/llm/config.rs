//! LLM backend configuration.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{Dialect, HttpLlmClient, LlmClient, LlmError};

/// LLM provider type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Anthropic Claude API.
    Anthropic,
    /// OpenAI API (GPT models).
    OpenAi,
    /// Local Ollama instance, via its chat completions endpoint.
    Ollama,
    /// Custom HTTP endpoint (must be OpenAI-compatible).
    Custom,
}

/// LLM client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    /// Default model; runs may override it per source.
    pub model: String,
    /// API key (can reference env var with ${VAR_NAME}).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Custom API base URL (for proxies or self-hosted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    /// Maximum tokens for completions.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_timeout() -> u32 {
    30
}

fn default_max_tokens() -> u32 {
    512
}

/// Build a client for the configured provider.
pub fn build_client(config: &LlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    let api_key = config.api_key.clone().filter(|k| !k.is_empty());
    let mut client = match config.provider {
        LlmProvider::Anthropic => {
            let key = api_key
                .ok_or_else(|| LlmError::NotConfigured("anthropic requires api_key".into()))?;
            HttpLlmClient::anthropic(key, &config.model)
        }
        LlmProvider::OpenAi => {
            let key =
                api_key.ok_or_else(|| LlmError::NotConfigured("openai requires api_key".into()))?;
            HttpLlmClient::openai(key, &config.model)
        }
        LlmProvider::Ollama => HttpLlmClient::ollama(&config.model),
        LlmProvider::Custom => {
            let base = config
                .api_base
                .as_deref()
                .ok_or_else(|| LlmError::NotConfigured("custom provider requires api_base".into()))?;
            let client = HttpLlmClient::new("custom", Dialect::ChatCompletions, base, &config.model);
            match api_key {
                Some(key) => client.with_api_key(key),
                None => client,
            }
        }
    };
    if let Some(base) = &config.api_base {
        client = client.with_api_base(base);
    }
    Ok(Arc::new(client.with_timeout(Duration::from_secs(config.timeout_secs as u64))))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(provider: LlmProvider) -> LlmConfig {
        LlmConfig {
            provider,
            model: "m".to_string(),
            api_key: None,
            api_base: None,
            timeout_secs: 5,
            max_tokens: 100,
        }
    }

    #[test]
    fn test_anthropic_requires_key() {
        assert!(matches!(
            build_client(&config(LlmProvider::Anthropic)),
            Err(LlmError::NotConfigured(_))
        ));
        let mut with_key = config(LlmProvider::Anthropic);
        with_key.api_key = Some("sk-test".to_string());
        assert_eq!(build_client(&with_key).unwrap().provider(), "anthropic");
    }

    #[test]
    fn test_custom_requires_base() {
        assert!(build_client(&config(LlmProvider::Custom)).is_err());
        let mut with_base = config(LlmProvider::Custom);
        with_base.api_base = Some("http://localhost:8080".to_string());
        assert_eq!(build_client(&with_base).unwrap().provider(), "custom");
    }

    #[test]
    fn test_ollama_needs_nothing() {
        let client = build_client(&config(LlmProvider::Ollama)).unwrap();
        assert_eq!(client.provider(), "ollama");
        assert_eq!(client.model(), "m");
    }

    #[test]
    fn test_deserialize_defaults() {
        let parsed: LlmConfig = toml::from_str(
            r#"
            provider = "open_ai"
            model = "gpt-4o-mini"
            api_key = "${OPENAI_API_KEY}"
            "#,
        )
        .unwrap();
        assert_eq!(parsed.provider, LlmProvider::OpenAi);
        assert_eq!(parsed.timeout_secs, 30);
        assert_eq!(parsed.max_tokens, 512);
    }
}
