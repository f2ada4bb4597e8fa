//! Completion clients for the models behind AI sources.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("JSON error: {0}")]
    Json(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Not configured: {0}")]
    NotConfigured(String),
}

/// Tokens billed for one completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// One extraction prompt. Sampling is always greedy.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
    /// Model to use instead of the client's default.
    pub model: Option<String>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
            model: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_model(mut self, model: Option<String>) -> Self {
        self.model = model;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub text: String,
    pub usage: LlmUsage,
    /// Model that actually answered.
    pub model: String,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider label used in logs and metrics.
    fn provider(&self) -> &str;

    /// Default model.
    fn model(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Request/response shape an endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Anthropic Messages API.
    Messages,
    /// Chat completions, served by OpenAI, Ollama and most proxies.
    ChatCompletions,
}

impl Dialect {
    fn path(&self) -> &'static str {
        match self {
            Dialect::Messages => "/v1/messages",
            Dialect::ChatCompletions => "/v1/chat/completions",
        }
    }

    fn body(&self, model: &str, request: &CompletionRequest) -> Value {
        match self {
            Dialect::Messages => {
                let mut body = json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": 0.0,
                    "messages": [{ "role": "user", "content": request.prompt }],
                });
                if let Some(system) = &request.system {
                    body["system"] = json!(system);
                }
                body
            }
            Dialect::ChatCompletions => {
                let mut messages = Vec::with_capacity(2);
                if let Some(system) = &request.system {
                    messages.push(json!({ "role": "system", "content": system }));
                }
                messages.push(json!({ "role": "user", "content": request.prompt }));
                json!({
                    "model": model,
                    "max_tokens": request.max_tokens,
                    "temperature": 0.0,
                    "messages": messages,
                })
            }
        }
    }

    fn parse(&self, body: &Value, requested_model: &str) -> Result<CompletionResponse, LlmError> {
        let model = body["model"]
            .as_str()
            .unwrap_or(requested_model)
            .to_string();
        let tokens = |key: &str| body["usage"][key].as_u64().unwrap_or(0) as u32;
        match self {
            Dialect::Messages => {
                let blocks = body["content"]
                    .as_array()
                    .ok_or_else(|| LlmError::Json("response has no content blocks".into()))?;
                let text = blocks
                    .iter()
                    .filter(|b| b["type"] == "text")
                    .filter_map(|b| b["text"].as_str())
                    .collect::<String>();
                Ok(CompletionResponse {
                    text,
                    usage: LlmUsage {
                        input_tokens: tokens("input_tokens"),
                        output_tokens: tokens("output_tokens"),
                    },
                    model,
                })
            }
            Dialect::ChatCompletions => {
                let choice = body["choices"]
                    .get(0)
                    .ok_or_else(|| LlmError::Json("response has no choices".into()))?;
                Ok(CompletionResponse {
                    text: choice["message"]["content"]
                        .as_str()
                        .unwrap_or_default()
                        .to_string(),
                    usage: LlmUsage {
                        input_tokens: tokens("prompt_tokens"),
                        output_tokens: tokens("completion_tokens"),
                    },
                    model,
                })
            }
        }
    }
}

/// Pull a readable message out of an error body.
///
/// Handles `{"error": {"message": ..}}` (Anthropic, OpenAI) and
/// `{"error": ".."}` (Ollama); anything else is returned as is.
fn error_message(text: &str) -> String {
    let Ok(body) = serde_json::from_str::<Value>(text) else {
        return text.to_string();
    };
    body["error"]["message"]
        .as_str()
        .or_else(|| body["error"].as_str())
        .map(str::to_string)
        .unwrap_or_else(|| text.to_string())
}

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// A model endpoint reached over HTTP.
pub struct HttpLlmClient {
    provider: String,
    dialect: Dialect,
    api_base: String,
    api_key: Option<String>,
    model: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl HttpLlmClient {
    pub fn new(
        provider: impl Into<String>,
        dialect: Dialect,
        api_base: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            dialect,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key: None,
            model: model.into(),
            timeout: DEFAULT_TIMEOUT,
            client: http_client(DEFAULT_TIMEOUT),
        }
    }

    pub fn anthropic(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("anthropic", Dialect::Messages, "https://api.anthropic.com", model)
            .with_api_key(api_key)
    }

    pub fn openai(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self::new("openai", Dialect::ChatCompletions, "https://api.openai.com", model)
            .with_api_key(api_key)
    }

    /// Local Ollama server through its chat completions endpoint.
    pub fn ollama(model: impl Into<String>) -> Self {
        Self::new("ollama", Dialect::ChatCompletions, "http://localhost:11434", model)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into()).filter(|k| !k.is_empty());
        self
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self.client = http_client(timeout);
        self
    }

    fn endpoint(&self) -> String {
        format!("{}{}", self.api_base, self.dialect.path())
    }

    fn transport_error(&self, e: reqwest::Error) -> LlmError {
        if e.is_timeout() {
            LlmError::Timeout(self.timeout)
        } else {
            LlmError::Http(e.to_string())
        }
    }
}

fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.as_deref().unwrap_or(&self.model);
        let mut builder = self
            .client
            .post(self.endpoint())
            .json(&self.dialect.body(model, &request));
        builder = match (self.dialect, &self.api_key) {
            (Dialect::Messages, Some(key)) => builder
                .header("x-api-key", key)
                .header("anthropic-version", "2023-06-01"),
            (Dialect::ChatCompletions, Some(key)) => builder.bearer_auth(key),
            (_, None) => builder,
        };

        let response = builder.send().await.map_err(|e| self.transport_error(e))?;
        let status = response.status();
        let text = response.text().await.map_err(|e| self.transport_error(e))?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: error_message(&text),
            });
        }

        let body: Value = serde_json::from_str(&text).map_err(|e| LlmError::Json(e.to_string()))?;
        self.dialect.parse(&body, model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> CompletionRequest {
        CompletionRequest::new("Who was Jane Doe?")
            .with_system("Answer in JSON")
            .with_max_tokens(256)
    }

    #[test]
    fn test_messages_body_keeps_system_separate() {
        let body = Dialect::Messages.body("claude-3-5-haiku-latest", &request());
        assert_eq!(body["model"], "claude-3-5-haiku-latest");
        assert_eq!(body["system"], "Answer in JSON");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["content"], "Who was Jane Doe?");
    }

    #[test]
    fn test_chat_body_puts_system_first() {
        let body = Dialect::ChatCompletions.body("gpt-4o-mini", &CompletionRequest::new("hi"));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);

        let body = Dialect::ChatCompletions.body("gpt-4o-mini", &request());
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
    }

    #[test]
    fn test_parse_messages_response() {
        let body = json!({
            "model": "claude-3-5-haiku-20241022",
            "content": [
                { "type": "text", "text": "{\"cause_of_death\":" },
                { "type": "tool_use", "id": "x" },
                { "type": "text", "text": " null}" }
            ],
            "usage": { "input_tokens": 120, "output_tokens": 9 }
        });
        let response = Dialect::Messages.parse(&body, "claude").unwrap();
        assert_eq!(response.text, "{\"cause_of_death\": null}");
        assert_eq!(response.model, "claude-3-5-haiku-20241022");
        assert_eq!(response.usage.input_tokens, 120);
        assert_eq!(response.usage.output_tokens, 9);
    }

    #[test]
    fn test_parse_chat_response_without_usage() {
        let body = json!({ "choices": [{ "message": { "content": "{}" } }] });
        let response = Dialect::ChatCompletions.parse(&body, "llama3").unwrap();
        assert_eq!(response.text, "{}");
        assert_eq!(response.model, "llama3");
        assert_eq!(response.usage.input_tokens, 0);

        assert!(matches!(
            Dialect::ChatCompletions.parse(&json!({ "choices": [] }), "llama3"),
            Err(LlmError::Json(_))
        ));
    }

    #[test]
    fn test_error_message_shapes() {
        assert_eq!(
            error_message(r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#),
            "Overloaded"
        );
        assert_eq!(error_message(r#"{"error":"model 'llama9' not found"}"#), "model 'llama9' not found");
        assert_eq!(error_message("Bad Gateway"), "Bad Gateway");
    }

    #[test]
    fn test_client_endpoints() {
        let ollama = HttpLlmClient::ollama("llama3").with_api_base("http://gpu-box:11434/");
        assert_eq!(ollama.provider(), "ollama");
        assert_eq!(ollama.model(), "llama3");
        assert_eq!(ollama.endpoint(), "http://gpu-box:11434/v1/chat/completions");
        assert!(ollama.api_key.is_none());

        let anthropic = HttpLlmClient::anthropic("key", "claude-3-5-haiku-latest");
        assert_eq!(anthropic.endpoint(), "https://api.anthropic.com/v1/messages");

        let openai = HttpLlmClient::openai("", "gpt-4o-mini");
        assert!(openai.api_key.is_none());
    }
}
