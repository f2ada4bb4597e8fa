//! Mock LLM client for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, LlmUsage};

/// Mock implementation of the LlmClient trait.
///
/// Responses are queued with [`push_response`](Self::push_response) and
/// handed out in order; an empty queue is an HTTP error.
///
/// # Example
///
/// ```rust,ignore
/// let client = Arc::new(MockLlmClient::new("claude-3-5-haiku-latest"));
/// client.push_response(r#"{"cause_of_death": "stroke", "confidence": 0.9}"#).await;
///
/// let source = AiSource::new("claude", SourceCategory::Ai, client.clone(), 256, retry);
/// source.fetch(&candidate, &FetchContext::default()).await?;
/// assert_eq!(client.recorded_requests().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockLlmClient {
    model: String,
    responses: Arc<RwLock<VecDeque<Result<String, LlmError>>>>,
    requests: Arc<RwLock<Vec<CompletionRequest>>>,
}

impl MockLlmClient {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            responses: Arc::new(RwLock::new(VecDeque::new())),
            requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub async fn push_response(&self, text: &str) {
        self.responses.write().await.push_back(Ok(text.to_string()));
    }

    pub async fn push_error(&self, error: LlmError) {
        self.responses.write().await.push_back(Err(error));
    }

    pub async fn recorded_requests(&self) -> Vec<CompletionRequest> {
        self.requests.read().await.clone()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    fn provider(&self) -> &str {
        "mock"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let model = request.model.clone().unwrap_or_else(|| self.model.clone());
        let input_tokens = (request.prompt.len() / 4) as u32;
        self.requests.write().await.push(request);

        let text = self
            .responses
            .write()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::Http("no mock response queued".to_string())))?;
        Ok(CompletionResponse {
            usage: LlmUsage {
                input_tokens,
                output_tokens: (text.len() / 4) as u32,
            },
            text,
            model,
        })
    }
}
