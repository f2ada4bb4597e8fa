//! AI extraction source.
//!
//! Asks a language model for the cause of death and routes the raw answer
//! through the response parser. Anything the parser rejects is a failed
//! fetch, never a guess.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::retry::{with_backoff, RetryConfig};
use super::{FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider};
use crate::candidate::Candidate;
use crate::llm::{CompletionRequest, LlmClient, LlmError};
use crate::parser;

const SYSTEM_PROMPT: &str = "You are a careful research assistant. You report the documented \
cause of death of public figures. Answer only with a JSON object of the form \
{\"cause_of_death\": string or null, \"confidence\": number between 0 and 1, \
\"details\": string or null, \"sources\": [string]}. Use null when the cause \
was never made public or you are not sure. Do not guess.";

pub struct AiSource {
    id: String,
    category: SourceCategory,
    client: Arc<dyn LlmClient>,
    max_tokens: u32,
    retry: RetryConfig,
}

impl AiSource {
    pub fn new(
        id: impl Into<String>,
        category: SourceCategory,
        client: Arc<dyn LlmClient>,
        max_tokens: u32,
        retry: RetryConfig,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            client,
            max_tokens,
            retry,
        }
    }
}

/// Describe the person precisely enough to disambiguate namesakes.
pub(crate) fn build_prompt(candidate: &Candidate) -> String {
    let mut prompt = format!("What was the cause of death of {}", candidate.name.trim());
    match (candidate.birth_date, candidate.death_date) {
        (Some(born), Some(died)) => {
            prompt.push_str(&format!(" (born {}, died {})", born, died));
        }
        (None, Some(died)) => prompt.push_str(&format!(" (died {})", died)),
        (Some(born), None) => prompt.push_str(&format!(" (born {})", born)),
        (None, None) => {}
    }
    prompt.push('?');
    prompt
}

impl From<LlmError> for SourceError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(d) => SourceError::Timeout(d),
            LlmError::Api { status, message } if status == 401 || status == 403 => {
                SourceError::Authentication(message)
            }
            LlmError::Api { status, message } => SourceError::Api { status, message },
            LlmError::Http(msg) => SourceError::Connection(msg),
            LlmError::Json(msg) => SourceError::MalformedResponse(msg),
            LlmError::NotConfigured(msg) => SourceError::NotConfigured(msg),
        }
    }
}

#[async_trait]
impl SourceProvider for AiSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn fetch(
        &self,
        candidate: &Candidate,
        ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError> {
        let request = CompletionRequest::new(build_prompt(candidate))
            .with_system(SYSTEM_PROMPT)
            .with_max_tokens(self.max_tokens)
            .with_model(ctx.model_override.clone());
        let model = request
            .model
            .clone()
            .unwrap_or_else(|| self.client.model().to_string());
        debug!(source = %self.id, model = %model, candidate = %candidate.id, "Querying model");

        let request = &request;
        let response = with_backoff(&self.retry, &self.id, || async move {
            self.client
                .complete(request.clone())
                .await
                .map_err(SourceError::from)
        })
        .await?;

        let provider = self.client.provider();
        crate::metrics::LLM_TOKENS
            .with_label_values(&[provider, "input"])
            .inc_by(u64::from(response.usage.input_tokens));
        crate::metrics::LLM_TOKENS
            .with_label_values(&[provider, "output"])
            .inc_by(u64::from(response.usage.output_tokens));

        let parsed = match parser::parse(&response.text) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(
                    source = %self.id,
                    candidate = %candidate.id,
                    error = %e,
                    payload = %response.text,
                    "Rejected model output"
                );
                return Err(e.into());
            }
        };

        let Some(cause) = parsed.cause_of_death.filter(|c| !c.is_empty()) else {
            return Ok(None);
        };
        let url = parsed
            .sources
            .iter()
            .find(|s| s.starts_with("http://") || s.starts_with("https://"))
            .cloned();

        Ok(Some(SourceFinding {
            cause: Some(cause),
            confidence: parsed.confidence,
            alternatives: Vec::new(),
            payload: response.text,
            url,
        }))
    }
}
