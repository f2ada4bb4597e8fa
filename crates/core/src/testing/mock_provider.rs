//! Mock source provider for testing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::candidate::Candidate;
use crate::source::{
    CauseCandidate, FetchContext, SourceCategory, SourceError, SourceFinding, SourceProvider,
};

type ErrorFactory = Box<dyn Fn() -> SourceError + Send + Sync>;

enum Outcome {
    Found(SourceFinding),
    NotFound,
    Fail(ErrorFactory),
}

/// Mock implementation of the SourceProvider trait.
///
/// Provides controllable behavior for testing:
/// - Return a fixed finding, nothing, or an error
/// - Simulate slow sources
/// - Count calls and record model overrides
///
/// # Example
///
/// ```rust,ignore
/// use mortem_core::testing::MockProvider;
///
/// let provider = Arc::new(MockProvider::found("wikidata", "stroke", 0.9));
/// registry.register(descriptor, provider.clone())?;
///
/// orchestrator.run(candidates, &config).await?;
/// assert_eq!(provider.call_count(), 1);
/// ```
pub struct MockProvider {
    id: String,
    category: SourceCategory,
    outcome: Outcome,
    delay: Option<Duration>,
    calls: AtomicUsize,
    model_overrides: Mutex<Vec<Option<String>>>,
}

impl MockProvider {
    fn with_outcome(id: &str, outcome: Outcome) -> Self {
        Self {
            id: id.to_string(),
            category: SourceCategory::Free,
            outcome,
            delay: None,
            calls: AtomicUsize::new(0),
            model_overrides: Mutex::new(Vec::new()),
        }
    }

    /// A provider that always reports `cause` with `confidence`.
    pub fn found(id: &str, cause: &str, confidence: f64) -> Self {
        let finding = SourceFinding {
            cause: Some(cause.to_string()),
            confidence,
            alternatives: vec![CauseCandidate::new(cause, confidence)],
            payload: format!(r#"{{"cause":"{}"}}"#, cause),
            url: Some(format!("https://{}.test/{}", id, cause.replace(' ', "-"))),
        };
        Self::with_outcome(id, Outcome::Found(finding))
    }

    /// A provider that always returns `finding` as-is.
    pub fn returning(id: &str, finding: SourceFinding) -> Self {
        Self::with_outcome(id, Outcome::Found(finding))
    }

    /// A provider that answers but knows nothing.
    pub fn not_found(id: &str) -> Self {
        Self::with_outcome(id, Outcome::NotFound)
    }

    /// A provider whose every call fails with the error built by `error`.
    pub fn failing<F>(id: &str, error: F) -> Self
    where
        F: Fn() -> SourceError + Send + Sync + 'static,
    {
        Self::with_outcome(id, Outcome::Fail(Box::new(error)))
    }

    pub fn with_category(mut self, category: SourceCategory) -> Self {
        self.category = category;
        self
    }

    /// Sleep before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of fetches started.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// `model_override` of every fetch, in call order.
    pub fn model_overrides(&self) -> Vec<Option<String>> {
        self.model_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl SourceProvider for MockProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn category(&self) -> SourceCategory {
        self.category
    }

    async fn fetch(
        &self,
        _candidate: &Candidate,
        ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.model_overrides
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ctx.model_override.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Outcome::Found(finding) => Ok(Some(finding.clone())),
            Outcome::NotFound => Ok(None),
            Outcome::Fail(error) => Err(error()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_provider_records_calls() {
        let provider = MockProvider::found("wiki", "heart attack", 0.7);
        let ctx = FetchContext {
            model_override: Some("big".to_string()),
        };
        let finding = provider
            .fetch(&Candidate::new("c1", "Jane Doe"), &ctx)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(finding.cause.as_deref(), Some("heart attack"));
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.model_overrides(), vec![Some("big".to_string())]);
    }

    #[tokio::test]
    async fn test_mock_provider_failure() {
        let provider = MockProvider::failing("x", || SourceError::Http("boom".into()));
        let result = provider
            .fetch(&Candidate::new("c1", "Jane Doe"), &FetchContext::default())
            .await;
        assert!(matches!(result, Err(SourceError::Http(_))));
    }
}
