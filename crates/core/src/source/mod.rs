//! Data sources queried for a candidate's cause of death.
//!
//! Every provider implements [`SourceProvider`]. The closed set of backends
//! is described by [`SourceDescriptor`]s and instantiated once by
//! [`SourceRegistry::from_descriptors`].

mod ai;
mod browser;
mod descriptor;
pub mod extract;
mod http;
mod news_api;
mod rate_limiter;
mod registry;
mod retry;
mod types;
mod wikidata;
mod wikipedia;

pub use ai::AiSource;
pub use browser::BrowserSource;
pub use descriptor::{SourceBackend, SourceDescriptor};
pub use news_api::NewsApiSource;
pub use rate_limiter::{RateLimiterPool, TokenBucket};
pub use registry::{ProviderDeps, RegisteredSource, SourceRegistry};
pub use retry::{with_backoff, RetryConfig};
pub use types::{
    CauseCandidate, FailureKind, SourceCategory, SourceError, SourceFailure, SourceFinding,
    SourceResult,
};
pub use wikidata::WikidataSource;
pub use wikipedia::WikipediaSource;

use async_trait::async_trait;

use crate::candidate::Candidate;

/// Per-call context handed to providers.
#[derive(Debug, Clone, Default)]
pub struct FetchContext {
    /// Model to use instead of the source's configured one (AI sources only).
    pub model_override: Option<String>,
}

/// A source of cause-of-death information.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Unique source id, matching its descriptor.
    fn id(&self) -> &str;

    fn category(&self) -> SourceCategory;

    /// Look the candidate up.
    ///
    /// `Ok(None)` means the source answered but knows nothing about the
    /// candidate.
    async fn fetch(
        &self,
        candidate: &Candidate,
        ctx: &FetchContext,
    ) -> Result<Option<SourceFinding>, SourceError>;
}
