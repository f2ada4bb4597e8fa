//! Startup-time instantiation of configured sources.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{
    AiSource, BrowserSource, NewsApiSource, RateLimiterPool, RetryConfig, SourceBackend,
    SourceDescriptor, SourceError, SourceProvider, WikidataSource, WikipediaSource,
};
use crate::browser::SessionManager;
use crate::config::ConfigError;
use crate::llm::{build_client, LlmConfig};

/// Shared resources handed to providers at construction.
#[derive(Clone, Default)]
pub struct ProviderDeps {
    pub retry: RetryConfig,
    /// Required by `browser` backends.
    pub sessions: Option<Arc<SessionManager>>,
}

/// A provider together with the descriptor it was built from.
#[derive(Clone)]
pub struct RegisteredSource {
    pub descriptor: SourceDescriptor,
    pub provider: Arc<dyn SourceProvider>,
}

/// Every source known to the process, in configured order.
pub struct SourceRegistry {
    sources: Vec<RegisteredSource>,
    rate_limiter: RateLimiterPool,
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            rate_limiter: RateLimiterPool::empty(),
        }
    }

    /// Build one provider per descriptor.
    pub fn from_descriptors(
        descriptors: &[SourceDescriptor],
        deps: &ProviderDeps,
    ) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for descriptor in descriptors {
            let provider = build_provider(descriptor, deps).map_err(|e| {
                ConfigError::ValidationError(format!("source {}: {}", descriptor.id, e))
            })?;
            registry.register(descriptor.clone(), provider)?;
        }
        info!(sources = registry.len(), "Source registry ready");
        Ok(registry)
    }

    /// Add a provider. Ids must be unique and match the descriptor.
    pub fn register(
        &mut self,
        descriptor: SourceDescriptor,
        provider: Arc<dyn SourceProvider>,
    ) -> Result<(), ConfigError> {
        if provider.id() != descriptor.id {
            return Err(ConfigError::ValidationError(format!(
                "provider id {} does not match descriptor id {}",
                provider.id(),
                descriptor.id
            )));
        }
        if self.get(&descriptor.id).is_some() {
            return Err(ConfigError::ValidationError(format!(
                "duplicate source id {}",
                descriptor.id
            )));
        }
        self.sources.push(RegisteredSource {
            descriptor,
            provider,
        });
        self.rate_limiter = RateLimiterPool::new(self.sources.iter().filter_map(|s| {
            s.descriptor
                .rate_limit_rpm
                .map(|rpm| (s.descriptor.id.as_str(), rpm))
        }));
        Ok(())
    }

    pub fn entries(&self) -> &[RegisteredSource] {
        &self.sources
    }

    pub fn get(&self, id: &str) -> Option<&RegisteredSource> {
        self.sources.iter().find(|s| s.descriptor.id == id)
    }

    pub fn rate_limiter(&self) -> &RateLimiterPool {
        &self.rate_limiter
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

fn build_provider(
    descriptor: &SourceDescriptor,
    deps: &ProviderDeps,
) -> Result<Arc<dyn SourceProvider>, SourceError> {
    let id = descriptor.id.clone();
    let category = descriptor.category();
    let timeout = Duration::from_secs(descriptor.timeout_secs);
    let retry = deps.retry.clone();

    let provider: Arc<dyn SourceProvider> = match &descriptor.backend {
        SourceBackend::Wikidata { endpoint } => Arc::new(WikidataSource::new(
            id,
            category,
            endpoint.clone(),
            timeout,
            retry,
        )?),
        SourceBackend::Wikipedia { api_base } => Arc::new(WikipediaSource::new(
            id,
            category,
            api_base.clone(),
            timeout,
            retry,
        )?),
        SourceBackend::NewsApi {
            api_key,
            endpoint,
            window_days,
        } => Arc::new(NewsApiSource::new(
            id,
            category,
            endpoint.clone(),
            api_key.clone(),
            *window_days,
            timeout,
            retry,
        )?),
        SourceBackend::Llm {
            provider,
            model,
            api_key,
            api_base,
            max_tokens,
        } => {
            let client = build_client(&LlmConfig {
                provider: *provider,
                model: model.clone(),
                api_key: api_key.clone(),
                api_base: api_base.clone(),
                timeout_secs: descriptor.timeout_secs.min(u64::from(u32::MAX)) as u32,
                max_tokens: *max_tokens,
            })
            .map_err(|e| SourceError::NotConfigured(e.to_string()))?;
            Arc::new(AiSource::new(id, category, client, *max_tokens, retry))
        }
        SourceBackend::Browser { site, search_url } => {
            let sessions = deps.sessions.clone().ok_or_else(|| {
                SourceError::NotConfigured("browser sources need the [browser] section".into())
            })?;
            if !sessions.has_site(site) {
                return Err(SourceError::NotConfigured(format!(
                    "no login handler for site {}",
                    site
                )));
            }
            Arc::new(BrowserSource::new(
                id,
                category,
                site.clone(),
                search_url.clone(),
                sessions,
            ))
        }
    };
    Ok(provider)
}
