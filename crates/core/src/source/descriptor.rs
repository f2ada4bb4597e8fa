//! Static source configuration, loaded once at startup.

use serde::{Deserialize, Serialize};

use super::SourceCategory;
use crate::llm::LlmProvider;

/// One configured data source.
///
/// ```toml
/// [[sources]]
/// id = "wikidata"
/// backend = "wikidata"
/// priority = 10
/// rate_limit_rpm = 30
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source identifier.
    pub id: String,
    /// Category override; defaults from the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<SourceCategory>,
    /// Order within the category (lower first).
    #[serde(default)]
    pub priority: i32,
    /// Whether the source is used when a run does not say otherwise.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Requests per minute; unlimited when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit_rpm: Option<u32>,
    /// Budget for one fetch, including rate-limit wait and retries.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(flatten)]
    pub backend: SourceBackend,
}

fn default_enabled() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

/// The closed set of provider implementations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum SourceBackend {
    /// Wikidata SPARQL endpoint (cause of death property P509).
    Wikidata {
        #[serde(default = "default_wikidata_endpoint")]
        endpoint: String,
    },
    /// Wikipedia article extracts.
    Wikipedia {
        #[serde(default = "default_wikipedia_api")]
        api_base: String,
    },
    /// Paid news search API.
    NewsApi {
        api_key: String,
        #[serde(default = "default_news_endpoint")]
        endpoint: String,
        /// Days after the death date searched for coverage.
        #[serde(default = "default_news_window_days")]
        window_days: u32,
    },
    /// Language model extraction.
    Llm {
        provider: LlmProvider,
        model: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_key: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        api_base: Option<String>,
        #[serde(default = "default_llm_max_tokens")]
        max_tokens: u32,
    },
    /// Authenticated site search through the browser subsystem.
    Browser {
        /// Site id with a login handler and credentials.
        site: String,
        /// Search URL; `{name}` and `{death_year}` are substituted.
        search_url: String,
    },
}

fn default_wikidata_endpoint() -> String {
    "https://query.wikidata.org/sparql".to_string()
}

fn default_wikipedia_api() -> String {
    "https://en.wikipedia.org/w/api.php".to_string()
}

fn default_news_endpoint() -> String {
    "https://newsapi.org/v2/everything".to_string()
}

fn default_news_window_days() -> u32 {
    14
}

fn default_llm_max_tokens() -> u32 {
    512
}

impl SourceBackend {
    pub fn name(&self) -> &'static str {
        match self {
            SourceBackend::Wikidata { .. } => "wikidata",
            SourceBackend::Wikipedia { .. } => "wikipedia",
            SourceBackend::NewsApi { .. } => "news_api",
            SourceBackend::Llm { .. } => "llm",
            SourceBackend::Browser { .. } => "browser",
        }
    }

    pub fn default_category(&self) -> SourceCategory {
        match self {
            SourceBackend::Wikidata { .. } | SourceBackend::Wikipedia { .. } => {
                SourceCategory::Free
            }
            SourceBackend::NewsApi { .. } | SourceBackend::Browser { .. } => SourceCategory::Paid,
            SourceBackend::Llm { .. } => SourceCategory::Ai,
        }
    }
}

impl SourceDescriptor {
    pub fn new(id: impl Into<String>, backend: SourceBackend) -> Self {
        Self {
            id: id.into(),
            category: None,
            priority: 0,
            enabled: true,
            rate_limit_rpm: None,
            timeout_secs: default_timeout_secs(),
            backend,
        }
    }

    pub fn with_category(mut self, category: SourceCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_rate_limit_rpm(mut self, rpm: u32) -> Self {
        self.rate_limit_rpm = Some(rpm);
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    /// Effective category (override, else backend default).
    pub fn category(&self) -> SourceCategory {
        self.category
            .unwrap_or_else(|| self.backend.default_category())
    }

    /// Model identifier for AI sources.
    pub fn model(&self) -> Option<&str> {
        match &self.backend {
            SourceBackend::Llm { model, .. } => Some(model),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Sources {
        sources: Vec<SourceDescriptor>,
    }

    #[test]
    fn test_parse_descriptors_from_toml() {
        let parsed: Sources = toml::from_str(
            r#"
            [[sources]]
            id = "wikidata"
            backend = "wikidata"
            priority = 1
            rate_limit_rpm = 30

            [[sources]]
            id = "claude"
            backend = "llm"
            provider = "anthropic"
            model = "claude-3-5-haiku-latest"
            api_key = "${ANTHROPIC_API_KEY}"

            [[sources]]
            id = "newspapers"
            backend = "browser"
            site = "newspapers"
            search_url = "https://www.newspapers.com/search/?query={name}&dr_year={death_year}"
            enabled = false
            "#,
        )
        .unwrap();

        let wikidata = &parsed.sources[0];
        assert_eq!(wikidata.category(), SourceCategory::Free);
        assert_eq!(wikidata.rate_limit_rpm, Some(30));
        assert_eq!(wikidata.timeout_secs, 30);
        assert!(matches!(
            &wikidata.backend,
            SourceBackend::Wikidata { endpoint } if endpoint.contains("query.wikidata.org")
        ));

        let claude = &parsed.sources[1];
        assert_eq!(claude.category(), SourceCategory::Ai);
        assert_eq!(claude.model(), Some("claude-3-5-haiku-latest"));

        let newspapers = &parsed.sources[2];
        assert_eq!(newspapers.category(), SourceCategory::Paid);
        assert!(!newspapers.enabled);
        assert_eq!(newspapers.backend.name(), "browser");
    }

    #[test]
    fn test_category_override() {
        let descriptor = SourceDescriptor::new(
            "wiki",
            SourceBackend::Wikipedia {
                api_base: default_wikipedia_api(),
            },
        )
        .with_category(SourceCategory::Paid);
        assert_eq!(descriptor.category(), SourceCategory::Paid);
        assert_eq!(descriptor.model(), None);
    }
}
