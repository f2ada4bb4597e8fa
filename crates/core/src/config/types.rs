use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::browser::{CaptchaConfig, Credentials, StealthConfig};
use crate::orchestrator::{PolicyConfig, RunConfiguration};
use crate::source::{RetryConfig, SourceBackend, SourceCategory, SourceDescriptor};

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Defaults for runs; the CLI may override single fields.
    #[serde(default)]
    pub run: RunConfiguration,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
    #[serde(default)]
    pub browser: Option<BrowserConfig>,
    #[serde(default)]
    pub captcha: Option<CaptchaConfig>,
}

/// Authenticated browsing configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrowserConfig {
    /// SQLite file holding saved sessions.
    #[serde(default = "default_sessions_db")]
    pub sessions_db: PathBuf,
    /// Lifetime of a fresh session.
    #[serde(default = "default_session_ttl_hours")]
    pub session_ttl_hours: u64,
    /// Check restored sessions against the site before use.
    #[serde(default = "default_probe_on_restore")]
    pub probe_on_restore: bool,
    /// Timeout for a single page load, in seconds.
    #[serde(default = "default_navigation_timeout_secs")]
    pub navigation_timeout_secs: u64,
    #[serde(default)]
    pub stealth: StealthConfig,
    /// Login credentials by site id.
    #[serde(default)]
    pub credentials: BTreeMap<String, Credentials>,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            sessions_db: default_sessions_db(),
            session_ttl_hours: default_session_ttl_hours(),
            probe_on_restore: default_probe_on_restore(),
            navigation_timeout_secs: default_navigation_timeout_secs(),
            stealth: StealthConfig::default(),
            credentials: BTreeMap::new(),
        }
    }
}

fn default_sessions_db() -> PathBuf {
    PathBuf::from("mortem-sessions.db")
}

fn default_session_ttl_hours() -> u64 {
    168
}

fn default_probe_on_restore() -> bool {
    true
}

fn default_navigation_timeout_secs() -> u64 {
    30
}

/// Sanitized config for logging (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub run: RunConfiguration,
    pub policy: PolicyConfig,
    pub retry: RetryConfig,
    pub sources: Vec<SanitizedSourceConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<SanitizedBrowserConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha: Option<SanitizedCaptchaConfig>,
}

/// Sanitized source (keys hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSourceConfig {
    pub id: String,
    pub backend: String,
    pub category: SourceCategory,
    pub priority: i32,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub api_key_configured: bool,
}

/// Sanitized browser config (only which sites have credentials)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedBrowserConfig {
    pub sessions_db: PathBuf,
    pub session_ttl_hours: u64,
    pub probe_on_restore: bool,
    pub sites_with_credentials: Vec<String>,
}

/// Sanitized CAPTCHA config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCaptchaConfig {
    pub provider: String,
    pub api_key_configured: bool,
    pub min_balance: f64,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            run: config.run.clone(),
            policy: config.policy.clone(),
            retry: config.retry.clone(),
            sources: config
                .sources
                .iter()
                .map(|s| SanitizedSourceConfig {
                    id: s.id.clone(),
                    backend: s.backend.name().to_string(),
                    category: s.category(),
                    priority: s.priority,
                    enabled: s.enabled,
                    model: s.model().map(String::from),
                    api_key_configured: match &s.backend {
                        SourceBackend::NewsApi { api_key, .. } => !api_key.is_empty(),
                        SourceBackend::Llm { api_key, .. } => {
                            api_key.as_deref().is_some_and(|k| !k.is_empty())
                        }
                        _ => false,
                    },
                })
                .collect(),
            browser: config.browser.as_ref().map(|b| SanitizedBrowserConfig {
                sessions_db: b.sessions_db.clone(),
                session_ttl_hours: b.session_ttl_hours,
                probe_on_restore: b.probe_on_restore,
                sites_with_credentials: b.credentials.keys().cloned().collect(),
            }),
            captcha: config.captcha.as_ref().map(|c| SanitizedCaptchaConfig {
                provider: c.provider.as_str().to_string(),
                api_key_configured: !c.api_key.is_empty(),
                min_balance: c.min_balance,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[run]
stop_on_match = true
confidence_threshold = 0.6
min_popularity = 5.0

[policy]
min_margin = 0.2

[retry]
max_attempts = 4

[[sources]]
id = "wikidata"
backend = "wikidata"
priority = 1
rate_limit_rpm = 30

[[sources]]
id = "newsapi"
backend = "news_api"
api_key = "news-secret"

[[sources]]
id = "nyt"
backend = "browser"
site = "nytimes"
search_url = "https://www.nytimes.com/search?query={name}"
timeout_secs = 240

[[sources]]
id = "claude"
backend = "llm"
provider = "anthropic"
model = "claude-3-5-haiku-latest"
api_key = "sk-ant-secret"

[browser]
session_ttl_hours = 72

[browser.credentials.nytimes]
username = "me@example.com"
password = "hunter2"

[captcha]
provider = "2captcha"
api_key = "captcha-secret"
"#;

    #[test]
    fn test_deserialize_full_config() {
        let config: Config = toml::from_str(FULL).unwrap();
        assert_eq!(config.run.confidence_threshold, 0.6);
        assert_eq!(config.policy.min_margin, 0.2);
        assert_eq!(config.policy.max_concurrency, 4); // default
        assert_eq!(config.retry.max_attempts, 4);
        assert_eq!(config.sources.len(), 4);
        assert_eq!(config.sources[2].category(), SourceCategory::Paid);
        assert_eq!(config.sources[3].model(), Some("claude-3-5-haiku-latest"));

        let browser = config.browser.as_ref().unwrap();
        assert_eq!(browser.session_ttl_hours, 72);
        assert!(browser.probe_on_restore);
        assert_eq!(browser.sessions_db.to_str().unwrap(), "mortem-sessions.db");
        assert_eq!(browser.credentials["nytimes"].username, "me@example.com");
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.sources.is_empty());
        assert!(config.browser.is_none());
        assert_eq!(config.run.confidence_threshold, 0.5);
    }

    #[test]
    fn test_sanitized_config_hides_secrets() {
        let config: Config = toml::from_str(FULL).unwrap();
        let sanitized = SanitizedConfig::from(&config);
        let json = serde_json::to_string(&sanitized).unwrap();
        for secret in ["news-secret", "sk-ant-secret", "hunter2", "captcha-secret"] {
            assert!(!json.contains(secret), "{} leaked", secret);
        }
        assert!(sanitized.sources[1].api_key_configured);
        assert!(!sanitized.sources[0].api_key_configured);
        assert_eq!(
            sanitized.browser.unwrap().sites_with_credentials,
            vec!["nytimes"]
        );
        assert_eq!(sanitized.captcha.unwrap().provider, "2captcha");
    }
}
