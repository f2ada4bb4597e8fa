use std::collections::HashSet;

use super::{types::Config, ConfigError};
use crate::llm::LlmProvider;
use crate::source::SourceBackend;

/// Validate configuration
/// Currently validates:
/// - Run defaults, policy and retry values are in range
/// - Source ids are unique and each backend has what it needs
/// - Browser sources have a browser section with credentials for their site
/// - Browser sources leave room for CAPTCHA solving in their timeout
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    config.run.validate()?;

    if !(0.0..=1.0).contains(&config.policy.min_margin) {
        return Err(invalid("policy.min_margin must be within 0..=1"));
    }
    if config.policy.max_concurrency == 0 {
        return Err(invalid("policy.max_concurrency cannot be 0"));
    }
    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts cannot be 0"));
    }
    if config.retry.multiplier < 1.0 {
        return Err(invalid("retry.multiplier must be at least 1.0"));
    }

    let mut seen = HashSet::new();
    for source in &config.sources {
        if source.id.trim().is_empty() {
            return Err(invalid("sources: id cannot be empty"));
        }
        if !seen.insert(source.id.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "sources: duplicate id {}",
                source.id
            )));
        }
        if source.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(format!(
                "sources.{}.timeout_secs cannot be 0",
                source.id
            )));
        }
        validate_backend(config, &source.id, &source.backend)?;

        // A login that hits a CAPTCHA runs inside the fetch budget.
        if let (SourceBackend::Browser { .. }, Some(captcha)) = (&source.backend, &config.captcha) {
            if source.timeout_secs <= captcha.max_wait_secs {
                return Err(ConfigError::ValidationError(format!(
                    "sources.{}.timeout_secs ({}) must exceed captcha.max_wait_secs ({})",
                    source.id, source.timeout_secs, captcha.max_wait_secs
                )));
            }
        }
    }

    if let Some(browser) = &config.browser {
        if browser.session_ttl_hours == 0 {
            return Err(invalid("browser.session_ttl_hours cannot be 0"));
        }
        if browser.stealth.min_delay_ms > browser.stealth.max_delay_ms {
            return Err(invalid(
                "browser.stealth.min_delay_ms cannot exceed max_delay_ms",
            ));
        }
    }

    if let Some(captcha) = &config.captcha {
        if captcha.api_key.trim().is_empty() {
            return Err(invalid("captcha.api_key is required"));
        }
    }

    Ok(())
}

fn validate_backend(config: &Config, id: &str, backend: &SourceBackend) -> Result<(), ConfigError> {
    match backend {
        SourceBackend::NewsApi { api_key, .. } if api_key.trim().is_empty() => Err(
            ConfigError::ValidationError(format!("sources.{}.api_key is required", id)),
        ),
        SourceBackend::Llm {
            provider,
            api_key,
            api_base,
            ..
        } => {
            let has_key = api_key.as_deref().is_some_and(|k| !k.trim().is_empty());
            match provider {
                LlmProvider::Anthropic | LlmProvider::OpenAi if !has_key => {
                    Err(ConfigError::ValidationError(format!(
                        "sources.{}.api_key is required for {:?}",
                        id, provider
                    )))
                }
                LlmProvider::Custom if api_base.is_none() => Err(ConfigError::ValidationError(
                    format!("sources.{}.api_base is required for custom providers", id),
                )),
                _ => Ok(()),
            }
        }
        SourceBackend::Browser { site, search_url } => {
            if !search_url.contains("{name}") {
                return Err(ConfigError::ValidationError(format!(
                    "sources.{}.search_url must contain {{name}}",
                    id
                )));
            }
            let has_credentials = config
                .browser
                .as_ref()
                .is_some_and(|b| b.credentials.contains_key(site));
            if !has_credentials {
                return Err(ConfigError::ValidationError(format!(
                    "sources.{} needs browser.credentials.{}",
                    id, site
                )));
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn validate(toml: &str) -> Result<(), ConfigError> {
        validate_config(&load_config_from_str(toml).unwrap())
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate("").is_ok());
        assert!(validate(
            r#"
[[sources]]
id = "wikidata"
backend = "wikidata"

[[sources]]
id = "nyt"
backend = "browser"
site = "nytimes"
search_url = "https://www.nytimes.com/search?query={name}"

[browser.credentials.nytimes]
username = "me"
password = "pw"
"#
        )
        .is_ok());
    }

    #[test]
    fn test_validate_threshold_out_of_range_fails() {
        let result = validate(
            r#"
[run]
confidence_threshold = 2.0
"#,
        );
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_duplicate_ids_fail() {
        let result = validate(
            r#"
[[sources]]
id = "wiki"
backend = "wikidata"

[[sources]]
id = "wiki"
backend = "wikipedia"
"#,
        );
        assert!(result.unwrap_err().to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_browser_source_without_credentials_fails() {
        let result = validate(
            r#"
[[sources]]
id = "nyt"
backend = "browser"
site = "nytimes"
search_url = "https://www.nytimes.com/search?query={name}"
"#,
        );
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("browser.credentials.nytimes"));
    }

    #[test]
    fn test_validate_llm_key_required() {
        let result = validate(
            r#"
[[sources]]
id = "gpt"
backend = "llm"
provider = "open_ai"
model = "gpt-4o-mini"
"#,
        );
        assert!(result.is_err());
        assert!(validate(
            r#"
[[sources]]
id = "local"
backend = "llm"
provider = "ollama"
model = "llama3"
"#
        )
        .is_ok());
    }

    #[test]
    fn test_validate_empty_captcha_key_fails() {
        let result = validate(
            r#"
[captcha]
provider = "2captcha"
api_key = ""
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_browser_timeout_must_cover_captcha_wait() {
        let config = |timeout: u64| {
            format!(
                r#"
[[sources]]
id = "nyt"
backend = "browser"
site = "nytimes"
search_url = "https://www.nytimes.com/search?query={{name}}"
timeout_secs = {}

[browser.credentials.nytimes]
username = "me"
password = "pw"

[captcha]
provider = "2captcha"
api_key = "key"
max_wait_secs = 120
"#,
                timeout
            )
        };
        let err = validate(&config(30)).unwrap_err();
        assert!(err.to_string().contains("captcha.max_wait_secs"));
        assert!(validate(&config(120)).is_err());
        assert!(validate(&config(150)).is_ok());
    }
}
