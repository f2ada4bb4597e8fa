//! `${VAR}` references in secret fields.

use super::{types::Config, ConfigError};
use crate::source::SourceBackend;

/// Replace `${VAR}` references in secret fields with the variable's value.
pub fn resolve_secrets(config: &mut Config) -> Result<(), ConfigError> {
    resolve_secrets_with(config, |name| std::env::var(name).ok())
}

/// Same as [`resolve_secrets`] with a custom variable lookup.
pub fn resolve_secrets_with(
    config: &mut Config,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<(), ConfigError> {
    for source in &mut config.sources {
        let field = format!("sources.{}.api_key", source.id);
        match &mut source.backend {
            SourceBackend::NewsApi { api_key, .. } => {
                *api_key = expand(api_key, &field, &lookup)?;
            }
            SourceBackend::Llm {
                api_key: Some(api_key),
                ..
            } => {
                *api_key = expand(api_key, &field, &lookup)?;
            }
            _ => {}
        }
    }
    if let Some(browser) = &mut config.browser {
        for (site, credentials) in &mut browser.credentials {
            credentials.username = expand(
                &credentials.username,
                &format!("browser.credentials.{}.username", site),
                &lookup,
            )?;
            credentials.password = expand(
                &credentials.password,
                &format!("browser.credentials.{}.password", site),
                &lookup,
            )?;
        }
    }
    if let Some(captcha) = &mut config.captcha {
        captcha.api_key = expand(&captcha.api_key, "captcha.api_key", &lookup)?;
    }
    Ok(())
}

/// Expand a whole-value `${VAR}` reference; other values pass through.
fn expand(
    value: &str,
    field: &str,
    lookup: &impl Fn(&str) -> Option<String>,
) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    let Some(name) = trimmed
        .strip_prefix("${")
        .and_then(|rest| rest.strip_suffix('}'))
    else {
        return Ok(value.to_string());
    };
    lookup(name).ok_or_else(|| {
        ConfigError::ValidationError(format!(
            "{} references ${{{}}}, which is not set",
            field, name
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn env(name: &str) -> Option<String> {
        match name {
            "NEWS_KEY" => Some("resolved-news".to_string()),
            "NYT_PASSWORD" => Some("resolved-pw".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_resolves_references() {
        let mut config = load_config_from_str(
            r#"
[[sources]]
id = "newsapi"
backend = "news_api"
api_key = "${NEWS_KEY}"

[browser.credentials.nytimes]
username = "me@example.com"
password = "${NYT_PASSWORD}"
"#,
        )
        .unwrap();
        resolve_secrets_with(&mut config, env).unwrap();

        match &config.sources[0].backend {
            SourceBackend::NewsApi { api_key, .. } => assert_eq!(api_key, "resolved-news"),
            other => panic!("unexpected backend {:?}", other),
        }
        let credentials = &config.browser.as_ref().unwrap().credentials["nytimes"];
        assert_eq!(credentials.username, "me@example.com");
        assert_eq!(credentials.password, "resolved-pw");
    }

    #[test]
    fn test_unset_reference_is_error() {
        let mut config = load_config_from_str(
            r#"
[captcha]
provider = "capsolver"
api_key = "${MISSING_KEY}"
"#,
        )
        .unwrap();
        let err = resolve_secrets_with(&mut config, env).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
        assert!(err.to_string().contains("MISSING_KEY"));
    }
}
