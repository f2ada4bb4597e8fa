use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration from file with environment variable overrides
///
/// `MORTEM_RUN__CONFIDENCE_THRESHOLD=0.8` overrides `run.confidence_threshold`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("MORTEM_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[run]
confidence_threshold = 0.75

[[sources]]
id = "wikipedia"
backend = "wikipedia"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.run.confidence_threshold, 0.75);
        assert_eq!(config.sources[0].id, "wikipedia");
    }

    #[test]
    fn test_load_config_from_str_unknown_backend() {
        let toml = r#"
[[sources]]
id = "x"
backend = "carrier_pigeon"
"#;
        let result = load_config_from_str(toml);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/mortem.toml"));
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[policy]
max_concurrency = 2

[browser]
sessions_db = "/var/lib/mortem/sessions.db"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.policy.max_concurrency, 2);
        assert_eq!(
            config.browser.unwrap().sessions_db.to_str().unwrap(),
            "/var/lib/mortem/sessions.db"
        );
    }
}
