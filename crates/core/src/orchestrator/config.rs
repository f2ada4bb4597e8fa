//! Orchestrator configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::types::OrchestratorError;
use crate::source::SourceCategory;

/// Which source categories a run may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceCategories {
    #[serde(default = "default_true")]
    pub free: bool,
    #[serde(default = "default_true")]
    pub paid: bool,
    #[serde(default = "default_true")]
    pub ai: bool,
}

fn default_true() -> bool {
    true
}

impl Default for SourceCategories {
    fn default() -> Self {
        Self {
            free: true,
            paid: true,
            ai: true,
        }
    }
}

impl SourceCategories {
    pub fn allows(&self, category: SourceCategory) -> bool {
        match category {
            SourceCategory::Free => self.free,
            SourceCategory::Paid => self.paid,
            SourceCategory::Ai => self.ai,
        }
    }
}

/// Policy for one orchestration run. Never mutated during the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfiguration {
    /// Maximum candidates processed, in input order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,

    #[serde(default)]
    pub source_categories: SourceCategories,

    /// Per-source enabled overrides, by source id.
    #[serde(default)]
    pub specific_sources: BTreeMap<String, bool>,

    /// Model overrides for AI sources, by source id.
    #[serde(default)]
    pub ai_models: BTreeMap<String, String>,

    /// Stop probing a candidate at the first accepted result.
    #[serde(default = "default_true")]
    pub stop_on_match: bool,

    /// Minimum confidence for acceptance (0.0-1.0).
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Candidates below this popularity are skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_popularity: Option<f64>,

    /// Decisions are computed but flagged as not to be written.
    #[serde(default)]
    pub dry_run: bool,

    /// Only candidates who died within the policy's recent window.
    #[serde(default)]
    pub recent_only: bool,
}

fn default_confidence_threshold() -> f64 {
    0.5
}

impl Default for RunConfiguration {
    fn default() -> Self {
        Self {
            limit: None,
            source_categories: SourceCategories::default(),
            specific_sources: BTreeMap::new(),
            ai_models: BTreeMap::new(),
            stop_on_match: true,
            confidence_threshold: default_confidence_threshold(),
            min_popularity: None,
            dry_run: false,
            recent_only: false,
        }
    }
}

impl RunConfiguration {
    /// Reject values no run can work with.
    pub fn validate(&self) -> Result<(), OrchestratorError> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(OrchestratorError::Configuration(format!(
                "confidence_threshold must be within 0..=1, got {}",
                self.confidence_threshold
            )));
        }
        if let Some(min) = self.min_popularity {
            if !min.is_finite() {
                return Err(OrchestratorError::Configuration(
                    "min_popularity must be a finite number".to_string(),
                ));
            }
        }
        if let Some((id, _)) = self.ai_models.iter().find(|(_, model)| model.trim().is_empty()) {
            return Err(OrchestratorError::Configuration(format!(
                "ai_models.{} is empty",
                id
            )));
        }
        Ok(())
    }

    /// Effective enabled flag for a source: override, else its own flag.
    pub fn source_enabled(&self, id: &str, descriptor_enabled: bool) -> bool {
        self.specific_sources
            .get(id)
            .copied()
            .unwrap_or(descriptor_enabled)
    }
}

/// Process-wide acceptance and scheduling knobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Lead the best candidate must hold over the runner-up.
    #[serde(default = "default_min_margin")]
    pub min_margin: f64,

    /// Window for `recent_only`, in days before today.
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: u32,

    /// Candidates processed at once.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

fn default_min_margin() -> f64 {
    0.15
}

fn default_recent_window_days() -> u32 {
    30
}

fn default_max_concurrency() -> usize {
    4
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            min_margin: default_min_margin(),
            recent_window_days: default_recent_window_days(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RunConfiguration::default();
        assert!(config.stop_on_match);
        assert_eq!(config.confidence_threshold, 0.5);
        assert!(config.source_categories.allows(SourceCategory::Ai));
        assert!(config.validate().is_ok());

        let policy = PolicyConfig::default();
        assert_eq!(policy.min_margin, 0.15);
        assert_eq!(policy.recent_window_days, 30);
        assert_eq!(policy.max_concurrency, 4);
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            limit = 25
            stop_on_match = false
            confidence_threshold = 0.7
            min_popularity = 5.0
            dry_run = true
            recent_only = true

            [source_categories]
            ai = false

            [specific_sources]
            newsapi = false

            [ai_models]
            claude = "claude-3-5-sonnet-latest"
        "#;
        let config: RunConfiguration = toml::from_str(toml).unwrap();
        assert_eq!(config.limit, Some(25));
        assert!(!config.stop_on_match);
        assert!(config.source_categories.free);
        assert!(!config.source_categories.allows(SourceCategory::Ai));
        assert!(!config.source_enabled("newsapi", true));
        assert!(config.source_enabled("wikidata", true));
        assert!(!config.source_enabled("wikidata", false));
        assert_eq!(
            config.ai_models.get("claude").map(String::as_str),
            Some("claude-3-5-sonnet-latest")
        );
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let config = RunConfiguration {
            confidence_threshold: 1.5,
            ..RunConfiguration::default()
        };
        assert!(matches!(
            config.validate(),
            Err(OrchestratorError::Configuration(_))
        ));
        let config = RunConfiguration {
            confidence_threshold: f64::NAN,
            ..RunConfiguration::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_model_override() {
        let mut config = RunConfiguration::default();
        config.ai_models.insert("claude".to_string(), " ".to_string());
        assert!(config.validate().is_err());
    }
}
