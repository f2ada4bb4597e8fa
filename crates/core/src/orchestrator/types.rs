//! Types for the enrichment orchestrator.

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::SourceResult;

/// Errors that abort a run.
///
/// Everything that goes wrong for a single candidate or source is recorded
/// on its decision instead.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid run configuration; raised before any candidate is processed.
    #[error("configuration error: {0}")]
    Configuration(String),
}

/// Why processing of a candidate ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// A result was accepted.
    Matched,
    /// Every eligible source was tried without an accepted result.
    Exhausted,
    /// A pre-filter excluded the candidate; no source was called.
    SkippedByFilter,
    /// The candidate itself could not be queried.
    Error,
    /// The run was cancelled before the candidate finished.
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Matched => "matched",
            TerminationReason::Exhausted => "exhausted",
            TerminationReason::SkippedByFilter => "skipped_by_filter",
            TerminationReason::Error => "error",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome for one candidate in one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentDecision {
    pub candidate_id: String,
    pub candidate_name: String,
    pub accepted: bool,
    /// The accepted result, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen: Option<SourceResult>,
    /// Every source result in invocation order.
    #[serde(default)]
    pub attempts: Vec<SourceResult>,
    pub reason: TerminationReason,
    /// Computed for inspection only; must not be persisted.
    pub dry_run: bool,
    pub decided_at: DateTime<Utc>,
}

impl EnrichmentDecision {
    pub fn cause(&self) -> Option<&str> {
        self.chosen.as_ref().and_then(|r| r.cause.as_deref())
    }
}

/// Counts for one finished run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub matched: usize,
    pub exhausted: usize,
    pub skipped: usize,
    pub errors: usize,
    pub cancelled: usize,
    pub provider_calls: usize,
}

impl RunSummary {
    pub fn from_decisions(decisions: &[EnrichmentDecision]) -> Self {
        let mut summary = Self {
            total: decisions.len(),
            ..Self::default()
        };
        for decision in decisions {
            match decision.reason {
                TerminationReason::Matched => summary.matched += 1,
                TerminationReason::Exhausted => summary.exhausted += 1,
                TerminationReason::SkippedByFilter => summary.skipped += 1,
                TerminationReason::Error => summary.errors += 1,
                TerminationReason::Cancelled => summary.cancelled += 1,
            }
            summary.provider_calls += decision.attempts.len();
        }
        summary
    }
}

/// Receives decisions that should be persisted.
#[async_trait]
pub trait DecisionSink: Send + Sync {
    async fn write(&self, decision: &EnrichmentDecision) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decision(reason: TerminationReason, attempts: usize) -> EnrichmentDecision {
        EnrichmentDecision {
            candidate_id: "c1".to_string(),
            candidate_name: "Jane Doe".to_string(),
            accepted: reason == TerminationReason::Matched,
            chosen: None,
            attempts: (0..attempts)
                .map(|i| {
                    SourceResult::not_found(
                        &format!("s{}", i),
                        crate::source::SourceCategory::Free,
                        std::time::Duration::ZERO,
                    )
                })
                .collect(),
            reason,
            dry_run: false,
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn test_reason_serialization() {
        let json = serde_json::to_string(&TerminationReason::SkippedByFilter).unwrap();
        assert_eq!(json, "\"skipped_by_filter\"");
        assert_eq!(TerminationReason::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_decision_roundtrip() {
        let original = decision(TerminationReason::Exhausted, 2);
        let json = serde_json::to_string(&original).unwrap();
        let parsed: EnrichmentDecision = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, original);
        assert!(parsed.cause().is_none());
    }

    #[test]
    fn test_summary_counts() {
        let summary = RunSummary::from_decisions(&[
            decision(TerminationReason::Matched, 2),
            decision(TerminationReason::Exhausted, 3),
            decision(TerminationReason::SkippedByFilter, 0),
            decision(TerminationReason::Cancelled, 0),
        ]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.matched, 1);
        assert_eq!(summary.exhausted, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.cancelled, 1);
        assert_eq!(summary.provider_calls, 5);
    }

    #[test]
    fn test_error_display() {
        let err = OrchestratorError::Configuration("bad threshold".to_string());
        assert_eq!(err.to_string(), "configuration error: bad threshold");
    }
}
