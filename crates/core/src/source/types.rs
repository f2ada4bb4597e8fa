//! Types shared by every source provider.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Cost/priority class of a data source.
///
/// Ordering matters: free sources are always consulted before paid ones,
/// paid before AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceCategory {
    Free,
    Paid,
    Ai,
}

impl SourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceCategory::Free => "free",
            SourceCategory::Paid => "paid",
            SourceCategory::Ai => "ai",
        }
    }
}

impl fmt::Display for SourceCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate cause seen by a provider, with its score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CauseCandidate {
    pub cause: String,
    pub score: f64,
    /// Sentence or field the cause was taken from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<String>,
}

impl CauseCandidate {
    pub fn new(cause: impl Into<String>, score: f64) -> Self {
        Self {
            cause: cause.into(),
            score,
            evidence: None,
        }
    }

    pub fn with_evidence(mut self, evidence: impl Into<String>) -> Self {
        self.evidence = Some(evidence.into());
        self
    }
}

/// What a provider found for a candidate.
///
/// Providers return this; the orchestrator wraps it into a [`SourceResult`].
#[derive(Debug, Clone, PartialEq)]
pub struct SourceFinding {
    /// Best cause-of-death text (None when the source had data but no cause).
    pub cause: Option<String>,
    /// Confidence in `cause`, 0.0-1.0.
    pub confidence: f64,
    /// Ranked competing causes, highest first. May be empty.
    pub alternatives: Vec<CauseCandidate>,
    /// Raw payload kept for audit.
    pub payload: String,
    /// Attribution link.
    pub url: Option<String>,
}

impl SourceFinding {
    /// Build a finding from ranked candidates; the top one becomes the answer.
    pub fn from_candidates(
        mut candidates: Vec<CauseCandidate>,
        payload: impl Into<String>,
        url: Option<String>,
    ) -> Self {
        candidates.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let (cause, confidence) = candidates
            .first()
            .map(|c| (Some(c.cause.clone()), c.score))
            .unwrap_or((None, 0.0));
        Self {
            cause,
            confidence: confidence.clamp(0.0, 1.0),
            alternatives: candidates,
            payload: payload.into(),
            url,
        }
    }
}

/// Classification of a contained failure, recorded on the result it affects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Network, HTTP or rate-limit failure.
    ProviderFailure,
    /// The call exceeded its time budget.
    Timeout,
    /// Text that could not be parsed as JSON.
    MalformedResponse,
    /// JSON that failed schema validation.
    SchemaViolation,
    /// Site login rejected or session unusable.
    AuthenticationFailure,
    /// CAPTCHA solver missing, misconfigured or out of quota.
    SolverUnavailable,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::ProviderFailure => "provider_failure",
            FailureKind::Timeout => "timeout",
            FailureKind::MalformedResponse => "malformed_response",
            FailureKind::SchemaViolation => "schema_violation",
            FailureKind::AuthenticationFailure => "authentication_failure",
            FailureKind::SolverUnavailable => "solver_unavailable",
        }
    }

    /// Failures that make a source unusable for the rest of a run.
    pub fn disables_source_for_run(&self) -> bool {
        matches!(
            self,
            FailureKind::AuthenticationFailure | FailureKind::SolverUnavailable
        )
    }
}

/// Error marker attached to a [`SourceResult`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFailure {
    pub kind: FailureKind,
    pub message: String,
}

/// Outcome of invoking one provider for one candidate. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceResult {
    pub source_id: String,
    pub category: SourceCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternatives: Vec<CauseCandidate>,
    #[serde(default)]
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<SourceFailure>,
    pub fetched_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl SourceResult {
    pub fn from_finding(
        source_id: &str,
        category: SourceCategory,
        finding: SourceFinding,
        duration: Duration,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            category,
            cause: finding.cause.filter(|c| !c.trim().is_empty()),
            confidence: finding.confidence.clamp(0.0, 1.0),
            alternatives: finding.alternatives,
            payload: finding.payload,
            url: finding.url,
            failure: None,
            fetched_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// The source answered but had nothing for this candidate.
    pub fn not_found(source_id: &str, category: SourceCategory, duration: Duration) -> Self {
        Self {
            source_id: source_id.to_string(),
            category,
            cause: None,
            confidence: 0.0,
            alternatives: Vec::new(),
            payload: String::new(),
            url: None,
            failure: None,
            fetched_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    /// The source failed; confidence is pinned to zero.
    pub fn failed(
        source_id: &str,
        category: SourceCategory,
        kind: FailureKind,
        message: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            source_id: source_id.to_string(),
            category,
            cause: None,
            confidence: 0.0,
            alternatives: Vec::new(),
            payload: String::new(),
            url: None,
            failure: Some(SourceFailure {
                kind,
                message: message.into(),
            }),
            fetched_at: Utc::now(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn from_error(
        source_id: &str,
        category: SourceCategory,
        error: &SourceError,
        duration: Duration,
    ) -> Self {
        Self::failed(source_id, category, error.kind(), error.to_string(), duration)
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Errors a provider can return from a fetch.
///
/// All of these are contained by the orchestrator and recorded on the
/// candidate's attempts.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Schema violation at `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("CAPTCHA solver unavailable: {0}")]
    SolverUnavailable(String),

    #[error("Source not configured: {0}")]
    NotConfigured(String),
}

impl SourceError {
    /// Whether a retry with backoff might succeed (5xx, timeouts, dropped connections).
    ///
    /// 4xx responses, including 429, are never retried.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Connection(_) | SourceError::Timeout(_) => true,
            SourceError::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// The failure classification recorded on the result.
    pub fn kind(&self) -> FailureKind {
        match self {
            SourceError::Timeout(_) => FailureKind::Timeout,
            SourceError::MalformedResponse(_) => FailureKind::MalformedResponse,
            SourceError::SchemaViolation { .. } => FailureKind::SchemaViolation,
            SourceError::Authentication(_) => FailureKind::AuthenticationFailure,
            SourceError::SolverUnavailable(_) => FailureKind::SolverUnavailable,
            SourceError::Http(_)
            | SourceError::Connection(_)
            | SourceError::Api { .. }
            | SourceError::RateLimited { .. }
            | SourceError::NotConfigured(_) => FailureKind::ProviderFailure,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not report the configured budget
            SourceError::Timeout(Duration::ZERO)
        } else if e.is_connect() {
            SourceError::Connection(e.to_string())
        } else if let Some(status) = e.status() {
            SourceError::Api {
                status: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            SourceError::Http(e.to_string())
        }
    }
}

impl From<crate::parser::ParseError> for SourceError {
    fn from(e: crate::parser::ParseError) -> Self {
        match e {
            crate::parser::ParseError::MalformedResponse(msg) => {
                SourceError::MalformedResponse(msg)
            }
            crate::parser::ParseError::SchemaViolation { field, reason } => {
                SourceError::SchemaViolation { field, reason }
            }
        }
    }
}
