//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Orchestrator (decisions, provider calls, durations)
//! - Browser authentication (logins, session restores, CAPTCHAs)
//! - External services (LLM token usage)

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts};

// =============================================================================
// Orchestrator Metrics
// =============================================================================

/// Decisions emitted by termination reason.
pub static DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mortem_decisions_total", "Total enrichment decisions"),
        &["reason"], // "matched", "exhausted", "skipped_by_filter", "error", "cancelled"
    )
    .unwrap()
});

/// Time spent on one candidate.
pub static CANDIDATE_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mortem_candidate_duration_seconds",
            "Duration of enrichment per candidate",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0]),
        &["reason"],
    )
    .unwrap()
});

/// Provider invocations by outcome.
pub static PROVIDER_CALLS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mortem_provider_calls_total", "Total source provider calls"),
        &["source", "outcome"], // outcome: "found", "not_found", a failure kind, "disabled"
    )
    .unwrap()
});

/// Provider call duration.
pub static PROVIDER_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mortem_provider_duration_seconds",
            "Duration of source provider calls",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
        &["source"],
    )
    .unwrap()
});

/// Confidence of accepted results.
pub static ACCEPTED_CONFIDENCE: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "mortem_accepted_confidence",
            "Distribution of accepted result confidence",
        )
        .buckets(vec![0.5, 0.6, 0.7, 0.8, 0.85, 0.9, 0.95, 1.0]),
        &["category"],
    )
    .unwrap()
});

// =============================================================================
// Browser Metrics
// =============================================================================

/// Fresh logins by outcome.
pub static LOGINS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mortem_logins_total", "Total site login attempts"),
        &["site", "outcome"], // "success", "failure"
    )
    .unwrap()
});

/// Session restore attempts by outcome.
pub static SESSION_RESTORES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "mortem_session_restores_total",
            "Total attempts to reuse a stored session",
        ),
        &["site", "outcome"], // "reused", "missing", "expired", "probe_failed"
    )
    .unwrap()
});

/// CAPTCHAs solved by kind.
pub static CAPTCHAS_SOLVED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mortem_captchas_solved_total", "Total CAPTCHAs solved"),
        &["kind"],
    )
    .unwrap()
});

// =============================================================================
// External Service Metrics
// =============================================================================

/// LLM tokens used.
pub static LLM_TOKENS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("mortem_llm_tokens_total", "Total LLM tokens used"),
        &["provider", "direction"], // direction: "input", "output"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Orchestrator
        Box::new(DECISIONS.clone()),
        Box::new(CANDIDATE_DURATION.clone()),
        Box::new(PROVIDER_CALLS.clone()),
        Box::new(PROVIDER_DURATION.clone()),
        Box::new(ACCEPTED_CONFIDENCE.clone()),
        // Browser
        Box::new(LOGINS.clone()),
        Box::new(SESSION_RESTORES.clone()),
        Box::new(CAPTCHAS_SOLVED.clone()),
        // External services
        Box::new(LLM_TOKENS.clone()),
    ]
}
