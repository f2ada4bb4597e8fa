//! Enrichment orchestrator implementation.
//!
//! Candidates run concurrently up to `policy.max_concurrency`; the sources for
//! one candidate run one after another so that a match can stop the probing
//! before paid or AI sources are spent.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{Days, NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::candidate::Candidate;
use crate::metrics;
use crate::source::{
    FetchContext, RegisteredSource, SourceCategory, SourceFailure, SourceRegistry, SourceResult,
};

use super::config::{PolicyConfig, RunConfiguration};
use super::policy::{AcceptancePolicy, Verdict};
use super::types::{
    DecisionSink, EnrichmentDecision, OrchestratorError, RunSummary, TerminationReason,
};

/// Drives candidates through the configured sources.
pub struct Orchestrator {
    registry: Arc<SourceRegistry>,
    policy: PolicyConfig,
    sink: Option<Arc<dyn DecisionSink>>,
}

/// Read-only inputs plus the little state shared by one run.
struct RunContext<'a> {
    run_id: Uuid,
    config: &'a RunConfiguration,
    plan: Vec<&'a RegisteredSource>,
    acceptance: AcceptancePolicy,
    today: NaiveDate,
    cancel: CancellationToken,
    /// Sources switched off for the rest of the run, with the failure that did it.
    disabled: Mutex<HashMap<String, SourceFailure>>,
}

impl RunContext<'_> {
    fn disabled_failure(&self, source_id: &str) -> Option<SourceFailure> {
        self.disabled
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
            .cloned()
    }

    fn disable(&self, source_id: &str, failure: SourceFailure) {
        let mut disabled = self.disabled.lock().unwrap_or_else(|e| e.into_inner());
        if !disabled.contains_key(source_id) {
            warn!(
                run_id = %self.run_id,
                source = source_id,
                kind = failure.kind.as_str(),
                "Disabling source for the rest of the run"
            );
            disabled.insert(source_id.to_string(), failure);
        }
    }
}

impl Orchestrator {
    pub fn new(registry: Arc<SourceRegistry>, policy: PolicyConfig) -> Self {
        Self {
            registry,
            policy,
            sink: None,
        }
    }

    /// Hand every non-dry-run decision to `sink` as soon as it is made.
    pub fn with_sink(mut self, sink: Arc<dyn DecisionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    /// Process `candidates` and return one decision per candidate, in input order.
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        config: &RunConfiguration,
    ) -> Result<Vec<EnrichmentDecision>, OrchestratorError> {
        self.run_with_cancellation(candidates, config, CancellationToken::new())
            .await
    }

    /// Like [`run`](Self::run), stopping early once `cancel` fires.
    ///
    /// Candidates not started by then get a `Cancelled` decision with no
    /// attempts; a started candidate stops between sources and keeps the best
    /// result it had already accepted.
    pub async fn run_with_cancellation(
        &self,
        mut candidates: Vec<Candidate>,
        config: &RunConfiguration,
        cancel: CancellationToken,
    ) -> Result<Vec<EnrichmentDecision>, OrchestratorError> {
        self.validate(config)?;

        if let Some(limit) = config.limit {
            candidates.truncate(limit);
        }

        let ctx = RunContext {
            run_id: Uuid::new_v4(),
            config,
            plan: self.plan(config),
            acceptance: AcceptancePolicy::new(config.confidence_threshold, self.policy.min_margin),
            today: Utc::now().date_naive(),
            cancel,
            disabled: Mutex::new(HashMap::new()),
        };
        let started = Instant::now();
        info!(
            run_id = %ctx.run_id,
            candidates = candidates.len(),
            sources = ?ctx.plan.iter().map(|s| s.descriptor.id.as_str()).collect::<Vec<_>>(),
            dry_run = config.dry_run,
            "Starting enrichment run"
        );

        let ctx = &ctx;
        let decisions: Vec<EnrichmentDecision> = stream::iter(candidates)
            .map(|candidate| {
                let span = info_span!("candidate", run_id = %ctx.run_id, id = %candidate.id);
                self.process_candidate(ctx, candidate).instrument(span)
            })
            .buffered(self.policy.max_concurrency.max(1))
            .then(|decision| async move {
                self.deliver(&decision).await;
                decision
            })
            .collect()
            .await;

        let summary = RunSummary::from_decisions(&decisions);
        info!(
            run_id = %ctx.run_id,
            total = summary.total,
            matched = summary.matched,
            exhausted = summary.exhausted,
            skipped = summary.skipped,
            errors = summary.errors,
            cancelled = summary.cancelled,
            provider_calls = summary.provider_calls,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Enrichment run finished"
        );
        Ok(decisions)
    }

    fn validate(&self, config: &RunConfiguration) -> Result<(), OrchestratorError> {
        config.validate()?;
        if !(0.0..=1.0).contains(&self.policy.min_margin) {
            return Err(OrchestratorError::Configuration(format!(
                "policy.min_margin must be within 0..=1, got {}",
                self.policy.min_margin
            )));
        }
        if self.policy.max_concurrency == 0 {
            return Err(OrchestratorError::Configuration(
                "policy.max_concurrency must be at least 1".to_string(),
            ));
        }
        for id in config.ai_models.keys() {
            match self.registry.get(id) {
                Some(source) if source.descriptor.category() == SourceCategory::Ai => {}
                Some(_) => {
                    return Err(OrchestratorError::Configuration(format!(
                        "ai_models.{} names a source that is not an AI source",
                        id
                    )))
                }
                None => {
                    return Err(OrchestratorError::Configuration(format!(
                        "ai_models.{} names an unknown source",
                        id
                    )))
                }
            }
        }
        for id in config.specific_sources.keys() {
            if self.registry.get(id).is_none() {
                warn!(source = %id, "Override for unknown source ignored");
            }
        }
        Ok(())
    }

    /// Eligible sources in invocation order.
    fn plan<'a>(&'a self, config: &RunConfiguration) -> Vec<&'a RegisteredSource> {
        let mut plan: Vec<&RegisteredSource> = self
            .registry
            .entries()
            .iter()
            .filter(|s| config.source_categories.allows(s.descriptor.category()))
            .filter(|s| config.source_enabled(&s.descriptor.id, s.descriptor.enabled))
            .collect();
        plan.sort_by_key(|s| (s.descriptor.category(), s.descriptor.priority));
        plan
    }

    /// Why a candidate is excluded before any source is called.
    fn filter_reason(&self, ctx: &RunContext<'_>, candidate: &Candidate) -> Option<String> {
        if let Some(min) = ctx.config.min_popularity {
            let popularity = candidate.popularity_or_zero();
            if popularity < min {
                return Some(format!("popularity {} below {}", popularity, min));
            }
        }
        if ctx.config.recent_only {
            let Some(died) = candidate.death_date else {
                return Some("no death date".to_string());
            };
            let cutoff = ctx
                .today
                .checked_sub_days(Days::new(u64::from(self.policy.recent_window_days)))
                .unwrap_or(NaiveDate::MIN);
            if died < cutoff {
                return Some(format!("died {} before recent window", died));
            }
        }
        None
    }

    async fn process_candidate(
        &self,
        ctx: &RunContext<'_>,
        candidate: Candidate,
    ) -> EnrichmentDecision {
        let started = Instant::now();
        let decision = self.decide(ctx, &candidate).await;
        let reason = decision.reason.as_str();
        metrics::DECISIONS.with_label_values(&[reason]).inc();
        metrics::CANDIDATE_DURATION
            .with_label_values(&[reason])
            .observe(started.elapsed().as_secs_f64());
        info!(
            reason,
            cause = decision.cause().unwrap_or("-"),
            attempts = decision.attempts.len(),
            "Candidate decided"
        );
        decision
    }

    async fn decide(&self, ctx: &RunContext<'_>, candidate: &Candidate) -> EnrichmentDecision {
        if ctx.cancel.is_cancelled() {
            return decision(ctx, candidate, TerminationReason::Cancelled, Vec::new(), None);
        }
        if candidate.name.trim().is_empty() {
            warn!("Candidate has no name to search for");
            return decision(ctx, candidate, TerminationReason::Error, Vec::new(), None);
        }
        if let Some(why) = self.filter_reason(ctx, candidate) {
            debug!(why = %why, "Candidate skipped by filter");
            return decision(
                ctx,
                candidate,
                TerminationReason::SkippedByFilter,
                Vec::new(),
                None,
            );
        }

        let mut attempts = Vec::with_capacity(ctx.plan.len());
        let mut best: Option<SourceResult> = None;

        for source in &ctx.plan {
            if ctx.cancel.is_cancelled() {
                info!(attempts = attempts.len(), "Run cancelled mid-candidate");
                return decision(ctx, candidate, TerminationReason::Cancelled, attempts, best);
            }

            let result = self.invoke(ctx, source, candidate).await;
            let verdict = ctx.acceptance.evaluate(&result);
            debug!(
                source = %result.source_id,
                cause = result.cause.as_deref().unwrap_or("-"),
                confidence = result.confidence,
                verdict = ?verdict,
                "Source result"
            );
            attempts.push(result.clone());

            if verdict == Verdict::Accepted {
                metrics::ACCEPTED_CONFIDENCE
                    .with_label_values(&[result.category.as_str()])
                    .observe(result.confidence);
                if ctx.config.stop_on_match {
                    return decision(
                        ctx,
                        candidate,
                        TerminationReason::Matched,
                        attempts,
                        Some(result),
                    );
                }
                if best
                    .as_ref()
                    .map_or(true, |b| result.confidence > b.confidence)
                {
                    best = Some(result);
                }
            }
        }

        match best {
            Some(chosen) => decision(
                ctx,
                candidate,
                TerminationReason::Matched,
                attempts,
                Some(chosen),
            ),
            None => decision(ctx, candidate, TerminationReason::Exhausted, attempts, None),
        }
    }

    /// Call one source, turning every failure into a result.
    async fn invoke(
        &self,
        ctx: &RunContext<'_>,
        source: &RegisteredSource,
        candidate: &Candidate,
    ) -> SourceResult {
        let id = source.descriptor.id.as_str();
        let category = source.descriptor.category();

        if let Some(failure) = ctx.disabled_failure(id) {
            metrics::PROVIDER_CALLS
                .with_label_values(&[id, "disabled"])
                .inc();
            return SourceResult::failed(
                id,
                category,
                failure.kind,
                format!("disabled for this run: {}", failure.message),
                Duration::ZERO,
            );
        }

        let fetch_ctx = FetchContext {
            model_override: ctx.config.ai_models.get(id).cloned(),
        };
        let budget = Duration::from_secs(source.descriptor.timeout_secs);
        let limiter = self.registry.rate_limiter();
        let started = Instant::now();

        let outcome = tokio::time::timeout(budget, async {
            limiter.acquire(id).await;
            source.provider.fetch(candidate, &fetch_ctx).await
        })
        .await;
        let elapsed = started.elapsed();
        metrics::PROVIDER_DURATION
            .with_label_values(&[id])
            .observe(elapsed.as_secs_f64());

        let result = match outcome {
            Ok(Ok(Some(finding))) => SourceResult::from_finding(id, category, finding, elapsed),
            Ok(Ok(None)) => SourceResult::not_found(id, category, elapsed),
            Ok(Err(e)) => {
                warn!(source = id, kind = e.kind().as_str(), error = %e, "Source failed");
                let result = SourceResult::from_error(id, category, &e, elapsed);
                if e.kind().disables_source_for_run() {
                    if let Some(failure) = &result.failure {
                        ctx.disable(id, failure.clone());
                    }
                }
                result
            }
            Err(_) => {
                warn!(source = id, budget_secs = budget.as_secs(), "Source timed out");
                SourceResult::failed(
                    id,
                    category,
                    crate::source::FailureKind::Timeout,
                    format!("no answer within {}s", budget.as_secs()),
                    elapsed,
                )
            }
        };

        let outcome = match (&result.failure, &result.cause) {
            (Some(failure), _) => failure.kind.as_str(),
            (None, Some(_)) => "found",
            (None, None) => "not_found",
        };
        metrics::PROVIDER_CALLS
            .with_label_values(&[id, outcome])
            .inc();
        result
    }

    async fn deliver(&self, decision: &EnrichmentDecision) {
        if decision.dry_run {
            return;
        }
        let Some(sink) = &self.sink else {
            return;
        };
        if let Err(e) = sink.write(decision).await {
            error!(candidate = %decision.candidate_id, error = %e, "Failed to write decision");
        }
    }
}

fn decision(
    ctx: &RunContext<'_>,
    candidate: &Candidate,
    reason: TerminationReason,
    attempts: Vec<SourceResult>,
    chosen: Option<SourceResult>,
) -> EnrichmentDecision {
    EnrichmentDecision {
        candidate_id: candidate.id.clone(),
        candidate_name: candidate.name.clone(),
        accepted: chosen.is_some(),
        chosen,
        attempts,
        reason,
        dry_run: ctx.config.dry_run,
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{FailureKind, SourceBackend, SourceDescriptor, SourceError};
    use crate::testing::{fixtures, MockProvider};

    fn descriptor(id: &str, category: SourceCategory, priority: i32) -> SourceDescriptor {
        SourceDescriptor::new(
            id,
            SourceBackend::Wikipedia {
                api_base: "https://en.wikipedia.org/w/api.php".to_string(),
            },
        )
        .with_category(category)
        .with_priority(priority)
    }

    fn orchestrator(sources: Vec<(SourceDescriptor, Arc<MockProvider>)>) -> Orchestrator {
        let mut registry = SourceRegistry::new();
        for (descriptor, provider) in sources {
            registry.register(descriptor, provider).unwrap();
        }
        Orchestrator::new(Arc::new(registry), PolicyConfig::default())
    }

    #[tokio::test]
    async fn test_plan_orders_by_category_then_priority() {
        let orch = orchestrator(vec![
            (
                descriptor("ai", SourceCategory::Ai, 0),
                Arc::new(MockProvider::not_found("ai")),
            ),
            (
                descriptor("paid", SourceCategory::Paid, 0),
                Arc::new(MockProvider::not_found("paid")),
            ),
            (
                descriptor("free-b", SourceCategory::Free, 5),
                Arc::new(MockProvider::not_found("free-b")),
            ),
            (
                descriptor("free-a", SourceCategory::Free, 1),
                Arc::new(MockProvider::not_found("free-a")),
            ),
        ]);
        let ids: Vec<&str> = orch
            .plan(&RunConfiguration::default())
            .iter()
            .map(|s| s.descriptor.id.as_str())
            .collect();
        assert_eq!(ids, vec!["free-a", "free-b", "paid", "ai"]);
    }

    #[tokio::test]
    async fn test_override_cannot_enable_disabled_category() {
        let orch = orchestrator(vec![
            (
                descriptor("free", SourceCategory::Free, 0),
                Arc::new(MockProvider::not_found("free")),
            ),
            (
                descriptor("paid", SourceCategory::Paid, 0).with_enabled(false),
                Arc::new(MockProvider::not_found("paid")),
            ),
            (
                descriptor("ai", SourceCategory::Ai, 0),
                Arc::new(MockProvider::not_found("ai")),
            ),
        ]);
        let mut config = RunConfiguration::default();
        config.source_categories.ai = false;
        config.specific_sources.insert("ai".to_string(), true);
        config.specific_sources.insert("paid".to_string(), true);
        config.specific_sources.insert("free".to_string(), false);
        let ids: Vec<&str> = orch
            .plan(&config)
            .iter()
            .map(|s| s.descriptor.id.as_str())
            .collect();
        assert_eq!(ids, vec!["paid"]);
    }

    #[tokio::test]
    async fn test_invalid_threshold_aborts_before_any_call() {
        let provider = Arc::new(MockProvider::found("free", "stroke", 0.9));
        let orch = orchestrator(vec![(
            descriptor("free", SourceCategory::Free, 0),
            provider.clone(),
        )]);
        let config = RunConfiguration {
            confidence_threshold: -0.1,
            ..RunConfiguration::default()
        };
        let result = orch.run(vec![fixtures::candidate("c1")], &config).await;
        assert!(matches!(result, Err(OrchestratorError::Configuration(_))));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_model_override_must_name_ai_source() {
        let orch = orchestrator(vec![(
            descriptor("free", SourceCategory::Free, 0),
            Arc::new(MockProvider::not_found("free")),
        )]);
        let mut config = RunConfiguration::default();
        config
            .ai_models
            .insert("free".to_string(), "gpt-4o".to_string());
        assert!(orch.run(Vec::new(), &config).await.is_err());
        config.ai_models.clear();
        config
            .ai_models
            .insert("nope".to_string(), "gpt-4o".to_string());
        assert!(orch.run(Vec::new(), &config).await.is_err());
    }

    #[tokio::test]
    async fn test_model_override_reaches_ai_source() {
        let provider = Arc::new(MockProvider::found("claude", "stroke", 0.9));
        let orch = orchestrator(vec![(
            descriptor("claude", SourceCategory::Ai, 0),
            provider.clone(),
        )]);
        let mut config = RunConfiguration::default();
        config
            .ai_models
            .insert("claude".to_string(), "claude-3-opus".to_string());
        orch.run(vec![fixtures::candidate("c1")], &config)
            .await
            .unwrap();
        assert_eq!(
            provider.model_overrides(),
            vec![Some("claude-3-opus".to_string())]
        );
    }

    #[tokio::test]
    async fn test_empty_name_is_error_decision() {
        let provider = Arc::new(MockProvider::found("free", "stroke", 0.9));
        let orch = orchestrator(vec![(
            descriptor("free", SourceCategory::Free, 0),
            provider.clone(),
        )]);
        let decisions = orch
            .run(
                vec![Candidate::new("c1", "  ")],
                &RunConfiguration::default(),
            )
            .await
            .unwrap();
        assert_eq!(decisions[0].reason, TerminationReason::Error);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_recent_only_filter() {
        let provider = Arc::new(MockProvider::found("free", "stroke", 0.9));
        let orch = orchestrator(vec![(
            descriptor("free", SourceCategory::Free, 0),
            provider.clone(),
        )]);
        let today = Utc::now().date_naive();
        let recent = fixtures::candidate("recent")
            .with_death_date(today.checked_sub_days(Days::new(3)).unwrap());
        let old = fixtures::candidate("old")
            .with_death_date(today.checked_sub_days(Days::new(400)).unwrap());
        let undated = Candidate::new("undated", "John Roe");
        let config = RunConfiguration {
            recent_only: true,
            ..RunConfiguration::default()
        };

        let decisions = orch.run(vec![recent, old, undated], &config).await.unwrap();
        let reasons: Vec<TerminationReason> = decisions.iter().map(|d| d.reason).collect();
        assert_eq!(
            reasons,
            vec![
                TerminationReason::Matched,
                TerminationReason::SkippedByFilter,
                TerminationReason::SkippedByFilter
            ]
        );
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn test_limit_preserves_order() {
        let orch = orchestrator(vec![(
            descriptor("free", SourceCategory::Free, 0),
            Arc::new(MockProvider::not_found("free")),
        )]);
        let config = RunConfiguration {
            limit: Some(2),
            ..RunConfiguration::default()
        };
        let decisions = orch
            .run(
                vec![
                    fixtures::candidate("a"),
                    fixtures::candidate("b"),
                    fixtures::candidate("c"),
                ],
                &config,
            )
            .await
            .unwrap();
        let ids: Vec<&str> = decisions.iter().map(|d| d.candidate_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_without_stop_on_match_keeps_best() {
        let orch = orchestrator(vec![
            (
                descriptor("first", SourceCategory::Free, 0),
                Arc::new(MockProvider::found("first", "pneumonia", 0.6)),
            ),
            (
                descriptor("second", SourceCategory::Paid, 0),
                Arc::new(MockProvider::found("second", "heart failure", 0.85)),
            ),
            (
                descriptor("third", SourceCategory::Ai, 0),
                Arc::new(MockProvider::found("third", "stroke", 0.7)),
            ),
        ]);
        let config = RunConfiguration {
            stop_on_match: false,
            ..RunConfiguration::default()
        };
        let decisions = orch
            .run(vec![fixtures::candidate("c1")], &config)
            .await
            .unwrap();
        let decision = &decisions[0];
        assert_eq!(decision.reason, TerminationReason::Matched);
        assert_eq!(decision.attempts.len(), 3);
        assert_eq!(decision.cause(), Some("heart failure"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_keeps_already_accepted_result() {
        let second = Arc::new(MockProvider::found("second", "stroke", 0.95));
        let orch = orchestrator(vec![
            (
                descriptor("first", SourceCategory::Free, 0),
                Arc::new(
                    MockProvider::found("first", "pneumonia", 0.8)
                        .with_delay(Duration::from_millis(50)),
                ),
            ),
            (descriptor("second", SourceCategory::Paid, 0), second.clone()),
        ]);
        let config = RunConfiguration {
            stop_on_match: false,
            ..RunConfiguration::default()
        };
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let decisions = orch
            .run_with_cancellation(vec![fixtures::candidate("c1")], &config, cancel)
            .await
            .unwrap();
        let decision = &decisions[0];
        assert_eq!(decision.reason, TerminationReason::Cancelled);
        assert!(decision.accepted);
        assert_eq!(decision.cause(), Some("pneumonia"));
        assert_eq!(decision.attempts.len(), 1);
        assert_eq!(second.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_becomes_failed_attempt() {
        let slow = Arc::new(
            MockProvider::found("slow", "stroke", 0.9).with_delay(Duration::from_secs(10)),
        );
        let orch = orchestrator(vec![(
            descriptor("slow", SourceCategory::Free, 0).with_timeout_secs(1),
            slow,
        )]);
        let decisions = orch
            .run(vec![fixtures::candidate("c1")], &RunConfiguration::default())
            .await
            .unwrap();
        let attempt = &decisions[0].attempts[0];
        assert_eq!(
            attempt.failure.as_ref().map(|f| f.kind),
            Some(FailureKind::Timeout)
        );
        assert_eq!(decisions[0].reason, TerminationReason::Exhausted);
    }

    #[tokio::test]
    async fn test_auth_failure_disables_source_for_run() {
        let browser = Arc::new(MockProvider::failing("nyt", || {
            SourceError::Authentication("bad password".to_string())
        }));
        let mut registry = SourceRegistry::new();
        registry
            .register(descriptor("nyt", SourceCategory::Paid, 0), browser.clone())
            .unwrap();
        let policy = PolicyConfig {
            max_concurrency: 1,
            ..PolicyConfig::default()
        };
        let orch = Orchestrator::new(Arc::new(registry), policy);
        let decisions = orch
            .run(
                vec![fixtures::candidate("a"), fixtures::candidate("b")],
                &RunConfiguration::default(),
            )
            .await
            .unwrap();
        assert_eq!(browser.call_count(), 1);
        for decision in &decisions {
            let failure = decision.attempts[0].failure.as_ref().unwrap();
            assert_eq!(failure.kind, FailureKind::AuthenticationFailure);
        }
        assert!(decisions[1].attempts[0]
            .failure
            .as_ref()
            .unwrap()
            .message
            .starts_with("disabled for this run"));
    }
}
