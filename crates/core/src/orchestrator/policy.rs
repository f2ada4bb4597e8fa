//! Whether a source result is good enough to stop on.

use crate::source::{SourceCategory, SourceResult};

/// Float slack for the margin comparison, so 0.70 - 0.55 counts as 0.15.
const MARGIN_EPSILON: f64 = 1e-9;

/// Why a result was not accepted.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    Failed,
    NoCause,
    BelowThreshold { confidence: f64, threshold: f64 },
    /// The best cause does not lead the runner-up by enough.
    Ambiguous { top: f64, second: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Accepted,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }
}

/// Acceptance rules for one run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AcceptancePolicy {
    pub threshold: f64,
    pub min_margin: f64,
}

impl AcceptancePolicy {
    pub fn new(threshold: f64, min_margin: f64) -> Self {
        Self {
            threshold,
            min_margin,
        }
    }

    pub fn evaluate(&self, result: &SourceResult) -> Verdict {
        if result.is_failure() {
            return Verdict::Rejected(Rejection::Failed);
        }
        if result.cause.as_deref().map_or(true, |c| c.trim().is_empty()) {
            return Verdict::Rejected(Rejection::NoCause);
        }
        if result.confidence < self.threshold {
            return Verdict::Rejected(Rejection::BelowThreshold {
                confidence: result.confidence,
                threshold: self.threshold,
            });
        }
        if result.category != SourceCategory::Ai && result.alternatives.len() >= 2 {
            let (top, second) = top_two(result);
            // The leader must strictly beat the runner-up whatever the margin.
            if top <= second || top - second + MARGIN_EPSILON < self.min_margin {
                return Verdict::Rejected(Rejection::Ambiguous { top, second });
            }
        }
        Verdict::Accepted
    }

    pub fn accepts(&self, result: &SourceResult) -> bool {
        self.evaluate(result).is_accepted()
    }
}

fn top_two(result: &SourceResult) -> (f64, f64) {
    let mut top = f64::MIN;
    let mut second = f64::MIN;
    for alt in &result.alternatives {
        if alt.score > top {
            second = top;
            top = alt.score;
        } else if alt.score > second {
            second = alt.score;
        }
    }
    (top, second)
}
