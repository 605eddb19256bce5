use serde::{Deserialize, Serialize};

use super::stats::HistoricalStats;
use crate::record::{failure_signature, FailureRecord, FailureType};

/// Retry signal when a failed retry diverged from the original error.
pub const DIVERGENT_RETRY_SIGNAL: f64 = 0.5;
/// Distinct runs needed before history saturates its recurrence factor.
const RECURRENCE_SATURATION_RUNS: f64 = 3.0;

/// Relative weights of the three flakiness signals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlakinessWeights {
    pub retry: f64,
    pub history: f64,
    pub prior: f64,
}

impl Default for FlakinessWeights {
    fn default() -> Self {
        Self {
            retry: 0.6,
            history: 0.15,
            prior: 0.25,
        }
    }
}

impl FlakinessWeights {
    /// Rescaled to sum to 1. Negative or non-finite weights fall back to
    /// the defaults.
    pub fn normalized(self) -> Self {
        let parts = [self.retry, self.history, self.prior];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Self::default();
        }
        let sum: f64 = parts.iter().sum();
        if sum <= f64::EPSILON {
            return Self::default();
        }
        Self {
            retry: self.retry / sum,
            history: self.history / sum,
            prior: self.prior / sum,
        }
    }
}

/// Individual signals behind a score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlakinessBreakdown {
    pub retry_signal: f64,
    pub history_signal: f64,
    pub prior_signal: f64,
    pub score: f64,
}

/// Bands used when rendering or filtering scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlakinessLevel {
    NotFlaky,
    Low,
    Medium,
    High,
}

impl FlakinessLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else if score >= 0.3 {
            Self::Low
        } else {
            Self::NotFlaky
        }
    }
}

impl std::fmt::Display for FlakinessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFlaky => write!(f, "not flaky"),
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FlakinessScorer {
    weights: FlakinessWeights,
}

impl FlakinessScorer {
    pub fn new(weights: FlakinessWeights) -> Self {
        Self {
            weights: weights.normalized(),
        }
    }

    pub fn weights(&self) -> FlakinessWeights {
        self.weights
    }

    /// Probability in [0, 1] that the failure is flaky.
    pub fn score(
        &self,
        record: &FailureRecord,
        stats: &HistoricalStats,
        category: FailureType,
    ) -> f64 {
        self.breakdown(record, stats, category).score
    }

    pub fn breakdown(
        &self,
        record: &FailureRecord,
        stats: &HistoricalStats,
        category: FailureType,
    ) -> FlakinessBreakdown {
        let w = self.weights;
        let retry_signal = retry_signal(record, category);
        let history_signal = history_signal(stats);
        let prior_signal = category.flakiness_prior();
        let score = (w.retry * retry_signal + w.history * history_signal + w.prior * prior_signal)
            .clamp(0.0, 1.0);
        FlakinessBreakdown {
            retry_signal,
            history_signal,
            prior_signal,
            score,
        }
    }
}

/// Evidence from the record's own retries.
///
/// Any pass is the strongest flakiness signal. A failed retry with a
/// different error signature is weaker evidence. Identical re-failures
/// point at a deterministic bug. Without retries, fall back to the prior.
pub fn retry_signal(record: &FailureRecord, category: FailureType) -> f64 {
    if record.retry_outcomes.is_empty() {
        return category.flakiness_prior();
    }
    if record.passed_on_retry() {
        return 1.0;
    }
    let signature = record.signature();
    let diverged = record.retry_outcomes.iter().any(|r| {
        r.error_message
            .as_deref()
            .is_some_and(|msg| failure_signature(msg) != signature)
    });
    if diverged {
        DIVERGENT_RETRY_SIGNAL
    } else {
        0.0
    }
}

/// Evidence from past occurrences of the same failure.
pub fn history_signal(stats: &HistoricalStats) -> f64 {
    if stats.distinct_runs < 2 {
        return 0.0;
    }
    let recurrence = (stats.distinct_runs as f64 / RECURRENCE_SATURATION_RUNS).min(1.0);
    let pass_rate = stats.pass_after_retry_rate.clamp(0.0, 1.0);
    let fixed_rate = stats.confirmed_fix_rate.clamp(0.0, 1.0);
    (recurrence * (0.3 + 0.7 * pass_rate) * (1.0 - 0.5 * fixed_rate)).clamp(0.0, 1.0)
}
