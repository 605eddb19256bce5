//! Overall report confidence.
//!
//! ```text
//! evidence = top_similarity × (0.5 + 0.5 × resolved_fraction)
//! overall  = w_c × classification + w_r × evidence + w_s × top_suggestion
//! overall ×= flaky_penalty            if flakiness > flaky_threshold
//! ```

use serde::{Deserialize, Serialize};

use crate::retrieval::RetrievedFailure;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceWeights {
    pub classification: f64,
    pub retrieval: f64,
    pub suggestion: f64,
    /// Multiplier applied when the failure looks flaky.
    pub flaky_penalty: f64,
    pub flaky_threshold: f64,
}

impl Default for ConfidenceWeights {
    fn default() -> Self {
        Self {
            classification: 0.4,
            retrieval: 0.35,
            suggestion: 0.25,
            flaky_penalty: 0.9,
            flaky_threshold: 0.7,
        }
    }
}

/// How much the retrieved history backs the report, in [0, 1].
pub fn retrieval_evidence(retrieved: &[RetrievedFailure]) -> f64 {
    let Some(top) = retrieved.first() else {
        return 0.0;
    };
    let resolved = retrieved.iter().filter(|r| r.resolution().is_some()).count();
    let resolved_fraction = resolved as f64 / retrieved.len() as f64;
    (top.similarity * (0.5 + 0.5 * resolved_fraction)).clamp(0.0, 1.0)
}

pub fn overall_confidence(
    weights: &ConfidenceWeights,
    classification_confidence: f64,
    retrieved: &[RetrievedFailure],
    top_suggestion: Option<f64>,
    flakiness: f64,
) -> f64 {
    let sum = weights.classification + weights.retrieval + weights.suggestion;
    let defaults = ConfidenceWeights::default();
    let (wc, wr, ws) = if sum.is_finite() && sum > f64::EPSILON {
        (
            weights.classification / sum,
            weights.retrieval / sum,
            weights.suggestion / sum,
        )
    } else {
        (defaults.classification, defaults.retrieval, defaults.suggestion)
    };

    let mut score = wc * classification_confidence
        + wr * retrieval_evidence(retrieved)
        + ws * top_suggestion.unwrap_or(0.0);
    if flakiness > weights.flaky_threshold {
        score *= weights.flaky_penalty;
    }
    if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{FailureRecord, FailureType, HistoricalRecord, Resolution};

    fn hit(similarity: f64, resolved: bool) -> RetrievedFailure {
        let failure = FailureRecord::new("t", "e");
        let res = resolved.then(|| Resolution::new(&failure, FailureType::Timeout, "fix"));
        RetrievedFailure::new(HistoricalRecord::new(failure, res), similarity)
    }

    #[test]
    fn test_no_retrieval_evidence() {
        assert_eq!(retrieval_evidence(&[]), 0.0);
    }

    #[test]
    fn test_evidence_scales_with_resolved_fraction() {
        let all = [hit(0.8, true), hit(0.5, true)];
        let half = [hit(0.8, true), hit(0.5, false)];
        assert!((retrieval_evidence(&all) - 0.8).abs() < 1e-9);
        assert!((retrieval_evidence(&half) - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_overall_formula() {
        let w = ConfidenceWeights::default();
        let score = overall_confidence(&w, 0.8, &[], Some(0.72), 0.5);
        assert!((score - (0.4 * 0.8 + 0.25 * 0.72)).abs() < 1e-9);
    }

    #[test]
    fn test_flaky_penalty() {
        let w = ConfidenceWeights::default();
        let calm = overall_confidence(&w, 0.8, &[], Some(0.72), 0.5);
        let flaky = overall_confidence(&w, 0.8, &[], Some(0.72), 0.8);
        assert!((flaky - calm * 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_degenerate_weights_fall_back() {
        let w = ConfidenceWeights {
            classification: 0.0,
            retrieval: 0.0,
            suggestion: 0.0,
            ..ConfidenceWeights::default()
        };
        let score = overall_confidence(&w, 1.0, &[], Some(1.0), 0.0);
        assert!((score - 0.65).abs() < 1e-9);
        assert!(overall_confidence(&ConfidenceWeights::default(), f64::NAN, &[], None, 0.0) == 0.0);
    }
}
