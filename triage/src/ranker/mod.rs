//! Suggestion ranking.
//!
//! Candidates come from two places: fixes attached to retrieved historical
//! failures, and the static per-category heuristic table. They are merged
//! (historical first), stable-sorted by confidence, and near-duplicates are
//! dropped keeping the higher-ranked entry. High flakiness adds advisories
//! on top.

pub mod heuristics;

use serde::{Deserialize, Serialize};

use crate::classifier::Classification;
use crate::record::FailureType;
use crate::retrieval::RetrievedFailure;
use heuristics::{concrete_selector_suggestion, heuristics_for};

/// Always the first suggestion when flakiness exceeds the flaky threshold.
///
/// Its confidence is the flakiness probability, raised to the top remaining
/// suggestion's confidence when that is higher so the list stays sorted.
pub const LIKELY_FLAKY_SUGGESTION: &str =
    "Likely flaky — consider rerun before deeper investigation";
/// Added when flakiness reaches the quarantine threshold.
pub const QUARANTINE_SUGGESTION: &str =
    "Consider quarantining the test until its flakiness is fixed";
/// Confidence factor for historical fixes whose outcome was never confirmed.
pub const UNCONFIRMED_FIX_FACTOR: f64 = 0.5;
const QUARANTINE_WEIGHT: f64 = 0.8;

/// Where a suggestion came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionSource {
    /// Static per-category table or a flakiness advisory.
    Heuristic,
    /// Fix recorded on a retrieved historical failure.
    Historical,
}

/// One ranked remediation step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedAction {
    /// Human-readable action.
    pub description: String,
    /// Ranking score in [0, 1].
    pub confidence: f64,
    pub source: SuggestionSource,
}

impl SuggestedAction {
    fn new(description: impl Into<String>, confidence: f64, source: SuggestionSource) -> Self {
        Self {
            description: description.into(),
            confidence: confidence.clamp(0.0, 1.0),
            source,
        }
    }
}

/// Advisory thresholds and output cap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankerConfig {
    /// Flakiness above this prepends the rerun advisory.
    pub flaky_threshold: f64,
    /// Flakiness at or above this adds the quarantine advisory.
    pub quarantine_threshold: f64,
    /// Cap on returned suggestions, applied after dedup.
    pub max_suggestions: Option<usize>,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            flaky_threshold: 0.7,
            quarantine_threshold: 0.85,
            max_suggestions: Some(6),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SuggestionRanker {
    config: RankerConfig,
}

impl SuggestionRanker {
    pub fn new(config: RankerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    pub fn rank(
        &self,
        classification: &Classification,
        flakiness: f64,
        retrieved: &[RetrievedFailure],
    ) -> Vec<SuggestedAction> {
        self.rank_with_selector(classification, flakiness, retrieved, None)
    }

    /// Like [`rank`](Self::rank), naming the failing selector in the first
    /// selector heuristic when it is known.
    pub fn rank_with_selector(
        &self,
        classification: &Classification,
        flakiness: f64,
        retrieved: &[RetrievedFailure],
        selector: Option<&str>,
    ) -> Vec<SuggestedAction> {
        let flakiness = if flakiness.is_finite() {
            flakiness.clamp(0.0, 1.0)
        } else {
            0.0
        };
        let mut candidates: Vec<SuggestedAction> = Vec::new();

        for hit in retrieved {
            let Some(resolution) = hit.resolution() else {
                continue;
            };
            let fix = resolution.fix_description.trim();
            if fix.is_empty() {
                continue;
            }
            let factor = if resolution.outcome_confirmed {
                1.0
            } else {
                UNCONFIRMED_FIX_FACTOR
            };
            candidates.push(SuggestedAction::new(
                format!("Apply similar fix: {fix}"),
                hit.similarity * factor,
                SuggestionSource::Historical,
            ));
        }

        for (idx, heuristic) in heuristics_for(classification.category).iter().enumerate() {
            let description = match selector {
                Some(sel) if idx == 0 && classification.category == FailureType::Selector => {
                    concrete_selector_suggestion(sel)
                }
                _ => heuristic.description.to_string(),
            };
            candidates.push(SuggestedAction::new(
                description,
                classification.confidence * heuristic.weight,
                SuggestionSource::Heuristic,
            ));
        }

        if flakiness >= self.config.quarantine_threshold {
            candidates.push(SuggestedAction::new(
                QUARANTINE_SUGGESTION,
                flakiness * QUARANTINE_WEIGHT,
                SuggestionSource::Heuristic,
            ));
        }

        // Vec::sort_by is stable, so historical entries win confidence ties.
        candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

        let mut ranked: Vec<SuggestedAction> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if ranked
                .iter()
                .any(|kept| is_near_duplicate(&kept.description, &candidate.description))
            {
                continue;
            }
            ranked.push(candidate);
        }

        if flakiness > self.config.flaky_threshold {
            ranked.retain(|a| !is_near_duplicate(&a.description, LIKELY_FLAKY_SUGGESTION));
            let top = ranked.first().map_or(0.0, |a| a.confidence);
            ranked.insert(
                0,
                SuggestedAction::new(
                    LIKELY_FLAKY_SUGGESTION,
                    flakiness.max(top),
                    SuggestionSource::Heuristic,
                ),
            );
        }

        if let Some(max) = self.config.max_suggestions {
            ranked.truncate(max);
        }
        ranked
    }
}

/// Lower-case, alphanumeric words only, single-spaced.
fn normalize_description(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Case-insensitive substring (which covers prefix) match after normalization.
pub fn is_near_duplicate(a: &str, b: &str) -> bool {
    let a = normalize_description(a);
    let b = normalize_description(b);
    if a.is_empty() || b.is_empty() {
        return a == b;
    }
    a.contains(&b) || b.contains(&a)
}
