//! Failure classification.
//!
//! Rules are evaluated in an explicit priority list; the first category with
//! at least one matching pattern wins. Confidence grows with the number and
//! specificity of matched patterns:
//!
//! ```text
//! confidence = 0.45 + Σ weight(matched patterns)   (capped at 1.0)
//! no match   → unknown @ 0.30
//! ```
//!
//! A first match below [`AMBIGUITY_FLOOR`] yields to the next category in
//! priority order that clears it. When several categories matched and none
//! clears the floor, the verdict is ambiguous and resolves to `unknown`.

pub mod rules;

use serde::{Deserialize, Serialize};

use crate::record::{FailureRecord, FailureType};
pub use rules::extract_selector;
use rules::{rule_for, CategoryRule};

/// Confidence of a category with at least one matched pattern, before weights.
pub const MATCH_BASE_CONFIDENCE: f64 = 0.45;
/// Confidence assigned when nothing matches.
pub const UNKNOWN_CONFIDENCE: f64 = 0.3;
/// Matches below this yield to a stronger lower-priority category, or are
/// ambiguous when several weak categories matched.
pub const AMBIGUITY_FLOOR: f64 = 0.55;

/// Category plus confidence in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: FailureType,
    pub confidence: f64,
}

impl Classification {
    pub fn unknown() -> Self {
        Self {
            category: FailureType::Unknown,
            confidence: UNKNOWN_CONFIDENCE,
        }
    }
}

/// Full classifier output: the classification plus what drove it.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierVerdict {
    pub classification: Classification,
    /// Labels of the patterns behind the verdict; every weak match when
    /// ambiguous.
    pub matched_tokens: Vec<&'static str>,
    /// Non-empty when two or more categories matched too weakly to decide.
    pub ambiguous_between: Vec<FailureType>,
}

impl ClassifierVerdict {
    pub fn is_ambiguous(&self) -> bool {
        !self.ambiguous_between.is_empty()
    }
}

/// Rule evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub priority: Vec<FailureType>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            priority: FailureType::ALL
                .into_iter()
                .filter(|c| *c != FailureType::Unknown)
                .collect(),
        }
    }
}

impl ClassifierConfig {
    /// Priority with duplicates removed and missing categories appended in
    /// default order.
    pub fn effective_priority(&self) -> Vec<FailureType> {
        let mut order: Vec<FailureType> = Vec::new();
        let defaults = Self::default().priority;
        for cat in self.priority.iter().chain(defaults.iter()) {
            if *cat != FailureType::Unknown && !order.contains(cat) {
                order.push(*cat);
            }
        }
        order
    }
}

#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<&'static CategoryRule>,
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new(&ClassifierConfig::default())
    }
}

impl Classifier {
    pub fn new(config: &ClassifierConfig) -> Self {
        let rules = config
            .effective_priority()
            .into_iter()
            .filter_map(rule_for)
            .collect();
        Self { rules }
    }

    /// Categories in evaluation order.
    pub fn priority(&self) -> Vec<FailureType> {
        self.rules.iter().map(|r| r.category).collect()
    }

    pub fn classify(&self, record: &FailureRecord) -> Classification {
        self.classify_detailed(record).classification
    }

    pub fn classify_detailed(&self, record: &FailureRecord) -> ClassifierVerdict {
        self.classify_text(&record.analysis_text())
    }

    /// Classify free text (error message plus excerpt lines).
    pub fn classify_text(&self, text: &str) -> ClassifierVerdict {
        let mut candidates: Vec<(FailureType, Vec<&'static str>, f64)> = self
            .rules
            .iter()
            .filter_map(|rule| {
                let matched = rule.matched(text);
                if matched.is_empty() {
                    return None;
                }
                let weight: f64 = matched.iter().map(|p| p.weight).sum();
                let confidence = (MATCH_BASE_CONFIDENCE + weight).min(1.0);
                let labels = matched.iter().map(|p| p.label).collect();
                Some((rule.category, labels, confidence))
            })
            .collect();

        if candidates.is_empty() {
            return ClassifierVerdict {
                classification: Classification::unknown(),
                matched_tokens: Vec::new(),
                ambiguous_between: Vec::new(),
            };
        }

        // First category in priority order that clears the floor; a weak
        // first match yields to a strong lower-priority one.
        let chosen = candidates
            .iter()
            .position(|(_, _, confidence)| *confidence >= AMBIGUITY_FLOOR)
            .or_else(|| (candidates.len() == 1).then_some(0));

        let Some(idx) = chosen else {
            let between: Vec<FailureType> = candidates.iter().map(|(c, _, _)| *c).collect();
            let matched_tokens = candidates
                .into_iter()
                .flat_map(|(_, tokens, _)| tokens)
                .collect();
            tracing::debug!(
                candidates = ?between,
                "Weak classification matched several categories, resolving to unknown"
            );
            return ClassifierVerdict {
                classification: Classification::unknown(),
                matched_tokens,
                ambiguous_between: between,
            };
        };

        let (category, matched_tokens, confidence) = candidates.swap_remove(idx);
        tracing::debug!(%category, confidence, tokens = ?matched_tokens, "Classified failure");
        ClassifierVerdict {
            classification: Classification {
                category,
                confidence,
            },
            matched_tokens,
            ambiguous_between: Vec::new(),
        }
    }
}
