//! The triage report: built once at the end of a run, read-only afterwards.

use serde::{Deserialize, Serialize};

use crate::classifier::Classification;
use crate::error::{TriageErrorKind, TriageWarning};
use crate::flakiness::FlakinessLevel;
use crate::ranker::SuggestedAction;
use crate::record::Resolution;
use crate::retrieval::RetrievedFailure;

/// Report view of a retrieved historical failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarFailure {
    /// Id of the historical record.
    pub record_id: String,
    pub test_name: String,
    /// Error message of the past failure.
    pub error_message: String,
    /// Normalized similarity in [0, 1].
    pub similarity: f64,
    /// How the past failure was fixed, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl From<&RetrievedFailure> for SimilarFailure {
    fn from(hit: &RetrievedFailure) -> Self {
        Self {
            record_id: hit.record.id.clone(),
            test_name: hit.record.failure.test_name.clone(),
            error_message: hit.record.failure.error_message.clone(),
            similarity: hit.similarity,
            resolution: hit.record.resolution.clone(),
        }
    }
}

/// JSON field names are a stable interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriageReport {
    pub(crate) test_name: String,
    pub(crate) classification: Classification,
    pub(crate) flakiness_probability: f64,
    pub(crate) root_cause_explanation: String,
    pub(crate) suggested_actions: Vec<SuggestedAction>,
    pub(crate) similar_failures: Vec<SimilarFailure>,
    pub(crate) overall_confidence: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub(crate) warnings: Vec<TriageWarning>,
}

impl TriageReport {
    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn classification(&self) -> &Classification {
        &self.classification
    }

    pub fn flakiness_probability(&self) -> f64 {
        self.flakiness_probability
    }

    pub fn flakiness_level(&self) -> FlakinessLevel {
        FlakinessLevel::from_score(self.flakiness_probability)
    }

    pub fn root_cause_explanation(&self) -> &str {
        &self.root_cause_explanation
    }

    pub fn suggested_actions(&self) -> &[SuggestedAction] {
        &self.suggested_actions
    }

    pub fn similar_failures(&self) -> &[SimilarFailure] {
        &self.similar_failures
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn warnings(&self) -> &[TriageWarning] {
        &self.warnings
    }

    pub fn has_warning(&self, kind: TriageErrorKind) -> bool {
        self.warnings.iter().any(|w| w.kind == kind)
    }

    /// True when any collaborator was unavailable for this report.
    pub fn is_degraded(&self) -> bool {
        self.warnings.iter().any(|w| w.kind.is_error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FailureType;

    fn report(warnings: Vec<TriageWarning>) -> TriageReport {
        TriageReport {
            test_name: "test_a".into(),
            classification: Classification {
                category: FailureType::Network,
                confidence: 0.8,
            },
            flakiness_probability: 0.775,
            root_cause_explanation: "net".into(),
            suggested_actions: Vec::new(),
            similar_failures: Vec::new(),
            overall_confidence: 0.5,
            warnings,
        }
    }

    #[test]
    fn test_stable_json_field_names() {
        let json = serde_json::to_value(report(Vec::new())).unwrap();
        for key in [
            "classification",
            "flakiness_probability",
            "root_cause_explanation",
            "suggested_actions",
            "similar_failures",
            "overall_confidence",
        ] {
            assert!(json.get(key).is_some(), "missing {key}");
        }
        assert!(json.get("warnings").is_none());
        assert_eq!(json["classification"]["category"], "network");
    }

    #[test]
    fn test_warning_queries() {
        let r = report(vec![TriageWarning::new(
            TriageErrorKind::InternalClassificationAmbiguity,
            "timeout vs selector",
        )]);
        assert!(r.has_warning(TriageErrorKind::InternalClassificationAmbiguity));
        assert!(!r.is_degraded());
        assert_eq!(r.flakiness_level(), FlakinessLevel::High);

        let r = report(vec![TriageWarning::new(TriageErrorKind::RetrievalUnavailable, "down")]);
        assert!(r.is_degraded());
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["warnings"][0]["kind"], "retrieval_unavailable");
    }

    #[test]
    fn test_roundtrip_json() {
        let r = report(Vec::new());
        let back: TriageReport = serde_json::from_str(&serde_json::to_string(&r).unwrap()).unwrap();
        assert_eq!(back, r);
    }
}
