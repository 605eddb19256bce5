//! Root-cause explanation contract.
//!
//! Explanations come from an external text generator (typically a local LLM)
//! behind the [`Explainer`] trait. The engine never depends on it: a failed
//! or slow explainer yields [`EXPLANATION_UNAVAILABLE`]. [`RuleBasedExplainer`]
//! is the offline implementation.

use std::fmt::Write as _;

use async_trait::async_trait;

use crate::classifier::{extract_selector, Classification};
use crate::error::CollaboratorError;
use crate::flakiness::{FlakinessLevel, HistoricalStats};
use crate::record::{FailureRecord, FailureType};
use crate::retrieval::RetrievedFailure;

/// Report text used when no explanation could be produced.
pub const EXPLANATION_UNAVAILABLE: &str = "Root-cause explanation unavailable: the explanation \
service did not respond. Classification, flakiness and similar failures below are unaffected.";

/// Similar failures included in an evidence summary.
pub const EVIDENCE_SIMILAR_LIMIT: usize = 3;

/// What the pipeline already knows when it asks for an explanation.
#[derive(Debug, Clone, Copy)]
pub struct ExplanationContext<'a> {
    pub classification: &'a Classification,
    pub flakiness_probability: f64,
    pub similar: &'a [RetrievedFailure],
    /// Stored history for the failure's signature.
    pub history: &'a HistoricalStats,
}

#[async_trait]
pub trait Explainer: Send + Sync {
    async fn explain(
        &self,
        record: &FailureRecord,
        context: &ExplanationContext<'_>,
    ) -> Result<String, CollaboratorError>;

    fn name(&self) -> &str {
        "explainer"
    }
}

/// Plain-text evidence block describing the failure and its context.
pub fn evidence_summary(record: &FailureRecord, context: &ExplanationContext<'_>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "CURRENT FAILURE:");
    let _ = writeln!(out, "Test: {}", record.test_name);
    let _ = writeln!(out, "Error: {}", record.error_message);
    if let Some(kind) = record.metadata(crate::record::metadata_keys::ERROR_TYPE) {
        let _ = writeln!(out, "Type: {kind}");
    }
    if !record.stack_or_log_excerpt.is_empty() {
        let _ = writeln!(out, "Log excerpt:");
        for line in record.stack_or_log_excerpt.iter().take(10) {
            let _ = writeln!(out, "  {line}");
        }
    }
    let passed = record.retry_outcomes.iter().filter(|r| r.passed).count();
    let _ = writeln!(
        out,
        "Retries: {} ({} passed)",
        record.retry_outcomes.len(),
        passed
    );

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "CLASSIFICATION: {} (confidence {:.2})",
        context.classification.category, context.classification.confidence
    );
    let _ = writeln!(
        out,
        "FLAKINESS: {:.2} ({})",
        context.flakiness_probability,
        FlakinessLevel::from_score(context.flakiness_probability)
    );

    let history = context.history;
    if !history.is_empty() {
        let confirmed = (history.confirmed_fix_rate * f64::from(history.occurrences)).round();
        let _ = writeln!(out);
        let _ = writeln!(out, "TEST HISTORY ({} past failures):", history.occurrences);
        let _ = writeln!(out, "Distinct runs: {}", history.distinct_runs);
        let _ = writeln!(
            out,
            "Passed on retry: {:.0}%",
            history.pass_after_retry_rate * 100.0
        );
        let _ = writeln!(out, "Resolved: {confirmed}/{}", history.occurrences);
    }

    if !context.similar.is_empty() {
        let shown = context.similar.len().min(EVIDENCE_SIMILAR_LIMIT);
        let _ = writeln!(out);
        let _ = writeln!(out, "SIMILAR PAST FAILURES ({shown}):");
        for (i, hit) in context.similar.iter().take(EVIDENCE_SIMILAR_LIMIT).enumerate() {
            let _ = writeln!(
                out,
                "{}. {} (similarity {:.2})",
                i + 1,
                hit.record.failure.test_name,
                hit.similarity
            );
            let _ = writeln!(out, "   Error: {}", hit.record.failure.error_message);
            if let Some(res) = hit.resolution() {
                if let Some(cause) = &res.root_cause {
                    let _ = writeln!(out, "   Root cause: {cause}");
                }
                let _ = writeln!(out, "   Fix applied: {}", res.fix_description);
            }
        }
    }
    out
}

/// Deterministic per-category explanation, extended with the closest
/// historical fix.
pub fn rule_based_explanation(record: &FailureRecord, context: &ExplanationContext<'_>) -> String {
    let selector = extract_selector(&record.analysis_text());
    let mut text = match context.classification.category {
        FailureType::Timeout => {
            let target = selector
                .as_deref()
                .map(|s| format!(" for '{s}'"))
                .unwrap_or_default();
            format!(
                "The test '{}' ran out of time waiting{target}. Slow rendering or \
                 animations usually keep the element from reaching the expected state in time.",
                record.test_name
            )
        }
        FailureType::Selector => {
            let target = selector
                .as_deref()
                .map(|s| format!(" '{s}'"))
                .unwrap_or_default();
            format!(
                "The selector{target} no longer matches an element on the page. The UI \
                 structure most likely changed and the test's locators need updating."
            )
        }
        FailureType::Network => "A network failure stopped the test before it could finish. \
             Transient instability in the CI network or an unreliable external service is the \
             usual cause."
            .to_string(),
        FailureType::DataSetup => "Test data setup failed, most likely on a database \
             constraint or on data left behind by an earlier run. The test needs isolated data \
             and a reliable cleanup step."
            .to_string(),
        FailureType::Environment => "The CI environment was not in the state the test \
             expects. Look for a missing dependency, a configuration difference or a service \
             that was not running."
            .to_string(),
        FailureType::Unknown => format!(
            "The test '{}' failed with: {}",
            record.test_name,
            record.error_message.trim()
        ),
    };

    if context.flakiness_probability > 0.7 {
        text.push_str(" The failure looks intermittent, so a rerun is likely to pass.");
    }

    if let Some(res) = context.similar.first().and_then(|hit| hit.resolution()) {
        let _ = write!(
            text,
            " A similar failure was previously resolved by: {}",
            res.fix_description.trim()
        );
    }
    text
}

/// Offline explainer built on [`rule_based_explanation`].
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedExplainer;

#[async_trait]
impl Explainer for RuleBasedExplainer {
    async fn explain(
        &self,
        record: &FailureRecord,
        context: &ExplanationContext<'_>,
    ) -> Result<String, CollaboratorError> {
        Ok(rule_based_explanation(record, context))
    }

    fn name(&self) -> &str {
        "rule_based"
    }
}
