//! The pure triage pipeline.
//!
//! Each stage consumes the previous stage's run value and returns the next,
//! so stages cannot be skipped or reordered; the state machine inside each
//! run still validates and records every transition. Nothing here performs
//! I/O: collaborator results arrive as [`CallOutcome`]s, which makes a run a
//! pure function of `(record, stats, retrieval outcome, explanation outcome)`.

use crate::classifier::{extract_selector, Classification, Classifier, ClassifierVerdict};
use crate::error::{TriageError, TriageErrorKind, TriageWarning};
use crate::explain::{ExplanationContext, EXPLANATION_UNAVAILABLE};
use crate::flakiness::{FlakinessBreakdown, FlakinessScorer, HistoricalStats};
use crate::ranker::{SuggestedAction, SuggestionRanker};
use crate::record::{FailureRecord, FailureType};
use crate::report::{SimilarFailure, TriageReport};
use crate::resilience::CallOutcome;
use crate::retrieval::{normalize_results, RetrievedFailure};

use super::confidence::{overall_confidence, ConfidenceWeights};
use super::engine::EngineConfig;
use super::state_machine::{TransitionRecord, TriageState, TriageStateMachine};

/// State shared by every stage of one run.
#[derive(Debug, Clone)]
struct RunLog {
    record: FailureRecord,
    machine: TriageStateMachine,
    warnings: Vec<TriageWarning>,
    /// History of the record's signature, known from `Scored` on.
    history: HistoricalStats,
}

impl RunLog {
    fn advance(&mut self, to: TriageState, reason: String) -> Result<(), TriageError> {
        self.machine.advance(to, Some(&reason))?;
        Ok(())
    }
}

/// A validated record, ready to classify.
#[derive(Debug, Clone)]
pub struct ReceivedRun {
    log: RunLog,
}

#[derive(Debug, Clone)]
pub struct ClassifiedRun {
    log: RunLog,
    verdict: ClassifierVerdict,
}

#[derive(Debug, Clone)]
pub struct ScoredRun {
    log: RunLog,
    verdict: ClassifierVerdict,
    flakiness: FlakinessBreakdown,
}

#[derive(Debug, Clone)]
pub struct RetrievedRun {
    log: RunLog,
    verdict: ClassifierVerdict,
    flakiness: FlakinessBreakdown,
    retrieved: Vec<RetrievedFailure>,
}

/// Everything but the explanation: the run in state `Ranked`.
#[derive(Debug, Clone)]
pub struct Analysis {
    log: RunLog,
    verdict: ClassifierVerdict,
    flakiness: FlakinessBreakdown,
    retrieved: Vec<RetrievedFailure>,
    suggestions: Vec<SuggestedAction>,
    overall_confidence: f64,
}

impl ReceivedRun {
    pub fn record(&self) -> &FailureRecord {
        &self.log.record
    }
}

impl ClassifiedRun {
    pub fn record(&self) -> &FailureRecord {
        &self.log.record
    }

    pub fn classification(&self) -> &Classification {
        &self.verdict.classification
    }
}

impl ScoredRun {
    pub fn record(&self) -> &FailureRecord {
        &self.log.record
    }

    pub fn flakiness_probability(&self) -> f64 {
        self.flakiness.score
    }
}

impl RetrievedRun {
    pub fn record(&self) -> &FailureRecord {
        &self.log.record
    }

    pub fn retrieved(&self) -> &[RetrievedFailure] {
        &self.retrieved
    }
}

impl Analysis {
    pub fn record(&self) -> &FailureRecord {
        &self.log.record
    }

    pub fn classification(&self) -> &Classification {
        &self.verdict.classification
    }

    pub fn matched_tokens(&self) -> &[&'static str] {
        &self.verdict.matched_tokens
    }

    pub fn flakiness_probability(&self) -> f64 {
        self.flakiness.score
    }

    pub fn flakiness_breakdown(&self) -> &FlakinessBreakdown {
        &self.flakiness
    }

    pub fn retrieved(&self) -> &[RetrievedFailure] {
        &self.retrieved
    }

    pub fn suggestions(&self) -> &[SuggestedAction] {
        &self.suggestions
    }

    pub fn overall_confidence(&self) -> f64 {
        self.overall_confidence
    }

    pub fn warnings(&self) -> &[TriageWarning] {
        &self.log.warnings
    }

    pub fn state(&self) -> TriageState {
        self.log.machine.current()
    }

    pub fn transitions(&self) -> &[TransitionRecord] {
        self.log.machine.transitions()
    }

    pub fn explanation_context(&self) -> ExplanationContext<'_> {
        ExplanationContext {
            classification: &self.verdict.classification,
            flakiness_probability: self.flakiness.score,
            similar: &self.retrieved,
            history: &self.log.history,
        }
    }

    /// Attach the explanation and build the report (`Ranked → Reported`).
    pub fn into_report(mut self, explanation: CallOutcome<String>) -> Result<TriageReport, TriageError> {
        let explanation = match explanation {
            CallOutcome::Completed(text) if !text.trim().is_empty() => text.trim().to_string(),
            CallOutcome::Completed(_) => {
                self.degrade_explanation("explainer returned empty text".to_string());
                EXPLANATION_UNAVAILABLE.to_string()
            }
            other => {
                let detail = other
                    .failure_detail()
                    .unwrap_or_else(|| "explainer unavailable".to_string());
                self.degrade_explanation(detail);
                EXPLANATION_UNAVAILABLE.to_string()
            }
        };

        let reason = format!("{} warning(s)", self.log.warnings.len());
        self.log.advance(TriageState::Reported, reason)?;
        tracing::debug!(summary = %self.log.machine.summary(), "Triage run finished");

        Ok(TriageReport {
            test_name: self.log.record.test_name,
            classification: self.verdict.classification,
            flakiness_probability: self.flakiness.score,
            root_cause_explanation: explanation,
            suggested_actions: self.suggestions,
            similar_failures: self.retrieved.iter().map(SimilarFailure::from).collect(),
            overall_confidence: self.overall_confidence,
            warnings: self.log.warnings,
        })
    }

    fn degrade_explanation(&mut self, detail: String) {
        tracing::warn!(
            test = %self.log.record.test_name,
            detail = %detail,
            "Explanation unavailable, using fallback text"
        );
        self.log
            .warnings
            .push(TriageWarning::new(TriageErrorKind::ExplanationUnavailable, detail));
    }
}

/// Deterministic components of a triage run.
#[derive(Debug, Clone)]
pub struct TriagePipeline {
    classifier: Classifier,
    scorer: FlakinessScorer,
    ranker: SuggestionRanker,
    confidence: ConfidenceWeights,
    top_k: usize,
}

impl Default for TriagePipeline {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl TriagePipeline {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            classifier: Classifier::new(&config.classifier),
            scorer: FlakinessScorer::new(config.flakiness),
            ranker: SuggestionRanker::new(config.ranker.clone()),
            confidence: config.confidence,
            top_k: config.top_k,
        }
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn scorer(&self) -> &FlakinessScorer {
        &self.scorer
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Validate the record and open a run.
    pub fn receive(&self, record: FailureRecord) -> Result<ReceivedRun, TriageError> {
        record.validate()?;
        tracing::debug!(test = %record.test_name, "Triage run received");
        Ok(ReceivedRun {
            log: RunLog {
                record,
                machine: TriageStateMachine::new(),
                warnings: Vec::new(),
                history: HistoricalStats::empty(),
            },
        })
    }

    pub fn classify(&self, run: ReceivedRun) -> Result<ClassifiedRun, TriageError> {
        let ReceivedRun { mut log } = run;
        let verdict = self.classifier.classify_detailed(&log.record);

        if verdict.is_ambiguous() {
            let names: Vec<&str> = verdict
                .ambiguous_between
                .iter()
                .map(|c| c.as_str())
                .collect();
            log.warnings.push(TriageWarning::new(
                TriageErrorKind::InternalClassificationAmbiguity,
                format!("weak matches for {}; classified as unknown", names.join(", ")),
            ));
        }

        let c = verdict.classification;
        log.advance(
            TriageState::Classified,
            format!("{} @ {:.2}", c.category, c.confidence),
        )?;
        Ok(ClassifiedRun { log, verdict })
    }

    pub fn score(&self, run: ClassifiedRun, stats: &HistoricalStats) -> Result<ScoredRun, TriageError> {
        let ClassifiedRun { mut log, verdict } = run;
        let flakiness =
            self.scorer
                .breakdown(&log.record, stats, verdict.classification.category);
        log.history = *stats;
        log.advance(TriageState::Scored, format!("flakiness {:.2}", flakiness.score))?;
        Ok(ScoredRun {
            log,
            verdict,
            flakiness,
        })
    }

    /// Fold a retriever outcome into the run. Failures become an empty list
    /// plus a `RetrievalUnavailable` warning.
    pub fn attach_retrieval(
        &self,
        run: ScoredRun,
        outcome: CallOutcome<Vec<RetrievedFailure>>,
    ) -> Result<RetrievedRun, TriageError> {
        let ScoredRun {
            mut log,
            verdict,
            flakiness,
        } = run;

        let retrieved = match outcome {
            CallOutcome::Completed(hits) => normalize_results(hits, self.top_k),
            other => {
                let detail = other
                    .failure_detail()
                    .unwrap_or_else(|| "retriever unavailable".to_string());
                tracing::warn!(
                    test = %log.record.test_name,
                    detail = %detail,
                    "Similarity retrieval unavailable, continuing without history"
                );
                log.warnings.push(TriageWarning::new(
                    TriageErrorKind::RetrievalUnavailable,
                    detail,
                ));
                Vec::new()
            }
        };

        log.advance(
            TriageState::Retrieved,
            format!("{} similar failure(s)", retrieved.len()),
        )?;
        Ok(RetrievedRun {
            log,
            verdict,
            flakiness,
            retrieved,
        })
    }

    pub fn rank(&self, run: RetrievedRun) -> Result<Analysis, TriageError> {
        let RetrievedRun {
            mut log,
            verdict,
            flakiness,
            retrieved,
        } = run;
        let classification = verdict.classification;

        let selector = (classification.category == FailureType::Selector)
            .then(|| extract_selector(&log.record.analysis_text()))
            .flatten();
        let suggestions = self.ranker.rank_with_selector(
            &classification,
            flakiness.score,
            &retrieved,
            selector.as_deref(),
        );
        let overall = overall_confidence(
            &self.confidence,
            classification.confidence,
            &retrieved,
            suggestions.first().map(|s| s.confidence),
            flakiness.score,
        );

        log.advance(
            TriageState::Ranked,
            format!("{} suggestion(s), confidence {:.2}", suggestions.len(), overall),
        )?;
        Ok(Analysis {
            log,
            verdict,
            flakiness,
            retrieved,
            suggestions,
            overall_confidence: overall,
        })
    }

    /// Run every deterministic stage up to `Ranked`.
    pub fn analyze(
        &self,
        record: FailureRecord,
        stats: &HistoricalStats,
        retrieval: CallOutcome<Vec<RetrievedFailure>>,
    ) -> Result<Analysis, TriageError> {
        let run = self.receive(record)?;
        let run = self.classify(run)?;
        let run = self.score(run, stats)?;
        let run = self.attach_retrieval(run, retrieval)?;
        self.rank(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{HistoricalRecord, Resolution, RetryOutcome};

    fn login_record() -> FailureRecord {
        FailureRecord::new("test_user_login", "TimeoutError: selector '#user-dashboard' not visible")
    }

    #[test]
    fn test_analysis_walks_all_states() {
        let pipeline = TriagePipeline::default();
        let analysis = pipeline
            .analyze(login_record(), &HistoricalStats::empty(), CallOutcome::Completed(vec![]))
            .unwrap();
        assert_eq!(analysis.state(), TriageState::Ranked);
        let states: Vec<_> = analysis.transitions().iter().map(|t| t.to).collect();
        assert_eq!(
            states,
            vec![
                TriageState::Classified,
                TriageState::Scored,
                TriageState::Retrieved,
                TriageState::Ranked
            ]
        );
        let report = analysis
            .into_report(CallOutcome::Completed("explained".into()))
            .unwrap();
        assert_eq!(report.root_cause_explanation(), "explained");
        assert!(report.warnings().is_empty());
    }

    #[test]
    fn test_explanation_context_carries_history() {
        let pipeline = TriagePipeline::default();
        let past = HistoricalRecord::new(login_record().with_retry(RetryOutcome::passed(1)), None);
        let stats = HistoricalStats::from_history([&past, &past]);
        let analysis = pipeline
            .analyze(login_record(), &stats, CallOutcome::Completed(vec![]))
            .unwrap();
        let ctx = analysis.explanation_context();
        assert_eq!(ctx.history.occurrences, 2);
        assert_eq!(ctx.history.pass_after_retry_rate, 1.0);
    }

    #[test]
    fn test_unparsable_record_rejected_before_classification() {
        let pipeline = TriagePipeline::default();
        let err = pipeline
            .analyze(
                FailureRecord::new("", "boom"),
                &HistoricalStats::empty(),
                CallOutcome::Completed(vec![]),
            )
            .unwrap_err();
        assert_eq!(err.kind(), Some(TriageErrorKind::UnparsableInput));
    }

    #[test]
    fn test_retrieval_failure_degrades() {
        let pipeline = TriagePipeline::default();
        let analysis = pipeline
            .analyze(
                login_record(),
                &HistoricalStats::empty(),
                CallOutcome::TimedOut { after_ms: 10_000 },
            )
            .unwrap();
        assert!(analysis.retrieved().is_empty());
        assert_eq!(analysis.warnings()[0].kind, TriageErrorKind::RetrievalUnavailable);
        assert!(analysis.warnings()[0].detail.contains("10000ms"));
    }

    #[test]
    fn test_explanation_failure_uses_fallback() {
        let pipeline = TriagePipeline::default();
        for outcome in [
            CallOutcome::unavailable("connection refused"),
            CallOutcome::TimedOut { after_ms: 5 },
            CallOutcome::Completed("   ".to_string()),
        ] {
            let report = pipeline
                .analyze(login_record(), &HistoricalStats::empty(), CallOutcome::Completed(vec![]))
                .unwrap()
                .into_report(outcome)
                .unwrap();
            assert_eq!(report.root_cause_explanation(), EXPLANATION_UNAVAILABLE);
            assert!(report.has_warning(TriageErrorKind::ExplanationUnavailable));
        }
    }

    #[test]
    fn test_ambiguity_warning() {
        let pipeline = TriagePipeline::default();
        let analysis = pipeline
            .analyze(
                FailureRecord::new("t", "wait for element"),
                &HistoricalStats::empty(),
                CallOutcome::Completed(vec![]),
            )
            .unwrap();
        assert_eq!(analysis.classification().category, FailureType::Unknown);
        assert_eq!(
            analysis.warnings()[0].kind,
            TriageErrorKind::InternalClassificationAmbiguity
        );
    }

    #[test]
    fn test_retrieved_results_normalized() {
        let pipeline = TriagePipeline::new(&EngineConfig {
            top_k: 2,
            ..EngineConfig::default()
        });
        let past = FailureRecord::new("test_user_login", "TimeoutError: Timeout 30000ms exceeded.");
        let fix = Resolution::new(&past, FailureType::Timeout, "Increased wait timeout to 60s").confirmed();
        let hits = vec![
            RetrievedFailure::new(HistoricalRecord::new(past.clone(), None), 0.3),
            RetrievedFailure::new(HistoricalRecord::new(past.clone(), Some(fix)), 1.4),
            RetrievedFailure::new(HistoricalRecord::new(past, None), f64::NAN),
        ];
        let analysis = pipeline
            .analyze(login_record(), &HistoricalStats::empty(), CallOutcome::Completed(hits))
            .unwrap();
        let sims: Vec<f64> = analysis.retrieved().iter().map(|r| r.similarity).collect();
        assert_eq!(sims, vec![1.0, 0.3]);
        assert_eq!(
            analysis.suggestions()[0].description,
            "Apply similar fix: Increased wait timeout to 60s"
        );
    }

    #[test]
    fn test_concrete_selector_suggestion_in_pipeline() {
        let pipeline = TriagePipeline::default();
        let record = FailureRecord::new(
            "test_add_to_cart",
            r#"Error: locator("button.add-to-cart") not found"#,
        );
        let analysis = pipeline
            .analyze(record, &HistoricalStats::empty(), CallOutcome::Completed(vec![]))
            .unwrap();
        assert_eq!(analysis.classification().category, FailureType::Selector);
        assert!(analysis
            .suggestions()
            .iter()
            .any(|s| s.description.contains("'button.add-to-cart'")));
    }

    #[test]
    fn test_retry_pass_reaches_flaky_threshold() {
        let pipeline = TriagePipeline::default();
        let record = login_record()
            .with_retry(RetryOutcome::failed(1))
            .with_retry(RetryOutcome::passed(2));
        let analysis = pipeline
            .analyze(record, &HistoricalStats::empty(), CallOutcome::Completed(vec![]))
            .unwrap();
        // 0.6 × 1.0 + 0.25 × 0.6
        assert!((analysis.flakiness_probability() - 0.75).abs() < 1e-9);
        assert_eq!(
            analysis.suggestions()[0].description,
            crate::ranker::LIKELY_FLAKY_SUGGESTION
        );
    }
}
