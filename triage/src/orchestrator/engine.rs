//! Async triage engine: the pure pipeline plus its two collaborator calls.
//!
//! One record is one sequential run. Only the retriever and explainer calls
//! await, each under its own timeout; their results are folded into the
//! pipeline as [`CallOutcome`]s. No lock is held across either call.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::classifier::ClassifierConfig;
use crate::error::TriageError;
use crate::explain::Explainer;
use crate::flakiness::{FlakinessWeights, HistoricalStatsSource};
use crate::ranker::RankerConfig;
use crate::record::FailureRecord;
use crate::report::TriageReport;
use crate::resilience::{call_with_timeout, CallOutcome, DegradationLevel, ServiceHealth};
use crate::retrieval::SimilarityRetriever;

use super::confidence::ConfidenceWeights;
use super::pipeline::{Analysis, TriagePipeline};

/// Engine tunables. Every field has a default; TOML files may set any subset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Similar failures requested from the retriever.
    pub top_k: usize,
    pub retrieval_timeout_ms: u64,
    pub explanation_timeout_ms: u64,
    /// While the explainer is unavailable, every n-th record probes it.
    pub explainer_probe_interval: u32,
    pub classifier: ClassifierConfig,
    pub flakiness: FlakinessWeights,
    pub ranker: RankerConfig,
    pub confidence: ConfidenceWeights,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            retrieval_timeout_ms: 10_000,
            explanation_timeout_ms: 120_000,
            explainer_probe_interval: 10,
            classifier: ClassifierConfig::default(),
            flakiness: FlakinessWeights::default(),
            ranker: RankerConfig::default(),
            confidence: ConfidenceWeights::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), TriageError> {
        let invalid = |reason: &str| {
            Err(TriageError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.top_k == 0 {
            return invalid("top_k must be at least 1");
        }
        if self.retrieval_timeout_ms == 0 || self.explanation_timeout_ms == 0 {
            return invalid("collaborator timeouts must be positive");
        }
        let r = &self.ranker;
        if !(0.0..=1.0).contains(&r.flaky_threshold) || !(0.0..=1.0).contains(&r.quarantine_threshold)
        {
            return invalid("ranker thresholds must lie in [0, 1]");
        }
        Ok(())
    }

    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }

    pub fn explanation_timeout(&self) -> Duration {
        Duration::from_millis(self.explanation_timeout_ms)
    }
}

pub struct TriageEngine {
    pipeline: TriagePipeline,
    config: EngineConfig,
    retriever: Arc<dyn SimilarityRetriever>,
    stats: Arc<dyn HistoricalStatsSource>,
    explainer: Arc<dyn Explainer>,
    explainer_health: Mutex<ServiceHealth>,
}

impl TriageEngine {
    pub fn new(
        config: EngineConfig,
        retriever: Arc<dyn SimilarityRetriever>,
        stats: Arc<dyn HistoricalStatsSource>,
        explainer: Arc<dyn Explainer>,
    ) -> Result<Self, TriageError> {
        config.validate()?;
        let health = ServiceHealth::new(explainer.name(), config.explainer_probe_interval);
        Ok(Self {
            pipeline: TriagePipeline::new(&config),
            config,
            retriever,
            stats,
            explainer,
            explainer_health: Mutex::new(health),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &TriagePipeline {
        &self.pipeline
    }

    pub fn explainer_level(&self) -> DegradationLevel {
        self.health().level
    }

    /// Snapshot of the explainer's health.
    pub fn explainer_health(&self) -> ServiceHealth {
        self.health().clone()
    }

    /// Triage one record. Only `UnparsableInput` (or an internal invariant
    /// violation) is returned as an error; degraded collaborators only add
    /// warnings to the report.
    pub async fn triage(&self, record: FailureRecord) -> Result<TriageReport, TriageError> {
        let started = Instant::now();
        let run = self.pipeline.receive(record)?;
        let run = self.pipeline.classify(run)?;

        let stats = self.stats.stats_for(run.record());
        let run = self.pipeline.score(run, &stats)?;

        let retrieval = call_with_timeout(
            self.config.retrieval_timeout(),
            self.retriever.retrieve(run.record(), self.config.top_k),
        )
        .await;
        let run = self.pipeline.attach_retrieval(run, retrieval)?;
        let analysis = self.pipeline.rank(run)?;

        let explanation = self.explain(&analysis).await;
        let report = analysis.into_report(explanation)?;

        tracing::info!(
            test = %report.test_name(),
            category = %report.classification().category,
            flakiness = report.flakiness_probability(),
            confidence = report.overall_confidence(),
            warnings = report.warnings().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Triage complete"
        );
        Ok(report)
    }

    async fn explain(&self, analysis: &Analysis) -> CallOutcome<String> {
        let attempt = self.health().should_attempt();
        if !attempt {
            return CallOutcome::unavailable(format!(
                "{} skipped after repeated failures",
                self.explainer.name()
            ));
        }

        let context = analysis.explanation_context();
        let outcome = call_with_timeout(
            self.config.explanation_timeout(),
            self.explainer.explain(analysis.record(), &context),
        )
        .await;
        let outcome = match outcome {
            CallOutcome::Completed(text) if text.trim().is_empty() => {
                CallOutcome::unavailable("explainer returned empty text")
            }
            other => other,
        };

        self.health().record_outcome(&outcome);
        outcome
    }

    fn health(&self) -> MutexGuard<'_, ServiceHealth> {
        self.explainer_health
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::RuleBasedExplainer;
    use crate::flakiness::NoHistory;
    use crate::retrieval::{EmptyRetriever, InMemoryHistory};

    fn engine() -> TriageEngine {
        TriageEngine::new(
            EngineConfig::default(),
            Arc::new(EmptyRetriever),
            Arc::new(NoHistory),
            Arc::new(RuleBasedExplainer),
        )
        .unwrap()
    }

    #[test]
    fn test_config_validation() {
        assert!(EngineConfig::default().validate().is_ok());
        let bad = EngineConfig {
            top_k: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(bad.validate(), Err(TriageError::InvalidConfig { .. })));
        let bad = EngineConfig {
            explanation_timeout_ms: 0,
            ..EngineConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_from_partial_json() {
        let config: EngineConfig =
            serde_json::from_str(r#"{"top_k": 3, "ranker": {"max_suggestions": 4}}"#).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.ranker.max_suggestions, Some(4));
        assert_eq!(config.ranker.flaky_threshold, 0.7);
        assert_eq!(config.retrieval_timeout_ms, 10_000);
    }

    #[tokio::test]
    async fn test_triage_with_empty_history() {
        let report = engine()
            .triage(FailureRecord::new(
                "test_user_login",
                "TimeoutError: selector '#user-dashboard' not visible",
            ))
            .await
            .unwrap();
        assert!(report.similar_failures().is_empty());
        assert!(report.overall_confidence().is_finite());
        assert!(report.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_triage_rejects_unparsable() {
        let err = engine()
            .triage(FailureRecord::new("test_x", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, TriageError::UnparsableInput { .. }));
    }

    #[tokio::test]
    async fn test_history_store_as_both_collaborators() {
        let history = Arc::new(InMemoryHistory::new());
        let engine = TriageEngine::new(
            EngineConfig::default(),
            history.clone(),
            history,
            Arc::new(RuleBasedExplainer),
        )
        .unwrap();
        let report = engine
            .triage(FailureRecord::new("t", "ECONNREFUSED"))
            .await
            .unwrap();
        assert_eq!(report.classification().category, crate::record::FailureType::Network);
        assert_eq!(engine.explainer_level(), DegradationLevel::Full);
    }
}
