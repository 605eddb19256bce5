//! Batch triage: JoinSet fan-out gated by a semaphore.
//!
//! Results come back in completion order, each tagged with its input index
//! and source name so callers can re-sort. A record that fails to parse or
//! triage becomes a `Skipped` entry; nothing aborts the batch and nothing is
//! silently dropped, including tasks that panic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::error::TriageError;
use crate::orchestrator::TriageEngine;
use crate::record::{FailureRecord, FailureType};
use crate::report::TriageReport;

/// One batch input: a record (or the reason it could not be produced) and
/// where it came from.
#[derive(Debug, Clone)]
pub struct BatchInput {
    pub source: String,
    pub record: Result<FailureRecord, TriageError>,
}

impl BatchInput {
    pub fn new(source: impl Into<String>, record: Result<FailureRecord, TriageError>) -> Self {
        Self {
            source: source.into(),
            record,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BatchOutcome {
    Reported { report: Box<TriageReport> },
    Skipped { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// Position of the input in the batch.
    pub index: usize,
    pub source: String,
    #[serde(flatten)]
    pub outcome: BatchOutcome,
}

impl BatchEntry {
    fn skipped(index: usize, source: String, error: impl Into<String>) -> Self {
        Self {
            index,
            source,
            outcome: BatchOutcome::Skipped {
                error: error.into(),
            },
        }
    }

    pub fn report(&self) -> Option<&TriageReport> {
        match &self.outcome {
            BatchOutcome::Reported { report } => Some(report.as_ref()),
            BatchOutcome::Skipped { .. } => None,
        }
    }
}

/// Triage every input with at most `concurrency` records in flight.
pub async fn run_batch(
    engine: Arc<TriageEngine>,
    inputs: Vec<BatchInput>,
    concurrency: usize,
) -> Vec<BatchEntry> {
    let total = inputs.len();
    let sem = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut join_set: JoinSet<BatchEntry> = JoinSet::new();
    let mut entries: Vec<BatchEntry> = Vec::with_capacity(total);
    let mut pending: BTreeMap<usize, String> = BTreeMap::new();

    for (index, input) in inputs.into_iter().enumerate() {
        let BatchInput { source, record } = input;
        let record = match record {
            Ok(record) => record,
            Err(err) => {
                warn!(source = %source, error = %err, "Skipping unparsable record");
                entries.push(BatchEntry::skipped(index, source, err.to_string()));
                continue;
            }
        };

        pending.insert(index, source.clone());
        let sem = sem.clone();
        let engine = engine.clone();
        join_set.spawn(async move {
            let Ok(_permit) = sem.acquire_owned().await else {
                return BatchEntry::skipped(index, source, "batch semaphore closed");
            };
            match engine.triage(record).await {
                Ok(report) => BatchEntry {
                    index,
                    source,
                    outcome: BatchOutcome::Reported {
                        report: Box::new(report),
                    },
                },
                Err(err) => {
                    warn!(source = %source, error = %err, "Triage failed for record");
                    BatchEntry::skipped(index, source, err.to_string())
                }
            }
        });
    }

    while let Some(joined) = join_set.join_next().await {
        match joined {
            Ok(entry) => {
                pending.remove(&entry.index);
                entries.push(entry);
            }
            Err(e) => {
                warn!(error = %e, "Triage task panicked");
            }
        }
    }

    // Tasks that panicked never returned their entry.
    for (index, source) in pending {
        entries.push(BatchEntry::skipped(index, source, "triage task aborted"));
    }

    let summary = BatchSummary::from_entries(&entries);
    info!(
        total,
        reported = summary.reported,
        skipped = summary.skipped,
        "Batch triage finished"
    );
    entries
}

/// Aggregate view over a finished batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub reported: usize,
    pub skipped: usize,
    pub by_category: BTreeMap<FailureType, usize>,
    pub likely_flaky: usize,
    pub mean_flakiness: f64,
    pub mean_confidence: f64,
    /// Distinct tests with at least one report.
    pub tests: BTreeSet<String>,
}

impl BatchSummary {
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut summary = Self {
            total: entries.len(),
            ..Self::default()
        };
        let mut flakiness_sum = 0.0;
        let mut confidence_sum = 0.0;
        for entry in entries {
            let Some(report) = entry.report() else {
                summary.skipped += 1;
                continue;
            };
            summary.reported += 1;
            *summary
                .by_category
                .entry(report.classification().category)
                .or_insert(0) += 1;
            if report.flakiness_probability() > 0.7 {
                summary.likely_flaky += 1;
            }
            flakiness_sum += report.flakiness_probability();
            confidence_sum += report.overall_confidence();
            summary.tests.insert(report.test_name().to_string());
        }
        if summary.reported > 0 {
            summary.mean_flakiness = flakiness_sum / summary.reported as f64;
            summary.mean_confidence = confidence_sum / summary.reported as f64;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explain::RuleBasedExplainer;
    use crate::flakiness::NoHistory;
    use crate::orchestrator::EngineConfig;
    use crate::retrieval::EmptyRetriever;

    fn engine() -> Arc<TriageEngine> {
        Arc::new(
            TriageEngine::new(
                EngineConfig::default(),
                Arc::new(EmptyRetriever),
                Arc::new(NoHistory),
                Arc::new(RuleBasedExplainer),
            )
            .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_batch_tags_and_skips() {
        let inputs = vec![
            BatchInput::new("a.log", Ok(FailureRecord::new("test_a", "ECONNRESET"))),
            BatchInput::new("b.log", Err(TriageError::unparsable("no test name"))),
            BatchInput::new("c.log", Ok(FailureRecord::new("test_c", ""))),
            BatchInput::new("d.log", Ok(FailureRecord::new("test_d", "duplicate key"))),
        ];
        let mut entries = run_batch(engine(), inputs, 2).await;
        assert_eq!(entries.len(), 4);
        entries.sort_by_key(|e| e.index);

        let sources: Vec<_> = entries.iter().map(|e| e.source.as_str()).collect();
        assert_eq!(sources, vec!["a.log", "b.log", "c.log", "d.log"]);
        assert!(entries[0].report().is_some());
        assert!(entries[1].report().is_none());
        assert!(entries[2].report().is_none());
        assert_eq!(
            entries[3].report().unwrap().classification().category,
            FailureType::DataSetup
        );

        let summary = BatchSummary::from_entries(&entries);
        assert_eq!(summary.reported, 2);
        assert_eq!(summary.skipped, 2);
        assert_eq!(summary.by_category.get(&FailureType::Network), Some(&1));
    }

    #[tokio::test]
    async fn test_empty_batch() {
        assert!(run_batch(engine(), Vec::new(), 4).await.is_empty());
    }

    #[test]
    fn test_entry_json_shape() {
        let entry = BatchEntry::skipped(3, "x.log".into(), "unparsable input: empty");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["source"], "x.log");
        assert_eq!(json["index"], 3);
    }
}
