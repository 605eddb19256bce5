//! Similarity retrieval contract.
//!
//! A retriever returns up to `k` historical failures ordered by descending
//! similarity. Scores are only comparable within one call. The engine treats
//! any error or timeout as an empty list and records a warning; it also
//! re-normalizes whatever comes back (see [`normalize_results`]) so ranking
//! never depends on backend quirks.

pub mod memory;
pub mod similarity;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;
use crate::record::{FailureRecord, HistoricalRecord, Resolution};

pub use memory::{FlakyTest, HistorySummary, InMemoryHistory};

/// A historical record with its similarity to the current failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedFailure {
    pub record: HistoricalRecord,
    pub similarity: f64,
}

impl RetrievedFailure {
    pub fn new(record: HistoricalRecord, similarity: f64) -> Self {
        Self { record, similarity }
    }

    pub fn resolution(&self) -> Option<&Resolution> {
        self.record.resolution.as_ref()
    }
}

/// Top-K nearest historical failures.
#[async_trait]
pub trait SimilarityRetriever: Send + Sync {
    async fn retrieve(
        &self,
        record: &FailureRecord,
        k: usize,
    ) -> Result<Vec<RetrievedFailure>, CollaboratorError>;

    /// Name used in logs and warnings.
    fn name(&self) -> &str {
        "retriever"
    }
}

/// Retriever for deployments with no history yet.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmptyRetriever;

#[async_trait]
impl SimilarityRetriever for EmptyRetriever {
    async fn retrieve(
        &self,
        _record: &FailureRecord,
        _k: usize,
    ) -> Result<Vec<RetrievedFailure>, CollaboratorError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "empty"
    }
}

/// Drop non-finite scores, clamp to [0, 1], stable-sort descending, keep `k`.
pub fn normalize_results(results: Vec<RetrievedFailure>, k: usize) -> Vec<RetrievedFailure> {
    let mut kept: Vec<RetrievedFailure> = results
        .into_iter()
        .filter(|r| r.similarity.is_finite())
        .map(|mut r| {
            r.similarity = r.similarity.clamp(0.0, 1.0);
            r
        })
        .collect();
    kept.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
    kept.truncate(k);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(id: &str, similarity: f64) -> RetrievedFailure {
        let failure = FailureRecord::new("t", "e");
        RetrievedFailure::new(HistoricalRecord::new(failure, None).with_id(id), similarity)
    }

    #[test]
    fn test_normalize_sorts_clamps_and_truncates() {
        let results = vec![
            hit("a", 0.2),
            hit("b", f64::NAN),
            hit("c", 1.7),
            hit("d", -0.4),
            hit("e", 0.2),
            hit("f", f64::INFINITY),
        ];
        let out = normalize_results(results, 3);
        let ids: Vec<_> = out.iter().map(|r| r.record.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "e"]);
        assert_eq!(out[0].similarity, 1.0);
    }

    #[test]
    fn test_normalize_zero_k() {
        assert!(normalize_results(vec![hit("a", 0.9)], 0).is_empty());
    }

    #[tokio::test]
    async fn test_empty_retriever() {
        let out = EmptyRetriever
            .retrieve(&FailureRecord::new("t", "e"), 5)
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
