//! Append-only in-memory history store.
//!
//! Serves as both the default [`SimilarityRetriever`] and the
//! [`HistoricalStatsSource`] for the engine. Similarity is bag-of-words
//! cosine over each record's embedding text, so results are deterministic
//! for a given store.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::similarity::TermVector;
use super::{normalize_results, RetrievedFailure, SimilarityRetriever};
use crate::classifier::Classifier;
use crate::error::CollaboratorError;
use crate::flakiness::{FlakinessScorer, HistoricalStats, HistoricalStatsSource};
use crate::record::{FailureRecord, FailureType, HistoricalRecord};

/// Hits below this similarity are noise and never returned.
pub const DEFAULT_MIN_SIMILARITY: f64 = 0.05;

#[derive(Debug, Clone)]
struct IndexedRecord {
    record: HistoricalRecord,
    vector: TermVector,
}

#[derive(Debug, Clone)]
pub struct InMemoryHistory {
    entries: Vec<IndexedRecord>,
    min_similarity: f64,
}

impl Default for InMemoryHistory {
    fn default() -> Self {
        Self::new()
    }
}

/// Store-level counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistorySummary {
    pub total_records: usize,
    /// Records carrying a resolution.
    pub resolved: usize,
    /// Resolutions whose outcome was confirmed.
    pub confirmed: usize,
    /// Unique test names across all records.
    pub distinct_tests: usize,
    /// Resolved records per resolution category.
    pub by_category: BTreeMap<FailureType, usize>,
}

/// A test whose stored history looks flaky.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlakyTest {
    pub test_name: String,
    /// Flakiness of the most recent failure scored against its history.
    pub flakiness: f64,
    /// Resolution category of the most recent failure, else its classification.
    pub category: FailureType,
    /// Stored failures for this test.
    pub occurrences: u32,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            min_similarity: DEFAULT_MIN_SIMILARITY,
        }
    }

    pub fn with_min_similarity(mut self, min_similarity: f64) -> Self {
        self.min_similarity = min_similarity.clamp(0.0, 1.0);
        self
    }

    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = HistoricalRecord>,
    {
        let mut store = Self::new();
        for record in records {
            store.insert(record);
        }
        store
    }

    /// Append a record. Stored records are never modified.
    pub fn insert(&mut self, record: HistoricalRecord) {
        let record = record.normalized();
        let vector = TermVector::from_text(&record.embedding_text());
        self.entries.push(IndexedRecord { record, vector });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &HistoricalRecord> {
        self.entries.iter().map(|e| &e.record)
    }

    pub fn by_test_name(&self, test_name: &str) -> Vec<&HistoricalRecord> {
        self.records()
            .filter(|r| r.failure.test_name == test_name)
            .collect()
    }

    /// Synchronous top-k search.
    pub fn search(&self, record: &FailureRecord, k: usize) -> Vec<RetrievedFailure> {
        if k == 0 {
            return Vec::new();
        }
        let query = TermVector::from_text(&record.embedding_text());
        let hits = self
            .entries
            .iter()
            .map(|e| (e, query.cosine(&e.vector)))
            .filter(|(_, sim)| *sim >= self.min_similarity)
            .map(|(e, sim)| RetrievedFailure::new(e.record.clone(), sim))
            .collect();
        normalize_results(hits, k)
    }

    pub fn summary(&self) -> HistorySummary {
        let mut summary = HistorySummary {
            total_records: self.entries.len(),
            ..HistorySummary::default()
        };
        let mut tests = BTreeSet::new();
        for record in self.records() {
            tests.insert(record.failure.test_name.as_str());
            if let Some(res) = &record.resolution {
                summary.resolved += 1;
                if res.outcome_confirmed {
                    summary.confirmed += 1;
                }
                *summary.by_category.entry(res.category).or_insert(0) += 1;
            }
        }
        summary.distinct_tests = tests.len();
        summary
    }

    /// Tests whose latest stored failure scores at or above `threshold`,
    /// most flaky first.
    pub fn flaky_tests(
        &self,
        classifier: &Classifier,
        scorer: &FlakinessScorer,
        threshold: f64,
    ) -> Vec<FlakyTest> {
        let mut groups: BTreeMap<&str, Vec<&HistoricalRecord>> = BTreeMap::new();
        for record in self.records() {
            groups
                .entry(record.failure.test_name.as_str())
                .or_default()
                .push(record);
        }

        let mut flaky: Vec<FlakyTest> = groups
            .into_iter()
            .filter_map(|(name, records)| {
                let latest = records.iter().max_by_key(|r| r.failure.timestamp)?;
                let category = latest
                    .resolution
                    .as_ref()
                    .map(|r| r.category)
                    .unwrap_or_else(|| classifier.classify(&latest.failure).category);
                let stats = HistoricalStats::from_history(records.iter().copied());
                let flakiness = scorer.score(&latest.failure, &stats, category);
                (flakiness >= threshold).then(|| FlakyTest {
                    test_name: name.to_string(),
                    flakiness,
                    category,
                    occurrences: stats.occurrences,
                })
            })
            .collect();
        flaky.sort_by(|a, b| {
            b.flakiness
                .total_cmp(&a.flakiness)
                .then_with(|| a.test_name.cmp(&b.test_name))
        });
        flaky
    }
}

#[async_trait]
impl SimilarityRetriever for InMemoryHistory {
    async fn retrieve(
        &self,
        record: &FailureRecord,
        k: usize,
    ) -> Result<Vec<RetrievedFailure>, CollaboratorError> {
        Ok(self.search(record, k))
    }

    fn name(&self) -> &str {
        "in_memory_history"
    }
}

impl HistoricalStatsSource for InMemoryHistory {
    /// Stats over stored failures with the same signature or test name.
    fn stats_for(&self, record: &FailureRecord) -> HistoricalStats {
        let signature = record.signature();
        HistoricalStats::from_history(self.records().filter(|r| {
            r.signature == signature || r.failure.test_name == record.test_name
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{metadata_keys, Resolution, RetryOutcome};

    fn sample_store() -> InMemoryHistory {
        let login = FailureRecord::new("test_user_login", "TimeoutError: Timeout 30000ms exceeded.")
            .with_excerpt([r##"waiting for selector "#user-dashboard" to be visible"##]);
        let login_fix = Resolution::new(
            &login,
            FailureType::Timeout,
            "Increased wait timeout to 60s and added waitForLoadState('networkidle')",
        )
        .confirmed();

        let cart = FailureRecord::new(
            "test_add_to_cart",
            "Element with selector button[data-test-id='add-cart'] not found",
        );
        let cart_fix = Resolution::new(
            &cart,
            FailureType::Selector,
            "Updated selector to .btn-primary.add-to-cart",
        )
        .confirmed();

        let search = FailureRecord::new("test_api_search", "RequestError: connect ETIMEDOUT")
            .with_retry(RetryOutcome::passed(1));

        InMemoryHistory::from_records([
            HistoricalRecord::new(login, Some(login_fix)).with_id("h-login"),
            HistoricalRecord::new(cart, Some(cart_fix)).with_id("h-cart"),
            HistoricalRecord::new(search, None).with_id("h-search"),
        ])
    }

    #[test]
    fn test_search_finds_most_similar_first() {
        let store = sample_store();
        let query = FailureRecord::new("test_user_login", "TimeoutError: Timeout 45000ms exceeded.");
        let hits = store.search(&query, 5);
        assert!(!hits.is_empty());
        assert_eq!(hits[0].record.id, "h-login");
        for pair in hits.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }
    }

    #[test]
    fn test_search_respects_k_and_floor() {
        let store = sample_store();
        let query = FailureRecord::new("test_user_login", "TimeoutError: Timeout 45000ms exceeded.");
        assert!(store.search(&query, 1).len() <= 1);
        assert!(store.search(&query, 0).is_empty());

        let unrelated = FailureRecord::new("zz", "qqq www");
        assert!(store.search(&unrelated, 5).is_empty());
    }

    #[test]
    fn test_summary_counts() {
        let summary = sample_store().summary();
        assert_eq!(summary.total_records, 3);
        assert_eq!(summary.resolved, 2);
        assert_eq!(summary.confirmed, 2);
        assert_eq!(summary.distinct_tests, 3);
        assert_eq!(summary.by_category.get(&FailureType::Selector), Some(&1));
    }

    #[test]
    fn test_by_test_name() {
        let store = sample_store();
        assert_eq!(store.by_test_name("test_add_to_cart").len(), 1);
        assert!(store.by_test_name("missing").is_empty());
    }

    #[test]
    fn test_stats_by_signature_or_name() {
        let mut store = sample_store();
        store.insert(HistoricalRecord::new(
            FailureRecord::new("test_api_search", "RequestError: connect ETIMEDOUT")
                .with_metadata(metadata_keys::CI_RUN_ID, "run-2")
                .with_retry(RetryOutcome::passed(1)),
            None,
        ));
        let stats = store.stats_for(&FailureRecord::new("test_api_search", "socket hang up"));
        assert_eq!(stats.occurrences, 2);
        assert_eq!(stats.distinct_runs, 2);
        assert!((stats.pass_after_retry_rate - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_flaky_tests_listing() {
        let store = sample_store();
        let flaky = store.flaky_tests(&Classifier::default(), &FlakinessScorer::default(), 0.6);
        let names: Vec<_> = flaky.iter().map(|f| f.test_name.as_str()).collect();
        assert_eq!(names, vec!["test_api_search"]);
        assert_eq!(flaky[0].category, FailureType::Network);
    }

    #[tokio::test]
    async fn test_retriever_impl_matches_search() {
        let store = sample_store();
        let query = FailureRecord::new("test_add_to_cart", "Element not found");
        let via_trait = store.retrieve(&query, 3).await.unwrap();
        assert_eq!(via_trait, store.search(&query, 3));
    }
}
