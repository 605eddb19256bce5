use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::record::{FailureRecord, HistoricalRecord};

/// Aggregate history for a failure signature or test.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HistoricalStats {
    /// Stored failures counted.
    pub occurrences: u32,
    /// Distinct CI runs those failures came from.
    pub distinct_runs: u32,
    /// Fraction of occurrences that passed on a retry.
    pub pass_after_retry_rate: f64,
    /// Fraction of occurrences with a confirmed fix.
    pub confirmed_fix_rate: f64,
}

impl HistoricalStats {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_history<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a HistoricalRecord>,
    {
        let mut occurrences = 0u32;
        let mut passed = 0u32;
        let mut confirmed = 0u32;
        let mut runs = BTreeSet::new();

        for record in records {
            occurrences += 1;
            runs.insert(record.failure.run_key());
            if record.failure.passed_on_retry() {
                passed += 1;
            }
            if record.is_confirmed() {
                confirmed += 1;
            }
        }

        if occurrences == 0 {
            return Self::empty();
        }

        Self {
            occurrences,
            distinct_runs: runs.len() as u32,
            pass_after_retry_rate: passed as f64 / occurrences as f64,
            confirmed_fix_rate: confirmed as f64 / occurrences as f64,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.occurrences == 0
    }
}

/// Source of historical stats for a record.
///
/// Implemented by the in-memory history store; [`NoHistory`] stands in when
/// no store is configured.
pub trait HistoricalStatsSource: Send + Sync {
    fn stats_for(&self, record: &FailureRecord) -> HistoricalStats;
}

/// Stats source for runs without history.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistoricalStatsSource for NoHistory {
    fn stats_for(&self, _record: &FailureRecord) -> HistoricalStats {
        HistoricalStats::empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{metadata_keys, FailureType, Resolution, RetryOutcome};

    fn stored(run: &str, passed: bool, confirmed: bool) -> HistoricalRecord {
        let mut failure = FailureRecord::new("test_api_search", "connect ETIMEDOUT")
            .with_metadata(metadata_keys::CI_RUN_ID, run);
        if passed {
            failure = failure.with_retry(RetryOutcome::passed(1));
        }
        let resolution = confirmed
            .then(|| Resolution::new(&failure, FailureType::Network, "add retry").confirmed());
        HistoricalRecord::new(failure, resolution)
    }

    #[test]
    fn test_empty_history() {
        let stats = HistoricalStats::from_history(&[]);
        assert!(stats.is_empty());
        assert_eq!(stats.distinct_runs, 0);
    }

    #[test]
    fn test_rates_and_distinct_runs() {
        let records = vec![
            stored("run-1", true, false),
            stored("run-1", false, false),
            stored("run-2", true, true),
            stored("run-3", false, false),
        ];
        let stats = HistoricalStats::from_history(&records);
        assert_eq!(stats.occurrences, 4);
        assert_eq!(stats.distinct_runs, 3);
        assert!((stats.pass_after_retry_rate - 0.5).abs() < 1e-9);
        assert!((stats.confirmed_fix_rate - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_no_history_source() {
        let record = FailureRecord::new("t", "e");
        assert!(NoHistory.stats_for(&record).is_empty());
    }
}
