use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::signature::failure_signature;
use crate::error::TriageError;

/// Well-known `environment_metadata` keys.
pub mod metadata_keys {
    pub const CI_RUN_ID: &str = "ci_run_id";
    pub const BRANCH: &str = "branch";
    pub const COMMIT_SHA: &str = "commit_sha";
    pub const OS: &str = "os";
    pub const DURATION_SECONDS: &str = "duration_seconds";
    pub const ARTIFACTS: &str = "artifacts";
    pub const SOURCE_FILE: &str = "source_file";
    pub const ERROR_TYPE: &str = "error_type";
}

/// Closed set of failure categories.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    /// Waits, deadlines, "exceeded" budgets.
    Timeout,
    /// Element lookups that no longer resolve.
    Selector,
    /// Connection refused/reset, DNS, upstream 5xx.
    Network,
    /// Fixtures, seed data, uniqueness constraints.
    DataSetup,
    /// Missing modules, versions, permissions, config.
    Environment,
    #[default]
    Unknown,
}

impl FailureType {
    /// Every category, in default classification priority (unknown last).
    pub const ALL: [FailureType; 6] = [
        Self::Timeout,
        Self::Selector,
        Self::Network,
        Self::DataSetup,
        Self::Environment,
        Self::Unknown,
    ];

    /// Base flakiness prior for this category.
    ///
    /// network > timeout > environment > unknown > selector > data_setup
    pub fn flakiness_prior(self) -> f64 {
        match self {
            Self::Network => 0.7,
            Self::Timeout => 0.6,
            Self::Environment => 0.4,
            Self::Unknown => 0.3,
            Self::Selector => 0.15,
            Self::DataSetup => 0.1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Selector => "selector",
            Self::Network => "network",
            Self::DataSetup => "data_setup",
            Self::Environment => "environment",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown failure category '{0}' (expected one of: timeout, selector, network, data_setup, environment, unknown)")]
pub struct UnknownCategory(pub String);

impl FromStr for FailureType {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// One retry attempt of the failing test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOutcome {
    pub attempt_number: u32,
    pub passed: bool,
    /// Error seen on a failed attempt, when the log recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl RetryOutcome {
    pub fn passed(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            passed: true,
            error_message: None,
        }
    }

    pub fn failed(attempt_number: u32) -> Self {
        Self {
            attempt_number,
            passed: false,
            error_message: None,
        }
    }

    pub fn failed_with(attempt_number: u32, error_message: impl Into<String>) -> Self {
        Self {
            attempt_number,
            passed: false,
            error_message: Some(error_message.into()),
        }
    }
}

/// A normalized CI test failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub test_name: String,
    pub error_message: String,
    #[serde(default)]
    pub stack_or_log_excerpt: Vec<String>,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub retry_outcomes: Vec<RetryOutcome>,
    #[serde(default)]
    pub environment_metadata: BTreeMap<String, String>,
}

impl FailureRecord {
    pub fn new(test_name: impl Into<String>, error_message: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            error_message: error_message.into(),
            stack_or_log_excerpt: Vec::new(),
            timestamp: Utc::now(),
            retry_outcomes: Vec::new(),
            environment_metadata: BTreeMap::new(),
        }
    }

    pub fn with_excerpt<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.stack_or_log_excerpt
            .extend(lines.into_iter().map(Into::into));
        self
    }

    pub fn with_retry(mut self, outcome: RetryOutcome) -> Self {
        self.retry_outcomes.push(outcome);
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment_metadata.insert(key.into(), value.into());
        self
    }

    /// Reject records the classifier cannot reason about.
    pub fn validate(&self) -> Result<(), TriageError> {
        if self.test_name.trim().is_empty() {
            return Err(TriageError::unparsable("test_name is empty"));
        }
        if self.error_message.trim().is_empty() {
            return Err(TriageError::unparsable(format!(
                "error_message is empty for test '{}'",
                self.test_name
            )));
        }
        Ok(())
    }

    /// Normalized fingerprint of the error message.
    pub fn signature(&self) -> String {
        failure_signature(&self.error_message)
    }

    /// Error message followed by the excerpt lines, newline-joined.
    pub fn analysis_text(&self) -> String {
        let mut text = self.error_message.clone();
        for line in &self.stack_or_log_excerpt {
            text.push('\n');
            text.push_str(line);
        }
        text
    }

    /// Text used for similarity: test name, error, first excerpt lines.
    pub fn embedding_text(&self) -> String {
        let mut parts = vec![
            format!("test {}", self.test_name.replace(['_', '.', ':'], " ")),
            format!("error {}", self.error_message),
        ];
        parts.extend(self.stack_or_log_excerpt.iter().take(5).cloned());
        parts.join(" | ")
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.environment_metadata.get(key).map(String::as_str)
    }

    /// Identity of the CI run this failure came from, for distinct-run counts.
    pub fn run_key(&self) -> String {
        self.metadata(metadata_keys::CI_RUN_ID)
            .map(str::to_string)
            .unwrap_or_else(|| self.timestamp.to_rfc3339())
    }

    pub fn passed_on_retry(&self) -> bool {
        self.retry_outcomes.iter().any(|r| r.passed)
    }
}

/// How a past failure was fixed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    #[serde(default)]
    pub failure_signature: String,
    pub fix_description: String,
    #[serde(default)]
    pub category: FailureType,
    #[serde(default)]
    pub outcome_confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_reference: Option<String>,
}

impl Resolution {
    pub fn new(
        failure: &FailureRecord,
        category: FailureType,
        fix_description: impl Into<String>,
    ) -> Self {
        Self {
            failure_signature: failure.signature(),
            fix_description: fix_description.into(),
            category,
            outcome_confirmed: false,
            root_cause: None,
            fixed_by: None,
            ticket_reference: None,
        }
    }

    pub fn confirmed(mut self) -> Self {
        self.outcome_confirmed = true;
        self
    }

    pub fn with_root_cause(mut self, root_cause: impl Into<String>) -> Self {
        self.root_cause = Some(root_cause.into());
        self
    }
}

/// A stored failure with its (optional) resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalRecord {
    /// Generated on load when stored data omits it.
    #[serde(default)]
    pub id: String,
    pub failure: FailureRecord,
    /// Filled from the failure when absent in stored data.
    #[serde(default)]
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolution: Option<Resolution>,
}

impl HistoricalRecord {
    pub fn new(failure: FailureRecord, resolution: Option<Resolution>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            signature: failure.signature(),
            failure,
            resolution,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Recompute the signature if stored data left it blank.
    pub fn normalized(mut self) -> Self {
        if self.signature.trim().is_empty() {
            self.signature = self.failure.signature();
        }
        if self.id.trim().is_empty() {
            self.id = uuid::Uuid::new_v4().to_string();
        }
        self
    }

    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }

    pub fn is_confirmed(&self) -> bool {
        self.resolution
            .as_ref()
            .is_some_and(|r| r.outcome_confirmed)
    }

    /// Embedding text plus any resolution text, for similarity search.
    pub fn embedding_text(&self) -> String {
        let mut text = self.failure.embedding_text();
        if let Some(res) = &self.resolution {
            if let Some(cause) = &res.root_cause {
                text.push_str(" | root cause ");
                text.push_str(cause);
            }
            text.push_str(" | category ");
            text.push_str(res.category.as_str());
        }
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_rejects_blank_fields() {
        let ok = FailureRecord::new("test_login", "TimeoutError");
        assert!(ok.validate().is_ok());

        let err = FailureRecord::new("  ", "TimeoutError").validate().unwrap_err();
        assert!(matches!(err, TriageError::UnparsableInput { .. }));

        let err = FailureRecord::new("test_login", "\n").validate().unwrap_err();
        assert!(err.to_string().contains("test_login"));
    }

    #[test]
    fn test_failure_type_roundtrip_names() {
        for cat in FailureType::ALL {
            assert_eq!(cat.as_str().parse::<FailureType>().unwrap(), cat);
            let json = serde_json::to_string(&cat).unwrap();
            assert_eq!(json, format!("\"{}\"", cat.as_str()));
        }
        assert_eq!("Data-Setup".parse::<FailureType>().unwrap(), FailureType::DataSetup);
        assert!("flaky".parse::<FailureType>().is_err());
        assert_eq!(FailureType::default(), FailureType::Unknown);
    }

    #[test]
    fn test_prior_ordering() {
        use FailureType::*;
        let ordered = [Network, Timeout, Environment, Unknown, Selector, DataSetup];
        for pair in ordered.windows(2) {
            assert!(pair[0].flakiness_prior() > pair[1].flakiness_prior());
        }
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let json = r#"{"test_name": "test_a", "error_message": "boom"}"#;
        let record: FailureRecord = serde_json::from_str(json).unwrap();
        assert!(record.stack_or_log_excerpt.is_empty());
        assert!(record.retry_outcomes.is_empty());
        assert!(record.environment_metadata.is_empty());
    }

    #[test]
    fn test_analysis_text_joins_excerpt() {
        let record = FailureRecord::new("t", "first").with_excerpt(["second", "third"]);
        assert_eq!(record.analysis_text(), "first\nsecond\nthird");
    }

    #[test]
    fn test_run_key_prefers_ci_run_id() {
        let record = FailureRecord::new("t", "e").with_metadata(metadata_keys::CI_RUN_ID, "run-42");
        assert_eq!(record.run_key(), "run-42");
        let record = FailureRecord::new("t", "e");
        assert_eq!(record.run_key(), record.timestamp.to_rfc3339());
    }

    #[test]
    fn test_historical_record_normalized_fills_signature() {
        let json = r#"{
            "id": "",
            "failure": {"test_name": "t", "error_message": "Timeout 500ms exceeded"}
        }"#;
        let record: HistoricalRecord = serde_json::from_str(json).unwrap();
        let record = record.normalized();
        assert_eq!(record.signature, "timeout <n>ms exceeded");
        assert!(!record.id.is_empty());
        assert!(!record.is_resolved());
    }

    #[test]
    fn test_resolution_confirmed_flag() {
        let failure = FailureRecord::new("t", "boom");
        let res = Resolution::new(&failure, FailureType::Network, "retry").confirmed();
        let record = HistoricalRecord::new(failure, Some(res));
        assert!(record.is_resolved());
        assert!(record.is_confirmed());
        assert!(record.embedding_text().contains("category network"));
    }
}
