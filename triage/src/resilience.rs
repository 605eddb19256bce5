//! Collaborator degradation handling.
//!
//! Every external call (retriever, explainer) is wrapped into a
//! [`CallOutcome`] before the pipeline sees it, so the pipeline only ever
//! branches on data:
//!
//! ```text
//! collaborator call
//!   ├─ Ok within timeout  → Completed(value)
//!   ├─ timeout elapsed    → TimedOut { after_ms }
//!   └─ Err(..)            → Unavailable { reason }
//! ```
//!
//! [`ServiceHealth`] tracks consecutive failures of one collaborator across
//! a batch so a dead explainer stops costing a full timeout per record.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CollaboratorError;

/// How much of a collaborator's capability is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Calls are succeeding.
    Full,
    /// Recent calls failed; still attempting.
    Partial,
    /// Repeated failures; calls are skipped except for periodic probes.
    Unavailable,
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Result of one collaborator call, as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Completed(T),
    TimedOut { after_ms: u64 },
    Unavailable { reason: String },
}

impl<T> CallOutcome<T> {
    pub fn from_result(result: Result<T, CollaboratorError>) -> Self {
        match result {
            Ok(value) => Self::Completed(value),
            Err(CollaboratorError::TimedOut(after_ms)) => Self::TimedOut { after_ms },
            Err(err) => Self::Unavailable {
                reason: err.to_string(),
            },
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn level(&self) -> DegradationLevel {
        match self {
            Self::Completed(_) => DegradationLevel::Full,
            Self::TimedOut { .. } | Self::Unavailable { .. } => DegradationLevel::Unavailable,
        }
    }

    /// Human-readable reason for a non-completed outcome.
    pub fn failure_detail(&self) -> Option<String> {
        match self {
            Self::Completed(_) => None,
            Self::TimedOut { after_ms } => Some(format!("timed out after {after_ms}ms")),
            Self::Unavailable { reason } => Some(reason.clone()),
        }
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> CallOutcome<U> {
        match self {
            Self::Completed(value) => CallOutcome::Completed(f(value)),
            Self::TimedOut { after_ms } => CallOutcome::TimedOut { after_ms },
            Self::Unavailable { reason } => CallOutcome::Unavailable { reason },
        }
    }
}

/// Run a collaborator future under `timeout`.
pub async fn call_with_timeout<T, F>(timeout: Duration, call: F) -> CallOutcome<T>
where
    F: Future<Output = Result<T, CollaboratorError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => CallOutcome::from_result(result),
        Err(_) => CallOutcome::TimedOut {
            after_ms: timeout.as_millis() as u64,
        },
    }
}

/// Consecutive failures before a collaborator is skipped.
pub const UNAVAILABLE_AFTER_FAILURES: u32 = 3;
/// Consecutive successes before a degraded collaborator is trusted again.
pub const RECOVER_AFTER_SUCCESSES: u32 = 3;

/// Health of one collaborator, tracked over a batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub level: DegradationLevel,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub skipped_calls: u64,
    pub last_error: Option<String>,
    pub last_change: DateTime<Utc>,
    /// While unavailable, every `probe_interval`-th request is let through.
    pub probe_interval: u32,
    skipped_since_probe: u32,
}

impl ServiceHealth {
    pub fn new(service: &str, probe_interval: u32) -> Self {
        Self {
            service: service.to_string(),
            level: DegradationLevel::Full,
            consecutive_successes: 0,
            consecutive_failures: 0,
            total_calls: 0,
            total_failures: 0,
            skipped_calls: 0,
            last_error: None,
            last_change: Utc::now(),
            probe_interval: probe_interval.max(1),
            skipped_since_probe: 0,
        }
    }

    /// Whether the next request should call the collaborator.
    pub fn should_attempt(&mut self) -> bool {
        if self.level != DegradationLevel::Unavailable {
            return true;
        }
        self.skipped_since_probe += 1;
        if self.skipped_since_probe >= self.probe_interval {
            self.skipped_since_probe = 0;
            tracing::debug!(service = %self.service, "Probing unavailable collaborator");
            return true;
        }
        self.skipped_calls += 1;
        false
    }

    pub fn record_success(&mut self) {
        self.total_calls += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;

        // A successful probe brings an unavailable service straight back to
        // partial; full trust needs a streak.
        let new_level = if self.consecutive_successes >= RECOVER_AFTER_SUCCESSES {
            DegradationLevel::Full
        } else if self.level == DegradationLevel::Unavailable {
            DegradationLevel::Partial
        } else {
            self.level
        };
        self.set_level(new_level);
        if self.level == DegradationLevel::Full {
            self.last_error = None;
        }
    }

    pub fn record_failure(&mut self, error: &str) {
        self.total_calls += 1;
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.last_error = Some(error.to_string());

        let new_level = if self.consecutive_failures >= UNAVAILABLE_AFTER_FAILURES {
            DegradationLevel::Unavailable
        } else {
            DegradationLevel::Partial
        };
        self.set_level(new_level);
    }

    /// Record the outcome of a call made after `should_attempt` said yes.
    pub fn record_outcome<T>(&mut self, outcome: &CallOutcome<T>) {
        match outcome.failure_detail() {
            None => self.record_success(),
            Some(detail) => self.record_failure(&detail),
        }
    }

    pub fn failure_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }

    fn set_level(&mut self, level: DegradationLevel) {
        if level != self.level {
            tracing::warn!(
                service = %self.service,
                from = %self.level,
                to = %level,
                consecutive_failures = self.consecutive_failures,
                "Collaborator health changed"
            );
            self.level = level;
            self.last_change = Utc::now();
            self.skipped_since_probe = 0;
        }
    }
}
