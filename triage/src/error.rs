//! Triage error taxonomy.
//!
//! | Kind                            | Fatal to record | Recovery                          |
//! |---------------------------------|-----------------|-----------------------------------|
//! | UnparsableInput                 | yes             | skip record, emit an error note   |
//! | RetrievalUnavailable            | no              | empty similar-failure list        |
//! | ExplanationUnavailable          | no              | deterministic fallback text       |
//! | InternalClassificationAmbiguity | no              | classify as `unknown`             |
//!
//! Only `UnparsableInput` surfaces as a [`TriageError`]; the recoverable kinds
//! travel inside the report as [`TriageWarning`]s.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::orchestrator::IllegalTransition;

/// High-level kind shared by errors and warnings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriageErrorKind {
    /// Record is missing its test name or error message.
    UnparsableInput,
    /// Retriever failed or timed out.
    RetrievalUnavailable,
    /// Explainer failed or timed out.
    ExplanationUnavailable,
    /// Two categories matched weakly; resolved to `unknown`.
    InternalClassificationAmbiguity,
}

impl TriageErrorKind {
    /// Whether the run continues after this condition.
    pub fn is_recoverable(self) -> bool {
        !matches!(self, Self::UnparsableInput)
    }

    /// Ambiguity is a classification outcome, not a failure.
    pub fn is_error(self) -> bool {
        !matches!(self, Self::InternalClassificationAmbiguity)
    }

    /// What the engine does when this condition occurs.
    pub fn recovery_action(self) -> &'static str {
        match self {
            Self::UnparsableInput => "skip the record and emit an error note",
            Self::RetrievalUnavailable => "continue with an empty similar-failure list",
            Self::ExplanationUnavailable => "use the deterministic fallback explanation",
            Self::InternalClassificationAmbiguity => "classify as unknown",
        }
    }
}

impl fmt::Display for TriageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnparsableInput => write!(f, "unparsable_input"),
            Self::RetrievalUnavailable => write!(f, "retrieval_unavailable"),
            Self::ExplanationUnavailable => write!(f, "explanation_unavailable"),
            Self::InternalClassificationAmbiguity => write!(f, "internal_classification_ambiguity"),
        }
    }
}

/// A recovered condition recorded on the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriageWarning {
    pub kind: TriageErrorKind,
    pub detail: String,
}

impl TriageWarning {
    pub fn new(kind: TriageErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for TriageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.detail)
    }
}

/// Errors that end a triage run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TriageError {
    #[error("unparsable input: {reason}")]
    UnparsableInput { reason: String },

    #[error("invalid engine configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),
}

impl TriageError {
    pub fn unparsable(reason: impl Into<String>) -> Self {
        Self::UnparsableInput {
            reason: reason.into(),
        }
    }

    /// Taxonomy kind, if this error belongs to it.
    pub fn kind(&self) -> Option<TriageErrorKind> {
        match self {
            Self::UnparsableInput { .. } => Some(TriageErrorKind::UnparsableInput),
            Self::InvalidConfig { .. } | Self::IllegalTransition(_) => None,
        }
    }
}

/// Failure reported by an external collaborator (retriever, explainer).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("collaborator unreachable: {0}")]
    Unreachable(String),

    #[error("collaborator timed out after {0}ms")]
    TimedOut(u64),

    #[error("malformed collaborator response: {0}")]
    Malformed(String),
}

pub type TriageResult<T> = Result<T, TriageError>;
