//! Triage: deterministic reasoning over CI test failures.
//!
//! Given one normalized [`FailureRecord`], the engine classifies the failure,
//! estimates how likely it is to be flaky, pulls similar historical failures
//! (with their resolutions) through a retrieval contract, and ranks suggested
//! actions into a [`TriageReport`]. Output is advisory only.
//!
//! The crate is split leaf-first:
//!
//! - [`record`]: failure records, resolutions, signatures
//! - [`classifier`]: ordered rule table over error text
//! - [`flakiness`]: retry/history/prior weighted score
//! - [`retrieval`]: async retriever contract plus an in-memory store
//! - [`ranker`]: heuristic + historical suggestion ranking
//! - [`orchestrator`]: the linear triage pipeline and its async engine
//!
//! External collaborators (retriever, explainer) are traits; every call to
//! them goes through [`resilience::CallOutcome`] so the pipeline itself stays
//! pure and a degraded collaborator never aborts a run.

pub mod batch;
pub mod classifier;
pub mod error;
pub mod explain;
pub mod flakiness;
pub mod orchestrator;
pub mod ranker;
pub mod record;
pub mod report;
pub mod resilience;
pub mod retrieval;

pub use batch::{run_batch, BatchEntry, BatchInput, BatchOutcome, BatchSummary};
pub use classifier::{Classification, Classifier, ClassifierConfig, ClassifierVerdict};
pub use error::{CollaboratorError, TriageError, TriageErrorKind, TriageWarning};
pub use explain::{Explainer, ExplanationContext, RuleBasedExplainer, EXPLANATION_UNAVAILABLE};
pub use flakiness::{
    FlakinessLevel, FlakinessScorer, FlakinessWeights, HistoricalStats, HistoricalStatsSource,
};
pub use orchestrator::{Analysis, EngineConfig, TriageEngine, TriagePipeline};
pub use ranker::{RankerConfig, SuggestedAction, SuggestionRanker, SuggestionSource};
pub use record::{
    failure_signature, FailureRecord, FailureType, HistoricalRecord, Resolution, RetryOutcome,
};
pub use report::{SimilarFailure, TriageReport};
pub use resilience::{CallOutcome, DegradationLevel, ServiceHealth};
pub use retrieval::{InMemoryHistory, RetrievedFailure, SimilarityRetriever};
