//! Triage orchestration: the pure pipeline, its state machine, overall
//! confidence, and the async engine that drives collaborators.

pub mod confidence;
pub mod engine;
pub mod pipeline;
pub mod state_machine;

pub use confidence::{overall_confidence, retrieval_evidence, ConfidenceWeights};
pub use engine::{EngineConfig, TriageEngine};
pub use pipeline::{Analysis, ClassifiedRun, ReceivedRun, RetrievedRun, ScoredRun, TriagePipeline};
pub use state_machine::{IllegalTransition, TransitionRecord, TriageState, TriageStateMachine};
