//! Failure record model: the single input to a triage run, plus the
//! historical records and resolutions the retriever hands back.

pub mod signature;
pub mod types;

pub use signature::{failure_signature, MAX_SIGNATURE_LEN};
pub use types::{
    metadata_keys, FailureRecord, FailureType, HistoricalRecord, Resolution, RetryOutcome,
    UnknownCategory,
};
