//! Flakiness scoring.
//!
//! ```text
//! score = w_retry · retry_signal + w_history · history_signal + w_prior · prior
//! ```
//!
//! Weights are normalized to sum to 1 (defaults 0.6 / 0.15 / 0.25), so a
//! single passing retry alone lifts the score to at least 0.6.

pub mod scorer;
pub mod stats;

pub use scorer::{
    history_signal, retry_signal, FlakinessBreakdown, FlakinessLevel, FlakinessScorer,
    FlakinessWeights,
};
pub use stats::{HistoricalStats, HistoricalStatsSource, NoHistory};
