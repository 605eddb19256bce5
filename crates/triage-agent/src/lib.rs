//! Adapters around the `triage` engine: CI log parsing, the JSON history
//! file, the Ollama explainer, golden-case evaluation, configuration and CLI
//! rendering.

pub mod app;
pub mod config;
pub mod eval;
pub mod history;
pub mod log_parser;
pub mod ollama;
pub mod render;

pub use app::App;
pub use config::{LlmConfig, TriageConfig};
