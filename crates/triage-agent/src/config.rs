use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use triage::EngineConfig;

pub const DEFAULT_HISTORY_PATH: &str = "data/history.json";

/// Ollama endpoint used by the explainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub base_url: String,
    pub model: String,
    /// Low temperature keeps explanations consistent between runs.
    pub temperature: f32,
    pub max_tokens: u32,
    /// When false the rule-based explainer is used.
    pub enabled: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".into(),
            model: "llama3.2:3b".into(),
            temperature: 0.1,
            max_tokens: 2000,
            enabled: true,
        }
    }
}

/// Top-level agent configuration: defaults, then TOML file, then
/// `TRIAGE_*` environment variables. CLI flags are applied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriageConfig {
    pub history_path: PathBuf,
    pub llm: LlmConfig,
    /// Records triaged concurrently by `batch`.
    pub concurrency: usize,
    /// Upper bound on log files read by `batch` (None = all).
    pub batch_limit: Option<usize>,
    pub engine: EngineConfig,
}

impl Default for TriageConfig {
    fn default() -> Self {
        Self {
            history_path: PathBuf::from(DEFAULT_HISTORY_PATH),
            llm: LlmConfig::default(),
            concurrency: 4,
            batch_limit: None,
            engine: EngineConfig::default(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}: {reason}")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

fn parse_var<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigError::InvalidEnv {
            var,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

impl TriageConfig {
    /// Load from an optional TOML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config
            .engine
            .validate()
            .context("Invalid engine configuration")?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config TOML {}", path.display()))
    }

    /// Apply `TRIAGE_*` overrides read through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("TRIAGE_HISTORY_PATH") {
            self.history_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("TRIAGE_LLM_URL") {
            self.llm.base_url = v.trim_end_matches('/').to_string();
        }
        if let Some(v) = lookup("TRIAGE_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Some(v) = lookup("TRIAGE_TOP_K") {
            self.engine.top_k = parse_var("TRIAGE_TOP_K", &v)?;
        }
        if let Some(v) = lookup("TRIAGE_RETRIEVAL_TIMEOUT_SECS") {
            let secs: u64 = parse_var("TRIAGE_RETRIEVAL_TIMEOUT_SECS", &v)?;
            self.engine.retrieval_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(v) = lookup("TRIAGE_EXPLAIN_TIMEOUT_SECS") {
            let secs: u64 = parse_var("TRIAGE_EXPLAIN_TIMEOUT_SECS", &v)?;
            self.engine.explanation_timeout_ms = secs.saturating_mul(1000);
        }
        if let Some(v) = lookup("TRIAGE_CONCURRENCY") {
            self.concurrency = parse_var("TRIAGE_CONCURRENCY", &v)?;
        }
        Ok(())
    }
}
