//! Wiring between the CLI commands and the triage engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use triage::retrieval::{FlakyTest, HistorySummary};
use triage::{
    run_batch, BatchEntry, BatchInput, BatchSummary, Explainer, FailureType, HistoricalRecord,
    InMemoryHistory, Resolution, RuleBasedExplainer, TriageEngine, TriageReport,
};

use crate::config::TriageConfig;
use crate::eval::{self, EvalResult, EvalSummary};
use crate::history;
use crate::log_parser;
use crate::ollama::OllamaExplainer;

pub struct App {
    config: TriageConfig,
    history: Arc<InMemoryHistory>,
    engine: Arc<TriageEngine>,
}

impl App {
    /// Load history and pick the explainer: Ollama when enabled and
    /// `use_llm`, otherwise the rule-based one.
    pub fn new(config: TriageConfig, use_llm: bool) -> Result<Self> {
        let history = history::load_history(&config.history_path)?;
        let explainer: Arc<dyn Explainer> = if use_llm && config.llm.enabled {
            info!(url = %config.llm.base_url, model = %config.llm.model, "Using Ollama explainer");
            Arc::new(OllamaExplainer::new(&config.llm))
        } else {
            Arc::new(RuleBasedExplainer)
        };
        Self::with_history(config, history, explainer)
    }

    pub fn with_history(
        config: TriageConfig,
        history: InMemoryHistory,
        explainer: Arc<dyn Explainer>,
    ) -> Result<Self> {
        let history = Arc::new(history);
        let engine = TriageEngine::new(
            config.engine.clone(),
            history.clone(),
            history.clone(),
            explainer,
        )
        .context("Failed to build triage engine")?;
        Ok(Self {
            config,
            history,
            engine: Arc::new(engine),
        })
    }

    pub fn config(&self) -> &TriageConfig {
        &self.config
    }

    pub fn engine(&self) -> &TriageEngine {
        &self.engine
    }

    pub async fn analyze_file(&self, path: &Path) -> Result<TriageReport> {
        let record = log_parser::parse_file(path)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        let report = self
            .engine
            .triage(record)
            .await
            .with_context(|| format!("Failed to triage {}", path.display()))?;
        Ok(report)
    }

    /// Triage every `*.log` file in `dir`, sorted by name. Entries come back
    /// in input order.
    pub async fn batch_dir(
        &self,
        dir: &Path,
        limit: Option<usize>,
        concurrency: usize,
    ) -> Result<(Vec<BatchEntry>, BatchSummary)> {
        let paths = collect_logs(dir, limit)?;
        if paths.is_empty() {
            warn!(dir = %dir.display(), "No .log files found");
        }
        let inputs = paths
            .iter()
            .map(|path| {
                let source = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                BatchInput::new(source, log_parser::parse_file(path))
            })
            .collect();

        let mut entries = run_batch(self.engine.clone(), inputs, concurrency).await;
        entries.sort_by_key(|e| e.index);
        let summary = BatchSummary::from_entries(&entries);
        Ok((entries, summary))
    }

    /// Record how a failure was fixed. The category defaults to the
    /// classifier's verdict for the log.
    pub fn learn(
        &self,
        log: &Path,
        fix: &str,
        category: Option<FailureType>,
        confirmed: bool,
        root_cause: Option<&str>,
    ) -> Result<HistoricalRecord> {
        anyhow::ensure!(!fix.trim().is_empty(), "Fix description must not be empty");
        let failure = log_parser::parse_file(log)
            .with_context(|| format!("Failed to parse {}", log.display()))?;
        let category = category
            .unwrap_or_else(|| self.engine.pipeline().classifier().classify(&failure).category);

        let mut resolution = Resolution::new(&failure, category, fix.trim());
        resolution.outcome_confirmed = confirmed;
        if let Some(cause) = root_cause.filter(|c| !c.trim().is_empty()) {
            resolution = resolution.with_root_cause(cause.trim());
        }

        let record = HistoricalRecord::new(failure, Some(resolution));
        let total = history::append_record(&self.config.history_path, record.clone())?;
        info!(
            id = %record.id,
            test = %record.failure.test_name,
            category = %category,
            total,
            "Resolution recorded"
        );
        Ok(record)
    }

    /// Run every golden case in `cases_path`, in file order. A case whose
    /// log fails to parse or triage is a failed result, not an error.
    pub async fn evaluate(&self, cases_path: &Path) -> Result<(Vec<EvalResult>, EvalSummary)> {
        let cases = eval::load_cases(cases_path)?;
        let mut results = Vec::with_capacity(cases.len());
        for case in &cases {
            let result = match self.analyze_file(&case.log_file).await {
                Ok(report) => eval::evaluate_report(case, &report),
                Err(err) => EvalResult::analysis_failed(case, &err),
            };
            if result.passed {
                info!(case = %case.id, "Eval case passed");
            } else {
                warn!(case = %case.id, errors = ?result.errors, "Eval case failed");
            }
            results.push(result);
        }
        let summary = EvalSummary::from_results(&results);
        Ok((results, summary))
    }

    pub fn stats(&self) -> HistorySummary {
        self.history.summary()
    }

    pub fn flaky(&self, threshold: f64) -> Vec<FlakyTest> {
        let pipeline = self.engine.pipeline();
        self.history
            .flaky_tests(pipeline.classifier(), pipeline.scorer(), threshold)
    }
}

/// `*.log` files in `dir`, sorted, optionally capped.
pub fn collect_logs(dir: &Path, limit: Option<usize>) -> Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read log directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "log"))
        .collect();
    paths.sort();
    if let Some(limit) = limit {
        paths.truncate(limit);
    }
    Ok(paths)
}
