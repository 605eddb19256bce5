//! Golden-case evaluation.
//!
//! A case file is a JSON array of cases, each naming a CI log and what its
//! triage report must show. Every case runs five checks:
//! - classification equals the expected category
//! - flakiness falls inside the expected range (inclusive)
//! - every expected keyword appears in the explanation
//! - at least one expected phrase appears in the suggested actions
//! - overall confidence reaches the minimum
//!
//! Keyword and phrase matching is case-insensitive. Relative log paths are
//! resolved against the case file's directory.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use triage::{FailureType, TriageReport};

/// Minimum overall confidence when a case does not set one.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.5;

fn default_min_confidence() -> f64 {
    DEFAULT_MIN_CONFIDENCE
}

/// One golden case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalCase {
    /// Short identifier, e.g. `GC-001`.
    pub id: String,
    /// Human-readable description.
    pub name: String,
    /// CI log to triage.
    pub log_file: PathBuf,
    pub expected: EvalExpectation,
}

/// What the report for a case must show.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalExpectation {
    pub classification: FailureType,
    /// Inclusive `[min, max]` flakiness bounds.
    pub flaky_probability_range: [f64; 2],
    /// All must appear in the explanation.
    #[serde(default)]
    pub should_contain_keywords: Vec<String>,
    /// At least one must appear in the suggested actions. Empty passes.
    #[serde(default)]
    pub suggested_actions_should_include: Vec<String>,
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
}

/// Pass/fail of each check for one case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalChecks {
    pub classification: bool,
    pub flakiness: bool,
    pub keywords: bool,
    pub actions: bool,
    pub confidence: bool,
}

impl EvalChecks {
    pub fn all_passed(&self) -> bool {
        self.classification && self.flakiness && self.keywords && self.actions && self.confidence
    }
}

/// Outcome of one case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalResult {
    pub case_id: String,
    pub case_name: String,
    pub passed: bool,
    /// One line per failed check, or the analysis error.
    pub errors: Vec<String>,
    pub checks: EvalChecks,
}

impl EvalResult {
    /// A case whose log could not be triaged fails every check.
    pub fn analysis_failed(case: &EvalCase, error: &anyhow::Error) -> Self {
        Self {
            case_id: case.id.clone(),
            case_name: case.name.clone(),
            passed: false,
            errors: vec![format!("Analysis failed: {error:#}")],
            checks: EvalChecks::default(),
        }
    }
}

/// Per-check accuracy across a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckAccuracy {
    pub check: String,
    /// Cases that passed this check.
    pub correct: usize,
    /// `correct / total`, 0 for an empty run.
    pub accuracy: f64,
}

/// Aggregated results of an evaluation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub checks: Vec<CheckAccuracy>,
}

impl EvalSummary {
    pub fn from_results(results: &[EvalResult]) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let ratio = |correct: usize| {
            if total == 0 {
                0.0
            } else {
                correct as f64 / total as f64
            }
        };
        let count = |pick: fn(&EvalChecks) -> bool| {
            results.iter().filter(|r| pick(&r.checks)).count()
        };
        let checks = [
            ("classification", count(|c| c.classification)),
            ("flaky_score", count(|c| c.flakiness)),
            ("keywords", count(|c| c.keywords)),
            ("actions", count(|c| c.actions)),
            ("confidence", count(|c| c.confidence)),
        ]
        .into_iter()
        .map(|(check, correct)| CheckAccuracy {
            check: check.to_string(),
            correct,
            accuracy: ratio(correct),
        })
        .collect();

        Self {
            total,
            passed,
            failed: total - passed,
            checks,
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.passed as f64 / self.total as f64
        }
    }
}

/// Read a case file. Relative `log_file` paths become relative to the
/// case file's directory.
pub fn load_cases(path: &Path) -> Result<Vec<EvalCase>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read eval cases {}", path.display()))?;
    let mut cases: Vec<EvalCase> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse eval cases {}", path.display()))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    for case in &mut cases {
        if case.log_file.is_relative() {
            case.log_file = base.join(&case.log_file);
        }
    }
    Ok(cases)
}

/// Run the five checks of `case` against `report`.
pub fn evaluate_report(case: &EvalCase, report: &TriageReport) -> EvalResult {
    let expected = &case.expected;
    let mut errors = Vec::new();

    let category = report.classification().category;
    let classification = category == expected.classification;
    if !classification {
        errors.push(format!(
            "Classification: got {category}, expected {}",
            expected.classification
        ));
    }

    let [flaky_min, flaky_max] = expected.flaky_probability_range;
    let flaky = report.flakiness_probability();
    let flakiness = (flaky_min..=flaky_max).contains(&flaky);
    if !flakiness {
        errors.push(format!(
            "Flaky score: {flaky:.2} not in range [{flaky_min}, {flaky_max}]"
        ));
    }

    let explanation = report.root_cause_explanation().to_lowercase();
    let missing: Vec<&str> = expected
        .should_contain_keywords
        .iter()
        .filter(|kw| !explanation.contains(&kw.to_lowercase()))
        .map(String::as_str)
        .collect();
    let keywords = missing.is_empty();
    if !keywords {
        errors.push(format!("Missing keywords in explanation: {missing:?}"));
    }

    let actions_text = report
        .suggested_actions()
        .iter()
        .map(|a| a.description.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let phrases = &expected.suggested_actions_should_include;
    let actions = phrases.is_empty()
        || phrases
            .iter()
            .any(|phrase| actions_text.contains(&phrase.to_lowercase()));
    if !actions {
        errors.push(format!("Expected action phrases not found: {phrases:?}"));
    }

    let overall = report.overall_confidence();
    let confidence = overall >= expected.min_confidence;
    if !confidence {
        errors.push(format!(
            "Confidence too low: {overall:.2} < {}",
            expected.min_confidence
        ));
    }

    let checks = EvalChecks {
        classification,
        flakiness,
        keywords,
        actions,
        confidence,
    };
    EvalResult {
        case_id: case.id.clone(),
        case_name: case.name.clone(),
        passed: checks.all_passed(),
        errors,
        checks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_defaults() {
        let cases: Vec<EvalCase> = serde_json::from_str(
            r#"[{
                "id": "GC-1",
                "name": "minimal",
                "log_file": "logs/a.log",
                "expected": {"classification": "network", "flaky_probability_range": [0.5, 1.0]}
            }]"#,
        )
        .unwrap();
        let expected = &cases[0].expected;
        assert_eq!(expected.classification, FailureType::Network);
        assert!(expected.should_contain_keywords.is_empty());
        assert!(expected.suggested_actions_should_include.is_empty());
        assert_eq!(expected.min_confidence, DEFAULT_MIN_CONFIDENCE);
    }

    #[test]
    fn test_load_cases_resolves_relative_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(
            &path,
            r#"[
              {"id": "a", "name": "relative", "log_file": "logs/a.log",
               "expected": {"classification": "timeout", "flaky_probability_range": [0, 1]}},
              {"id": "b", "name": "absolute", "log_file": "/var/log/b.log",
               "expected": {"classification": "timeout", "flaky_probability_range": [0, 1]}}
            ]"#,
        )
        .unwrap();
        let cases = load_cases(&path).unwrap();
        assert_eq!(cases[0].log_file, dir.path().join("logs/a.log"));
        assert_eq!(cases[1].log_file, PathBuf::from("/var/log/b.log"));
    }

    #[test]
    fn test_load_cases_rejects_bad_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cases.json");
        std::fs::write(&path, r#"[{"id": "a"}]"#).unwrap();
        assert!(load_cases(&path).is_err());
        assert!(load_cases(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_summary_accuracy() {
        let result = |passed: bool, checks: EvalChecks| EvalResult {
            case_id: "x".into(),
            case_name: "x".into(),
            passed,
            errors: Vec::new(),
            checks,
        };
        let all = EvalChecks {
            classification: true,
            flakiness: true,
            keywords: true,
            actions: true,
            confidence: true,
        };
        let wrong_class = EvalChecks {
            classification: false,
            ..all
        };
        let summary = EvalSummary::from_results(&[
            result(true, all),
            result(false, wrong_class),
            result(true, all),
            result(false, EvalChecks::default()),
        ]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.pass_rate(), 0.5);
        assert_eq!(summary.checks[0].check, "classification");
        assert_eq!(summary.checks[0].correct, 2);
        assert_eq!(summary.checks[1].correct, 3);
        assert_eq!(summary.checks[1].accuracy, 0.75);
    }

    #[test]
    fn test_empty_summary() {
        let summary = EvalSummary::from_results(&[]);
        assert_eq!(summary.total, 0);
        assert_eq!(summary.pass_rate(), 0.0);
        assert!(summary.checks.iter().all(|c| c.accuracy == 0.0));
    }
}
