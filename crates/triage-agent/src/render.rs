//! Plain-text rendering for the CLI.

use std::fmt::Write as _;

use triage::retrieval::{FlakyTest, HistorySummary};
use triage::{BatchEntry, BatchOutcome, BatchSummary, TriageReport};

use crate::eval::{EvalResult, EvalSummary};

const RULE: &str = "------------------------------------------------------------";

fn truncate(text: &str, max: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{cut}...")
}

pub fn render_report(source: &str, report: &TriageReport, verbose: bool) -> String {
    let mut out = String::new();
    let class = report.classification();
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(out, "Triage: {} ({source})", report.test_name());
    let _ = writeln!(out, "{RULE}");
    let _ = writeln!(
        out,
        "Classification:  {} (confidence {:.0}%)",
        class.category,
        class.confidence * 100.0
    );
    let _ = writeln!(
        out,
        "Flakiness:       {:.0}% ({})",
        report.flakiness_probability() * 100.0,
        report.flakiness_level()
    );
    let _ = writeln!(
        out,
        "Overall:         {:.0}% confidence",
        report.overall_confidence() * 100.0
    );

    let _ = writeln!(out);
    let _ = writeln!(out, "Root cause:");
    let _ = writeln!(out, "  {}", report.root_cause_explanation());

    let _ = writeln!(out);
    let _ = writeln!(out, "Suggested actions:");
    for (i, action) in report.suggested_actions().iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} [{:.0}%]",
            i + 1,
            action.description,
            action.confidence * 100.0
        );
    }

    if !report.similar_failures().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Similar past failures:");
        for hit in report.similar_failures() {
            let _ = writeln!(
                out,
                "  - {} ({:.0}% similar): {}",
                hit.test_name,
                hit.similarity * 100.0,
                truncate(&hit.error_message, 70)
            );
            if verbose {
                if let Some(res) = &hit.resolution {
                    let status = if res.outcome_confirmed { "confirmed" } else { "unconfirmed" };
                    let _ = writeln!(out, "      fix ({status}): {}", res.fix_description);
                    if let Some(cause) = &res.root_cause {
                        let _ = writeln!(out, "      root cause: {cause}");
                    }
                }
            }
        }
    }

    if !report.warnings().is_empty() {
        let _ = writeln!(out);
        let _ = writeln!(out, "Warnings:");
        for warning in report.warnings() {
            let _ = writeln!(out, "  {warning}");
        }
    }
    out
}

pub fn render_batch(entries: &[BatchEntry], summary: &BatchSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<32} {:<12} {:>6} {:>6} {:>6}",
        "LOG", "CATEGORY", "CONF", "FLAKY", "OVERALL"
    );
    let _ = writeln!(out, "{RULE}{RULE}");
    for entry in entries {
        match &entry.outcome {
            BatchOutcome::Reported { report } => {
                let _ = writeln!(
                    out,
                    "{:<32} {:<12} {:>5.0}% {:>5.0}% {:>6.0}%",
                    truncate(&entry.source, 32),
                    report.classification().category.as_str(),
                    report.classification().confidence * 100.0,
                    report.flakiness_probability() * 100.0,
                    report.overall_confidence() * 100.0,
                );
            }
            BatchOutcome::Skipped { error } => {
                let _ = writeln!(
                    out,
                    "{:<32} skipped: {}",
                    truncate(&entry.source, 32),
                    truncate(error, 60)
                );
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} log(s): {} triaged, {} skipped, {} likely flaky",
        summary.total, summary.reported, summary.skipped, summary.likely_flaky
    );
    if summary.reported > 0 {
        let _ = writeln!(
            out,
            "Mean flakiness {:.0}%, mean confidence {:.0}%",
            summary.mean_flakiness * 100.0,
            summary.mean_confidence * 100.0
        );
        let _ = writeln!(out, "By category:");
        for (category, count) in &summary.by_category {
            let _ = writeln!(out, "  {:<12} {count}", category.as_str());
        }
    }
    out
}

pub fn render_stats(path: &str, summary: &HistorySummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "History: {path}");
    let _ = writeln!(out, "  records:        {}", summary.total_records);
    let _ = writeln!(out, "  distinct tests: {}", summary.distinct_tests);
    let _ = writeln!(out, "  resolved:       {}", summary.resolved);
    let _ = writeln!(out, "  confirmed:      {}", summary.confirmed);
    if !summary.by_category.is_empty() {
        let _ = writeln!(out, "Resolutions by category:");
        for (category, count) in &summary.by_category {
            let _ = writeln!(out, "  {:<12} {count}", category.as_str());
        }
    }
    out
}

pub fn render_flaky(tests: &[FlakyTest], threshold: f64) -> String {
    let mut out = String::new();
    if tests.is_empty() {
        let _ = writeln!(
            out,
            "No tests in history at or above {:.0}% flakiness.",
            threshold * 100.0
        );
        return out;
    }
    let _ = writeln!(
        out,
        "{:<40} {:<12} {:>6} {:>5}",
        "TEST", "CATEGORY", "FLAKY", "SEEN"
    );
    for test in tests {
        let _ = writeln!(
            out,
            "{:<40} {:<12} {:>5.0}% {:>5}",
            truncate(&test.test_name, 40),
            test.category.as_str(),
            test.flakiness * 100.0,
            test.occurrences
        );
    }
    out
}

fn mark(ok: bool) -> &'static str {
    if ok {
        "ok"
    } else {
        "FAIL"
    }
}

pub fn render_eval(results: &[EvalResult], summary: &EvalSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<30} {:<6} {:<6} {:<6} {:<6} {:<6} {}",
        "CASE", "NAME", "CLASS", "FLAKY", "KEYS", "ACTS", "CONF", "RESULT"
    );
    let _ = writeln!(out, "{RULE}{RULE}");
    for r in results {
        let c = r.checks;
        let _ = writeln!(
            out,
            "{:<10} {:<30} {:<6} {:<6} {:<6} {:<6} {:<6} {}",
            truncate(&r.case_id, 10),
            truncate(&r.case_name, 30),
            mark(c.classification),
            mark(c.flakiness),
            mark(c.keywords),
            mark(c.actions),
            mark(c.confidence),
            if r.passed { "PASS" } else { "FAIL" }
        );
    }

    let failed: Vec<_> = results.iter().filter(|r| !r.passed).collect();
    if !failed.is_empty() {
        let _ = writeln!(out);
        for r in failed {
            let _ = writeln!(out, "{}: {}", r.case_id, r.case_name);
            for err in &r.errors {
                let _ = writeln!(out, "  - {err}");
            }
        }
    }

    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "{} case(s): {} passed, {} failed ({:.1}%)",
        summary.total,
        summary.passed,
        summary.failed,
        summary.pass_rate() * 100.0
    );
    for check in &summary.checks {
        let _ = writeln!(
            out,
            "  {:<16} {}/{} ({:.1}%)",
            check.check,
            check.correct,
            summary.total,
            check.accuracy * 100.0
        );
    }
    out
}
