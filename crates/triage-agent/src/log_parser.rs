//! CI log parser.
//!
//! Turns a plain-text test log into a [`FailureRecord`]. Lines look like
//! `[2024-01-15 10:23:45] ERROR: message`; the timestamp is optional and
//! unrecognized lines are kept as `INFO`.
//!
//! Extraction rules:
//! - test name from `Starting test: <name>`, falling back to `FAIL: <name> - ...`
//! - error message is the first `ERROR`/`FAIL` message
//! - excerpt is every `ERROR`/`FAIL` message, capped at [`MAX_EXCERPT_LINES`]
//! - `Retry attempt N/M` opens attempt N; it passes if a `PASS` line or a
//!   "successful" message appears before the next attempt
//!
//! A log without a test name or an error line is `UnparsableInput`.

use std::path::Path;
use std::sync::LazyLock;

use chrono::{NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use triage::record::metadata_keys;
use triage::{FailureRecord, RetryOutcome, TriageError};

pub const MAX_EXCERPT_LINES: usize = 10;

static LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:\[(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})\]\s*)?(INFO|ERROR|FAIL|PASS|WARNING|NOTE):\s?(.*)$",
    )
    .unwrap()
});
static STARTING_TEST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Starting test:\s*(\S+)").unwrap());
static RETRY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)retry attempt\s+(\d+)(?:\s*/\s*\d+)?").unwrap());
static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"after (\d+(?:\.\d+)?)s\b").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Error,
    Fail,
    Pass,
    Warning,
    Note,
}

impl LogLevel {
    fn parse(s: &str) -> Self {
        match s {
            "ERROR" => Self::Error,
            "FAIL" => Self::Fail,
            "PASS" => Self::Pass,
            "WARNING" => Self::Warning,
            "NOTE" => Self::Note,
            _ => Self::Info,
        }
    }

    pub fn is_failure(self) -> bool {
        matches!(self, Self::Error | Self::Fail)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: Option<NaiveDateTime>,
    pub level: LogLevel,
    pub message: String,
}

/// Split a log into entries, skipping blank lines.
pub fn parse_entries(content: &str) -> Vec<LogEntry> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match LINE_RE.captures(line) {
            Some(caps) => LogEntry {
                timestamp: caps.get(1).and_then(|m| {
                    NaiveDateTime::parse_from_str(m.as_str(), "%Y-%m-%d %H:%M:%S").ok()
                }),
                level: LogLevel::parse(&caps[2]),
                message: caps[3].trim().to_string(),
            },
            None => LogEntry {
                timestamp: None,
                level: LogLevel::Info,
                message: line.to_string(),
            },
        })
        .collect()
}

/// Parse log text. `source` names the log in errors and metadata.
pub fn parse_str(content: &str, source: &str) -> Result<FailureRecord, TriageError> {
    let entries = parse_entries(content);

    let test_name = extract_test_name(&entries)
        .ok_or_else(|| TriageError::unparsable(format!("no test name found in {source}")))?;
    let failure_lines: Vec<&str> = entries
        .iter()
        .filter(|e| e.level.is_failure())
        .map(|e| e.message.as_str())
        .collect();
    let error_message = failure_lines
        .first()
        .filter(|m| !m.is_empty())
        .ok_or_else(|| TriageError::unparsable(format!("no ERROR or FAIL line in {source}")))?;

    let mut record = FailureRecord::new(test_name, *error_message)
        .with_excerpt(failure_lines.iter().take(MAX_EXCERPT_LINES).copied())
        .with_metadata(metadata_keys::SOURCE_FILE, source);
    record.retry_outcomes = extract_retries(&entries);

    if let Some(ts) = entries.iter().find_map(|e| e.timestamp) {
        record.timestamp = Utc.from_utc_datetime(&ts);
    }
    if let Some(duration) = extract_duration(&entries) {
        record = record.with_metadata(metadata_keys::DURATION_SECONDS, duration);
    }
    let artifacts = extract_artifacts(&entries);
    if !artifacts.is_empty() {
        record = record.with_metadata(metadata_keys::ARTIFACTS, artifacts.join(","));
    }
    if let Some(error_type) = error_type_hint(&failure_lines) {
        record = record.with_metadata(metadata_keys::ERROR_TYPE, error_type);
    }

    record.validate()?;
    tracing::debug!(
        source,
        test = %record.test_name,
        entries = entries.len(),
        retries = record.retry_outcomes.len(),
        "Parsed CI log"
    );
    Ok(record)
}

/// Read and parse a log file. Unreadable files are unparsable input.
pub fn parse_file(path: &Path) -> Result<FailureRecord, TriageError> {
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let content = std::fs::read_to_string(path)
        .map_err(|e| TriageError::unparsable(format!("cannot read {}: {e}", path.display())))?;
    parse_str(&content, &source)
}

fn extract_test_name(entries: &[LogEntry]) -> Option<String> {
    let started = entries
        .iter()
        .find_map(|e| STARTING_TEST_RE.captures(&e.message))
        .map(|caps| caps[1].to_string());
    started.or_else(|| {
        entries
            .iter()
            .filter(|e| e.level == LogLevel::Fail)
            .find_map(|e| e.message.split_whitespace().next())
            .map(|name| name.trim_end_matches([':', ',']).to_string())
    })
}

fn extract_retries(entries: &[LogEntry]) -> Vec<RetryOutcome> {
    let mut attempts: Vec<RetryOutcome> = Vec::new();
    for entry in entries {
        if let Some(caps) = RETRY_RE.captures(&entry.message) {
            if let Ok(n) = caps[1].parse::<u32>() {
                attempts.push(RetryOutcome::failed(n));
                continue;
            }
        }
        let Some(current) = attempts.last_mut() else {
            continue;
        };
        if current.passed {
            continue;
        }
        if entry.level == LogLevel::Pass || entry.message.to_lowercase().contains("successful") {
            current.passed = true;
            current.error_message = None;
        } else if entry.level.is_failure() && current.error_message.is_none() {
            current.error_message = Some(entry.message.clone());
        }
    }
    attempts
}

fn extract_duration(entries: &[LogEntry]) -> Option<String> {
    entries
        .iter()
        .find_map(|e| DURATION_RE.captures(&e.message))
        .map(|caps| caps[1].to_string())
}

fn extract_artifacts(entries: &[LogEntry]) -> Vec<String> {
    entries
        .iter()
        .filter(|e| e.message.to_lowercase().contains("screenshot"))
        .flat_map(|e| e.message.split_whitespace())
        .filter(|word| {
            let lower = word.to_lowercase();
            lower.ends_with(".png") || lower.ends_with(".jpg") || lower.ends_with(".jpeg")
        })
        .map(str::to_string)
        .collect()
}

/// Coarse error family, kept as metadata for reporting.
fn error_type_hint(failure_lines: &[&str]) -> Option<&'static str> {
    let text = failure_lines.join(" ").to_lowercase();
    if text.contains("timeout") {
        Some("TimeoutError")
    } else if text.contains("selector") || text.contains("element not found") {
        Some("SelectorError")
    } else if text.contains("connection") || text.contains("network") {
        Some("NetworkError")
    } else if text.contains("database") || text.contains("duplicate key") {
        Some("DatabaseError")
    } else {
        None
    }
}
