//! JSON history file: an array of `HistoricalRecord`s.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use triage::{HistoricalRecord, InMemoryHistory};

/// Read every record in the history file. A missing file is an empty list.
pub fn read_records(path: &Path) -> Result<Vec<HistoricalRecord>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read history {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let records: Vec<HistoricalRecord> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse history JSON {}", path.display()))?;
    Ok(records.into_iter().map(HistoricalRecord::normalized).collect())
}

/// Load the history store. A missing file yields an empty store and a warning.
pub fn load_history(path: &Path) -> Result<InMemoryHistory> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "History file not found, triaging without historical context"
        );
        return Ok(InMemoryHistory::new());
    }
    let records = read_records(path)?;
    info!(path = %path.display(), records = records.len(), "Loaded failure history");
    Ok(InMemoryHistory::from_records(records))
}

/// Write the full record list, replacing the file via a temp sibling.
pub fn write_records(path: &Path, records: &[HistoricalRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(records).context("Failed to serialize history")?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, json).with_context(|| format!("Failed to write {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to replace history {}", path.display()))?;
    Ok(())
}

/// Append one record and return the new record count.
pub fn append_record(path: &Path, record: HistoricalRecord) -> Result<usize> {
    let mut records = read_records(path)?;
    records.push(record.normalized());
    write_records(path, &records)?;
    Ok(records.len())
}
