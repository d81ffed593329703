//! Append-only run history.
//!
//! One JSONL line per processed row, so failed rows can be triaged after a
//! long unattended run without scraping logs.
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::failure::FailureKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// Enriched and left in the worklist (not yet complete).
    Enriched,
    /// Enriched and moved to the completed sheet.
    Migrated,
    NotFound,
    /// A profile may exist but could not be read; sentinels written.
    Unreadable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub ts_epoch_ms: u128,
    pub sheet: String,
    pub row: usize,
    pub name: String,
    pub city: String,
    pub outcome: RowOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_url: Option<String>,
}

impl HistoryEntry {
    pub fn failure_kind(mut self, kind: FailureKind) -> Self {
        self.failure = Some(kind.as_str().to_string());
        self
    }
}

#[derive(Debug, Clone)]
pub struct RunHistory {
    path: PathBuf,
}

impl RunHistory {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one entry as a JSONL line.
    pub fn append(&self, entry: &HistoryEntry) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).context("create history dir")?;
            }
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open {}", self.path.display()))?;
        let line = serde_json::to_string(entry).context("serialize history entry")?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("write {}", self.path.display()))?;
        file.write_all(b"\n")
            .with_context(|| format!("write {}", self.path.display()))?;
        Ok(())
    }

    /// Read every entry back; a missing file reads as empty.
    #[cfg(test)]
    pub fn read_all(&self) -> Result<Vec<HistoryEntry>> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read {}", self.path.display()));
            }
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(idx, line)| {
                serde_json::from_str(line).with_context(|| {
                    format!("parse {} entry {}", self.path.display(), idx + 1)
                })
            })
            .collect()
    }
}

pub fn now_epoch_ms() -> Result<u128> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("compute timestamp")?
        .as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(row: usize, outcome: RowOutcome) -> HistoryEntry {
        HistoryEntry {
            ts_epoch_ms: 1,
            sheet: "Leads".to_string(),
            row,
            name: "Jean Dupont".to_string(),
            city: "Paris".to_string(),
            outcome,
            failure: None,
            profile_url: None,
        }
    }

    #[test]
    fn entries_are_appended_in_order() {
        let dir = tempfile::tempdir().expect("temp dir");
        let history = RunHistory::new(dir.path().join("logs").join("history.jsonl"));
        history.append(&entry(3, RowOutcome::Migrated)).expect("append");
        history
            .append(&entry(2, RowOutcome::Unreadable).failure_kind(FailureKind::RateLimited))
            .expect("append");

        let entries = history.read_all().expect("read");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].outcome, RowOutcome::Migrated);
        assert_eq!(entries[1].failure.as_deref(), Some("rate_limited"));

        let text = fs::read_to_string(history.path()).expect("read raw");
        assert!(text.lines().next().expect("line").contains("\"outcome\":\"migrated\""));
    }

    #[test]
    fn missing_history_reads_as_empty() {
        let dir = tempfile::tempdir().expect("temp dir");
        let history = RunHistory::new(dir.path().join("none.jsonl"));
        assert!(history.read_all().expect("read").is_empty());
    }
}
