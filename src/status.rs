//! Read-only worklist summary for `lead-enrich status`.
use anyhow::{Context, Result};
use serde::Serialize;

use crate::site::ProfileUrls;
use crate::worklist::{ColumnMap, Record, StoreError, WorklistStore, NOT_FOUND, NO_VALUE};

/// Row counts by enrichment state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RowCounts {
    /// Never enriched.
    pub pending: usize,
    /// Canonical URL but no oath date yet.
    pub awaiting_date: usize,
    /// Complete but not yet moved (an interrupted run).
    pub ready_to_migrate: usize,
    pub not_found: usize,
    pub unreadable: usize,
    pub missing_identity: usize,
    /// URL cell holds something that is neither a profile nor a sentinel.
    pub unrecognized: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub worklist_sheet: String,
    pub completed_sheet: String,
    pub worklist_rows: usize,
    pub counts: RowCounts,
    /// `None` when the completed sheet does not exist yet.
    pub completed_rows: Option<usize>,
}

/// Classify every worklist row without touching the store.
pub fn build_status(
    store: &dyn WorklistStore,
    worklist_sheet: &str,
    completed_sheet: &str,
    urls: &ProfileUrls,
) -> Result<StatusReport> {
    let rows = store
        .read_all(worklist_sheet)
        .with_context(|| format!("read sheet {worklist_sheet:?}"))?;
    let header = rows.first().cloned().unwrap_or_default();
    let columns = ColumnMap::resolve(&header).context("resolve worklist header")?;
    let mut counts = RowCounts::default();
    for (idx, cells) in rows.iter().enumerate().skip(1) {
        let record = Record::from_row(idx, cells, &columns);
        if !record.has_identity() {
            counts.missing_identity += 1;
        } else if record.is_complete(urls) {
            counts.ready_to_migrate += 1;
        } else if urls.is_profile_url(&record.profile_url) {
            counts.awaiting_date += 1;
        } else if record.profile_url.is_empty() {
            counts.pending += 1;
        } else if record.profile_url == NOT_FOUND {
            counts.not_found += 1;
        } else if record.profile_url == NO_VALUE {
            counts.unreadable += 1;
        } else {
            counts.unrecognized += 1;
        }
    }
    let completed_rows = match store.read_all(completed_sheet) {
        Ok(rows) => Some(rows.len().saturating_sub(1)),
        Err(StoreError::SheetNotFound(_)) => None,
        Err(err) => {
            return Err(err).with_context(|| format!("read sheet {completed_sheet:?}"));
        }
    };
    Ok(StatusReport {
        worklist_sheet: worklist_sheet.to_string(),
        completed_sheet: completed_sheet.to_string(),
        worklist_rows: rows.len().saturating_sub(1),
        counts,
        completed_rows,
    })
}

pub fn format_status(report: &StatusReport) -> String {
    let counts = &report.counts;
    let mut lines = vec![
        format!(
            "worklist: {} ({} rows)",
            report.worklist_sheet, report.worklist_rows
        ),
        format!("  pending: {}", counts.pending),
        format!("  awaiting date: {}", counts.awaiting_date),
        format!("  ready to migrate: {}", counts.ready_to_migrate),
        format!("  not found: {}", counts.not_found),
        format!("  unreadable: {}", counts.unreadable),
    ];
    if counts.missing_identity > 0 {
        lines.push(format!("  missing name or city: {}", counts.missing_identity));
    }
    if counts.unrecognized > 0 {
        lines.push(format!("  unrecognized URL cell: {}", counts.unrecognized));
    }
    lines.push(match report.completed_rows {
        Some(rows) => format!("completed: {} ({rows} rows)", report.completed_sheet),
        None => format!("completed: {} (not created yet)", report.completed_sheet),
    });
    lines.join("\n")
}

pub fn print_status(report: &StatusReport) {
    println!("{}", format_status(report));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::SiteConfig;
    use crate::test_support::MemoryWorkbook;

    const URL: &str = "https://www.doctrine.fr/p/avocat/ABC123";

    fn urls() -> ProfileUrls {
        ProfileUrls::new(&SiteConfig::default()).expect("urls")
    }

    fn header() -> [&'static str; 10] {
        [
            "First Name",
            "Last Name",
            "CITY",
            "speciality 1",
            "speciality 2",
            "speciality 3",
            "speciality 4",
            "speciality 5",
            "Serment",
            "doctrineURL",
        ]
    }

    #[test]
    fn rows_are_counted_by_state() {
        let header = header();
        let store = MemoryWorkbook::default().with_sheet(
            "Leads",
            &[
                &header,
                &["A", "A", "Paris"],
                &["B", "B", "Paris", "", "", "", "", "", "Not found", "Not found"],
                &["C", "C", "Paris", "", "", "", "", "", "Not found", "None"],
                &["D", "D", "Paris", "", "", "", "", "", "Not found", URL],
                &["E", "E", "Paris", "", "", "", "", "", "12 mars 2015", URL],
                &["F", "F", ""],
                &["G", "G", "Paris", "", "", "", "", "", "", "http://elsewhere"],
            ],
        );
        let report = build_status(&store, "Leads", "Completed", &urls()).expect("status");
        assert_eq!(report.worklist_rows, 7);
        assert_eq!(
            report.counts,
            RowCounts {
                pending: 1,
                awaiting_date: 1,
                ready_to_migrate: 1,
                not_found: 1,
                unreadable: 1,
                missing_identity: 1,
                unrecognized: 1,
            }
        );
        assert_eq!(report.completed_rows, None);
        assert!(format_status(&report).contains("completed: Completed (not created yet)"));
    }

    #[test]
    fn completed_rows_exclude_the_header() {
        let header = header();
        let store = MemoryWorkbook::default()
            .with_sheet("Leads", &[&header])
            .with_sheet("Completed", &[&header, &["E", "E", "Paris"]]);
        let report = build_status(&store, "Leads", "Completed", &urls()).expect("status");
        assert_eq!(report.completed_rows, Some(1));
        let text = format_status(&report);
        assert!(text.starts_with("worklist: Leads (0 rows)"));
        assert!(text.contains("completed: Completed (1 rows)"));
        assert!(!text.contains("missing name"));
    }

    #[test]
    fn missing_worklist_sheet_is_an_error() {
        let store = MemoryWorkbook::default();
        let err = build_status(&store, "Leads", "Completed", &urls()).expect_err("no sheet");
        assert!(format!("{err:#}").contains("Leads"));
    }
}
