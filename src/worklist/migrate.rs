//! Helpers for moving finished rows into the completed sheet.
use super::{ColumnMap, Record};

/// True when the completed sheet already holds `record` (same name, city
/// and profile URL), which happens after a crash between append and delete.
///
/// Columns are located through the completed sheet's own header. A header
/// that cannot be resolved never matches.
pub fn already_migrated(completed: &[Vec<String>], record: &Record) -> bool {
    let Some(header) = completed.first() else {
        return false;
    };
    let Ok(columns) = ColumnMap::resolve(header) else {
        return false;
    };
    completed
        .iter()
        .enumerate()
        .skip(1)
        .map(|(idx, cells)| Record::from_row(idx, cells, &columns))
        .any(|done| done.same_identity(record) && done.profile_url == record.profile_url)
}

/// Copy of a pending row padded to the header width.
pub fn snapshot_row(cells: &[String], width: usize) -> Vec<String> {
    let mut snapshot = cells.to_vec();
    if snapshot.len() < width {
        snapshot.resize(width, String::new());
    }
    snapshot
}
