//! Typed view over one worklist row.
use super::{CellUpdate, ColumnMap};
use crate::categories::{empty_slots, pad_slots};
use crate::site::ProfileUrls;

/// Written to the date and URL columns when nothing could be found.
pub const NOT_FOUND: &str = "Not found";
/// Written to the URL column when a profile exists but could not be read.
pub const NO_VALUE: &str = "None";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Grid row index (header is row 0).
    pub row: usize,
    pub first_name: String,
    pub last_name: String,
    pub city: String,
    pub categories: Vec<String>,
    pub date: String,
    pub profile_url: String,
}

fn cell(cells: &[String], col: usize) -> String {
    cells
        .get(col)
        .map(|value| value.trim().to_string())
        .unwrap_or_default()
}

impl Record {
    /// Read a row; short rows yield empty strings for the missing cells.
    pub fn from_row(row: usize, cells: &[String], columns: &ColumnMap) -> Self {
        Self {
            row,
            first_name: cell(cells, columns.first_name),
            last_name: cell(cells, columns.last_name),
            city: cell(cells, columns.city),
            categories: columns
                .categories
                .iter()
                .map(|col| cell(cells, *col))
                .collect(),
            date: cell(cells, columns.date),
            profile_url: cell(cells, columns.profile_url),
        }
    }

    pub fn has_identity(&self) -> bool {
        !self.first_name.is_empty() && !self.last_name.is_empty() && !self.city.is_empty()
    }

    pub fn same_identity(&self, other: &Record) -> bool {
        self.first_name == other.first_name
            && self.last_name == other.last_name
            && self.city == other.city
    }

    /// A row is complete once it has a canonical profile URL and a real date.
    pub fn is_complete(&self, urls: &ProfileUrls) -> bool {
        urls.is_profile_url(&self.profile_url) && !self.date.is_empty() && self.date != NOT_FOUND
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Values written back to a row after one enrichment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enrichment {
    pub categories: Vec<String>,
    pub date: String,
    pub profile_url: String,
}

impl Enrichment {
    pub fn new(categories: Vec<String>, date: impl Into<String>, profile_url: impl Into<String>) -> Self {
        Self {
            categories: pad_slots(categories),
            date: date.into(),
            profile_url: profile_url.into(),
        }
    }

    /// Nothing matched the person.
    pub fn not_found() -> Self {
        Self::new(empty_slots(), NOT_FOUND, NOT_FOUND)
    }

    /// A profile may exist but its data could not be obtained.
    pub fn unreadable() -> Self {
        Self::new(empty_slots(), NOT_FOUND, NO_VALUE)
    }

    pub fn cell_updates(&self, row: usize, columns: &ColumnMap) -> Vec<CellUpdate> {
        let mut updates: Vec<CellUpdate> = columns
            .categories
            .iter()
            .zip(&self.categories)
            .map(|(col, value)| CellUpdate::new(row, *col, value.as_str()))
            .collect();
        updates.push(CellUpdate::new(row, columns.date, self.date.as_str()));
        updates.push(CellUpdate::new(row, columns.profile_url, self.profile_url.as_str()));
        updates
    }
}
