//! Worklist store interface.
//!
//! A store is a set of named sheets, each an ordered grid of string cells.
//! Row 0 of a worklist sheet is its header. Row and column indices are
//! 0-based and always refer to positions in the grid returned by the most
//! recent [`WorklistStore::read_all`].
use crate::failure::{Classify, FailureKind};
use thiserror::Error;

mod json_store;
mod migrate;
mod record;
mod schema;

pub use json_store::JsonWorkbook;
pub use migrate::{already_migrated, snapshot_row};
pub use record::{Enrichment, Record, NOT_FOUND, NO_VALUE};
pub use schema::{required_header, ColumnMap};

/// One targeted cell write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellUpdate {
    pub row: usize,
    pub col: usize,
    pub value: String,
}

impl CellUpdate {
    pub fn new(row: usize, col: usize, value: impl Into<String>) -> Self {
        Self {
            row,
            col,
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("worklist store unavailable: {0}")]
    Unavailable(String),
    #[error("worklist store quota exceeded: {0}")]
    RateLimited(String),
    #[error("sheet {0:?} not found")]
    SheetNotFound(String),
    #[error("row {row} is out of range for sheet {sheet:?}")]
    RowOutOfRange { sheet: String, row: usize },
    #[error("worklist is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),
    #[error("worklist store is corrupt: {0}")]
    Corrupt(String),
}

impl Classify for StoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::Unavailable(_) => FailureKind::StoreUnavailable,
            StoreError::RateLimited(_) => FailureKind::RateLimited,
            StoreError::SheetNotFound(_)
            | StoreError::RowOutOfRange { .. }
            | StoreError::MissingColumns(_)
            | StoreError::Corrupt(_) => FailureKind::Unclassified,
        }
    }
}

/// Spreadsheet-like persistence for the pending and completed sheets.
pub trait WorklistStore {
    /// Every row of `sheet`, header included.
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError>;

    /// Apply targeted cell updates to existing rows, widening rows as needed.
    fn write_cells(&mut self, sheet: &str, cells: &[CellUpdate]) -> Result<(), StoreError>;

    fn append_row(&mut self, sheet: &str, values: &[String]) -> Result<(), StoreError>;

    /// Remove `row`; rows after it shift up by one.
    fn delete_row(&mut self, sheet: &str, row: usize) -> Result<(), StoreError>;

    /// Create `sheet` with the given dimensions if missing. Returns whether
    /// it was created.
    fn ensure_sheet(&mut self, sheet: &str, rows: usize, cols: usize) -> Result<bool, StoreError>;
}
