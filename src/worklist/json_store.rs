//! Local JSON workbook backing the worklist store.
//!
//! The whole document is re-read for every call and rewritten atomically
//! (temp file in the same directory, then rename), so an external edit made
//! between scans is always observed and a crash never leaves a torn file.
use super::{CellUpdate, StoreError, WorklistStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const WORKBOOK_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Default, Serialize, Deserialize)]
struct WorkbookDoc {
    schema_version: u32,
    #[serde(default)]
    sheets: BTreeMap<String, SheetData>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SheetData {
    #[serde(default)]
    rows: Vec<Vec<String>>,
    /// Requested grid size; informational only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grid_rows: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    grid_cols: Option<usize>,
}

/// A workbook stored as one JSON file of named sheets.
#[derive(Debug, Clone)]
pub struct JsonWorkbook {
    path: PathBuf,
}

impl JsonWorkbook {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Write an empty workbook unless one already exists. Returns whether a
    /// file was written.
    pub fn create(path: impl Into<PathBuf>) -> Result<(Self, bool), StoreError> {
        let book = Self::open(path);
        if book.path.exists() {
            return Ok((book, false));
        }
        book.save(&WorkbookDoc {
            schema_version: WORKBOOK_SCHEMA_VERSION,
            sheets: BTreeMap::new(),
        })?;
        Ok((book, true))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Names of every sheet, sorted.
    pub fn sheet_names(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.load()?.sheets.into_keys().collect())
    }

    fn load(&self) -> Result<WorkbookDoc, StoreError> {
        let bytes = fs::read(&self.path).map_err(|err| io_error(&self.path, "read", err))?;
        let doc: WorkbookDoc = serde_json::from_slice(&bytes).map_err(|err| {
            StoreError::Corrupt(format!("parse {}: {err}", self.path.display()))
        })?;
        if doc.schema_version != WORKBOOK_SCHEMA_VERSION {
            return Err(StoreError::Corrupt(format!(
                "unsupported workbook schema_version {} in {}",
                doc.schema_version,
                self.path.display()
            )));
        }
        Ok(doc)
    }

    fn save(&self, doc: &WorkbookDoc) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(doc)
            .map_err(|err| StoreError::Corrupt(format!("serialize workbook: {err}")))?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .map_err(|err| io_error(&self.path, "create temp file for", err))?;
        tmp.write_all(text.as_bytes())
            .map_err(|err| io_error(&self.path, "write", err))?;
        tmp.persist(&self.path)
            .map_err(|err| io_error(&self.path, "replace", err.error))?;
        Ok(())
    }

    fn update<T>(
        &self,
        sheet: &str,
        edit: impl FnOnce(&mut SheetData) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut doc = self.load()?;
        let data = doc
            .sheets
            .get_mut(sheet)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))?;
        let value = edit(data)?;
        self.save(&doc)?;
        Ok(value)
    }
}

fn io_error(path: &Path, action: &str, err: io::Error) -> StoreError {
    StoreError::Unavailable(format!("{action} {}: {err}", path.display()))
}

fn check_row(sheet: &str, data: &SheetData, row: usize) -> Result<(), StoreError> {
    if row >= data.rows.len() {
        return Err(StoreError::RowOutOfRange {
            sheet: sheet.to_string(),
            row,
        });
    }
    Ok(())
}

impl WorklistStore for JsonWorkbook {
    fn read_all(&self, sheet: &str) -> Result<Vec<Vec<String>>, StoreError> {
        let mut doc = self.load()?;
        doc.sheets
            .remove(sheet)
            .map(|data| data.rows)
            .ok_or_else(|| StoreError::SheetNotFound(sheet.to_string()))
    }

    fn write_cells(&mut self, sheet: &str, cells: &[CellUpdate]) -> Result<(), StoreError> {
        self.update(sheet, |data| {
            for update in cells {
                check_row(sheet, data, update.row)?;
            }
            for update in cells {
                let row = &mut data.rows[update.row];
                if row.len() <= update.col {
                    row.resize(update.col + 1, String::new());
                }
                row[update.col] = update.value.clone();
            }
            Ok(())
        })
    }

    fn append_row(&mut self, sheet: &str, values: &[String]) -> Result<(), StoreError> {
        self.update(sheet, |data| {
            data.rows.push(values.to_vec());
            Ok(())
        })
    }

    fn delete_row(&mut self, sheet: &str, row: usize) -> Result<(), StoreError> {
        self.update(sheet, |data| {
            check_row(sheet, data, row)?;
            data.rows.remove(row);
            Ok(())
        })
    }

    fn ensure_sheet(&mut self, sheet: &str, rows: usize, cols: usize) -> Result<bool, StoreError> {
        let mut doc = self.load()?;
        if doc.sheets.contains_key(sheet) {
            return Ok(false);
        }
        doc.sheets.insert(
            sheet.to_string(),
            SheetData {
                rows: Vec::new(),
                grid_rows: Some(rows),
                grid_cols: Some(cols),
            },
        );
        self.save(&doc)?;
        Ok(true)
    }
}
