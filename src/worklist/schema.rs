//! Header resolution.
//!
//! Columns are addressed by name. The header is resolved once per scan into
//! a [`ColumnMap`] so a reordered or widened sheet is picked up on the next
//! pass.
use super::StoreError;
use crate::categories::CATEGORY_SLOTS;

pub const FIRST_NAME_COLUMN: &str = "First Name";
pub const LAST_NAME_COLUMN: &str = "Last Name";
pub const CITY_COLUMN: &str = "CITY";
pub const CATEGORY_COLUMNS: [&str; CATEGORY_SLOTS] = [
    "speciality 1",
    "speciality 2",
    "speciality 3",
    "speciality 4",
    "speciality 5",
];
pub const DATE_COLUMN: &str = "Serment";
pub const PROFILE_URL_COLUMN: &str = "doctrineURL";

/// Column positions of every required field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMap {
    pub first_name: usize,
    pub last_name: usize,
    pub city: usize,
    pub categories: [usize; CATEGORY_SLOTS],
    pub date: usize,
    pub profile_url: usize,
    /// Header width; snapshots are padded to this many cells.
    pub width: usize,
}

impl ColumnMap {
    /// Resolve required column names against a header row. Header cells are
    /// compared after trimming; all missing names are reported together.
    pub fn resolve(header: &[String]) -> Result<Self, StoreError> {
        let names: Vec<&str> = header.iter().map(|cell| cell.trim()).collect();
        let mut missing = Vec::new();
        let mut find = |name: &str| -> usize {
            match names.iter().position(|cell| *cell == name) {
                Some(idx) => idx,
                None => {
                    missing.push(name.to_string());
                    0
                }
            }
        };
        let first_name = find(FIRST_NAME_COLUMN);
        let last_name = find(LAST_NAME_COLUMN);
        let city = find(CITY_COLUMN);
        let mut categories = [0; CATEGORY_SLOTS];
        for (slot, name) in categories.iter_mut().zip(CATEGORY_COLUMNS) {
            *slot = find(name);
        }
        let date = find(DATE_COLUMN);
        let profile_url = find(PROFILE_URL_COLUMN);
        if !missing.is_empty() {
            return Err(StoreError::MissingColumns(missing));
        }
        Ok(Self {
            first_name,
            last_name,
            city,
            categories,
            date,
            profile_url,
            width: header.len(),
        })
    }
}

/// Header used when creating a fresh worklist.
pub fn required_header() -> Vec<String> {
    let mut header = vec![
        FIRST_NAME_COLUMN.to_string(),
        LAST_NAME_COLUMN.to_string(),
        CITY_COLUMN.to_string(),
    ];
    header.extend(CATEGORY_COLUMNS.iter().map(|name| name.to_string()));
    header.push(DATE_COLUMN.to_string());
    header.push(PROFILE_URL_COLUMN.to_string());
    header
}
