//! Row store boundary for sheetdb
//!
//! The engine never owns table data. It addresses a [`RowStore`] that looks like
//! "ordered columns + ordered rows, first row = header" and exposes only the
//! handful of primitives below.
//!
//! # Row positions
//!
//! Positions are 1-based and row 1 is the header. The logical row at index `i`
//! (0-based, header removed) lives at position `i + FIRST_DATA_ROW`. That
//! arithmetic exists only in [`RowPosition`].

mod errors;
mod file;
pub mod hash;
mod memory;
mod workbook;

use std::fmt;

pub use errors::{StoreError, StoreResult};
pub use file::JsonFileStore;
pub use hash::{HashAlgorithm, RowDigest, RowHasher, Sha2Digest, CELL_SEPARATOR};
pub use memory::MemoryStore;
pub use workbook::{Sheet, StoredCell, Workbook};

/// Position of the header row
pub const HEADER_ROW: usize = 1;

/// Position of the first data row
pub const FIRST_DATA_ROW: usize = HEADER_ROW + 1;

/// Sheet address: by name or by 0-based index within the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SheetRef {
    Name(String),
    Index(usize),
}

impl fmt::Display for SheetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetRef::Name(name) => write!(f, "{}", name),
            SheetRef::Index(index) => write!(f, "#{}", index),
        }
    }
}

impl From<&str> for SheetRef {
    fn from(name: &str) -> Self {
        SheetRef::Name(name.to_string())
    }
}

impl From<String> for SheetRef {
    fn from(name: String) -> Self {
        SheetRef::Name(name)
    }
}

impl From<usize> for SheetRef {
    fn from(index: usize) -> Self {
        SheetRef::Index(index)
    }
}

/// Resolved table inside a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableHandle {
    /// Store identifier
    pub store_id: String,
    /// Resolved sheet name (default field prefix)
    pub sheet_name: String,
}

impl TableHandle {
    pub fn new(store_id: impl Into<String>, sheet_name: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            sheet_name: sheet_name.into(),
        }
    }
}

/// 1-based row position in the store (row 1 = header)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowPosition(usize);

impl RowPosition {
    /// Wraps a raw 1-based position
    pub fn new(position: usize) -> Self {
        Self(position)
    }

    /// Position of the logical data row at `index`
    pub fn from_index(index: usize) -> Self {
        Self(index + FIRST_DATA_ROW)
    }

    /// Logical data row index, `None` for the header or position 0
    pub fn to_index(self) -> Option<usize> {
        self.0.checked_sub(FIRST_DATA_ROW)
    }

    /// Raw 1-based position
    pub fn get(self) -> usize {
        self.0
    }

    /// True when the position addresses the header row
    pub fn is_header(self) -> bool {
        self.0 == HEADER_ROW
    }
}

impl fmt::Display for RowPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Physical row store collaborator.
///
/// Implementations use interior mutability so one store can be shared by
/// several engines and callers.
pub trait RowStore: Send + Sync {
    /// Resolve a sheet inside a store
    fn open_table(&self, store_id: &str, sheet: &SheetRef) -> StoreResult<TableHandle>;

    /// Header row (unprefixed field names)
    fn read_header(&self, handle: &TableHandle) -> StoreResult<Vec<String>>;

    /// All data rows as text. `display_values_only` asks for rendered values
    /// instead of raw stored values where the store distinguishes them.
    fn read_all_rows(
        &self,
        handle: &TableHandle,
        display_values_only: bool,
    ) -> StoreResult<Vec<Vec<String>>>;

    /// Formula text per data cell, empty where a cell holds no formula
    fn read_formula_rows(&self, handle: &TableHandle) -> StoreResult<Vec<Vec<String>>>;

    /// Append a row after the last data row
    fn append_row(&self, handle: &TableHandle, row: &[String]) -> StoreResult<()>;

    /// Overwrite the row at `position`
    fn write_row_range(
        &self,
        handle: &TableHandle,
        position: RowPosition,
        row: &[String],
    ) -> StoreResult<()>;

    /// Physically remove the row at `position`
    fn delete_row(&self, handle: &TableHandle, position: RowPosition) -> StoreResult<()>;

    /// Position of the last non-empty row (the header when there is no data)
    fn last_row_position(&self, handle: &TableHandle) -> StoreResult<RowPosition>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_position_offsets() {
        assert_eq!(RowPosition::from_index(0).get(), 2);
        assert_eq!(RowPosition::from_index(4).get(), 6);
        assert_eq!(RowPosition::new(2).to_index(), Some(0));
        assert_eq!(RowPosition::new(1).to_index(), None);
        assert!(RowPosition::new(1).is_header());
    }

    #[test]
    fn test_sheet_ref_display() {
        assert_eq!(SheetRef::from("users").to_string(), "users");
        assert_eq!(SheetRef::from(2usize).to_string(), "#2");
    }
}
