//! # JSON File Store
//!
//! One workbook per store, persisted as `<root>/<store_id>.json`. Every
//! mutation rewrites the whole workbook through a temp file and a rename so a
//! reader never sees a half-written file.

use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::Mutex;

use super::errors::{StoreError, StoreResult};
use super::workbook::{Sheet, Workbook};
use super::{RowPosition, RowStore, SheetRef, TableHandle};

/// File-backed row store
#[derive(Debug)]
pub struct JsonFileStore {
    root: PathBuf,
    write_guard: Mutex<()>,
}

impl JsonFileStore {
    /// Create a store rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            write_guard: Mutex::new(()),
        }
    }

    fn workbook_path(&self, store_id: &str) -> PathBuf {
        self.root.join(format!("{}.json", store_id))
    }

    /// Persist a workbook, replacing any existing one
    pub fn save_workbook(&self, store_id: &str, workbook: &Workbook) -> StoreResult<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.workbook_path(store_id);
        let tmp = self.root.join(format!("{}.json.tmp", store_id));
        let bytes = serde_json::to_vec_pretty(workbook)?;
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Load a workbook from disk
    pub fn load_workbook(&self, store_id: &str) -> StoreResult<Workbook> {
        let bytes = fs::read(self.workbook_path(store_id)).map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StoreError::StoreNotFound(store_id.to_string())
            } else {
                StoreError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn read_sheet<T>(&self, handle: &TableHandle, f: impl FnOnce(&Sheet) -> T) -> StoreResult<T> {
        let workbook = self.load_workbook(&handle.store_id)?;
        let sheet = workbook
            .sheet_named(&handle.sheet_name)
            .ok_or_else(|| StoreError::SheetNotFound {
                store_id: handle.store_id.clone(),
                sheet: handle.sheet_name.clone(),
            })?;
        Ok(f(sheet))
    }

    fn update_sheet(
        &self,
        handle: &TableHandle,
        f: impl FnOnce(&mut Sheet) -> StoreResult<()>,
    ) -> StoreResult<()> {
        let _guard = self.write_guard.lock().unwrap();
        let mut workbook = self.load_workbook(&handle.store_id)?;
        let sheet = workbook
            .sheet_named_mut(&handle.sheet_name)
            .ok_or_else(|| StoreError::SheetNotFound {
                store_id: handle.store_id.clone(),
                sheet: handle.sheet_name.clone(),
            })?;
        f(sheet)?;
        self.save_workbook(&handle.store_id, &workbook)
    }
}

impl RowStore for JsonFileStore {
    fn open_table(&self, store_id: &str, sheet: &SheetRef) -> StoreResult<TableHandle> {
        let workbook = self.load_workbook(store_id)?;
        let found = workbook
            .sheet(sheet)
            .ok_or_else(|| StoreError::SheetNotFound {
                store_id: store_id.to_string(),
                sheet: sheet.to_string(),
            })?;
        Ok(TableHandle::new(store_id, found.name.clone()))
    }

    fn read_header(&self, handle: &TableHandle) -> StoreResult<Vec<String>> {
        self.read_sheet(handle, |sheet| sheet.header.clone())
    }

    fn read_all_rows(
        &self,
        handle: &TableHandle,
        _display_values_only: bool,
    ) -> StoreResult<Vec<Vec<String>>> {
        self.read_sheet(handle, Sheet::values)
    }

    fn read_formula_rows(&self, handle: &TableHandle) -> StoreResult<Vec<Vec<String>>> {
        self.read_sheet(handle, Sheet::formulas)
    }

    fn append_row(&self, handle: &TableHandle, row: &[String]) -> StoreResult<()> {
        self.update_sheet(handle, |sheet| {
            sheet.append(row);
            Ok(())
        })
    }

    fn write_row_range(
        &self,
        handle: &TableHandle,
        position: RowPosition,
        row: &[String],
    ) -> StoreResult<()> {
        self.update_sheet(handle, |sheet| sheet.write(position, row))
    }

    fn delete_row(&self, handle: &TableHandle, position: RowPosition) -> StoreResult<()> {
        self.update_sheet(handle, |sheet| sheet.delete(position))
    }

    fn last_row_position(&self, handle: &TableHandle) -> StoreResult<RowPosition> {
        self.read_sheet(handle, Sheet::last_position)
    }
}
