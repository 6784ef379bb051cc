//! In-process row store

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::errors::{StoreError, StoreResult};
use super::workbook::{Sheet, Workbook};
use super::{RowPosition, RowStore, SheetRef, TableHandle};

/// Row store keeping every workbook in memory.
///
/// Cloning shares the underlying data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    workbooks: Arc<RwLock<HashMap<String, Workbook>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers (or replaces) a workbook under `store_id`
    pub fn with_workbook(self, store_id: impl Into<String>, workbook: Workbook) -> Self {
        self.put_workbook(store_id, workbook);
        self
    }

    pub fn put_workbook(&self, store_id: impl Into<String>, workbook: Workbook) {
        let mut workbooks = self.workbooks.write().unwrap();
        workbooks.insert(store_id.into(), workbook);
    }

    /// Snapshot of a sheet, for inspection
    pub fn sheet(&self, store_id: &str, sheet_name: &str) -> Option<Sheet> {
        let workbooks = self.workbooks.read().unwrap();
        workbooks
            .get(store_id)
            .and_then(|book| book.sheet_named(sheet_name))
            .cloned()
    }

    fn read_sheet<T>(&self, handle: &TableHandle, f: impl FnOnce(&Sheet) -> T) -> StoreResult<T> {
        let workbooks = self.workbooks.read().unwrap();
        let sheet = workbooks
            .get(&handle.store_id)
            .ok_or_else(|| StoreError::StoreNotFound(handle.store_id.clone()))?
            .sheet_named(&handle.sheet_name)
            .ok_or_else(|| sheet_not_found(handle))?;
        Ok(f(sheet))
    }

    fn update_sheet<T>(
        &self,
        handle: &TableHandle,
        f: impl FnOnce(&mut Sheet) -> StoreResult<T>,
    ) -> StoreResult<T> {
        let mut workbooks = self.workbooks.write().unwrap();
        let sheet = workbooks
            .get_mut(&handle.store_id)
            .ok_or_else(|| StoreError::StoreNotFound(handle.store_id.clone()))?
            .sheet_named_mut(&handle.sheet_name)
            .ok_or_else(|| sheet_not_found(handle))?;
        f(sheet)
    }
}

fn sheet_not_found(handle: &TableHandle) -> StoreError {
    StoreError::SheetNotFound {
        store_id: handle.store_id.clone(),
        sheet: handle.sheet_name.clone(),
    }
}

impl RowStore for MemoryStore {
    fn open_table(&self, store_id: &str, sheet: &SheetRef) -> StoreResult<TableHandle> {
        let workbooks = self.workbooks.read().unwrap();
        let book = workbooks
            .get(store_id)
            .ok_or_else(|| StoreError::StoreNotFound(store_id.to_string()))?;
        let found = book.sheet(sheet).ok_or_else(|| StoreError::SheetNotFound {
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
        // Formulas are never evaluated here, so raw and display values coincide.
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

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new().with_workbook(
            "book",
            Workbook::new().with_sheet(Sheet::new("users", &["id", "name"]).with_row(&["1", "Ann"])),
        )
    }

    #[test]
    fn test_open_missing_store_and_sheet() {
        let store = store();
        assert!(matches!(
            store.open_table("nope", &SheetRef::from("users")),
            Err(StoreError::StoreNotFound(_))
        ));
        assert!(matches!(
            store.open_table("book", &SheetRef::from("orders")),
            Err(StoreError::SheetNotFound { .. })
        ));
    }

    #[test]
    fn test_open_by_index_resolves_name() {
        let store = store();
        let handle = store.open_table("book", &SheetRef::Index(0)).unwrap();
        assert_eq!(handle.sheet_name, "users");
    }

    #[test]
    fn test_append_write_delete() {
        let store = store();
        let handle = store.open_table("book", &SheetRef::from("users")).unwrap();

        store
            .append_row(&handle, &["2".to_string(), "Bo".to_string()])
            .unwrap();
        assert_eq!(store.last_row_position(&handle).unwrap().get(), 3);

        store
            .write_row_range(&handle, RowPosition::new(3), &["2".to_string(), "Bea".to_string()])
            .unwrap();
        assert_eq!(store.read_all_rows(&handle, true).unwrap()[1][1], "Bea");

        store.delete_row(&handle, RowPosition::new(2)).unwrap();
        let rows = store.read_all_rows(&handle, true).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0], "2");
    }

    #[test]
    fn test_clones_share_data() {
        let store = store();
        let other = store.clone();
        let handle = store.open_table("book", &SheetRef::from("users")).unwrap();
        store
            .append_row(&handle, &["2".to_string(), "Bo".to_string()])
            .unwrap();
        assert_eq!(other.sheet("book", "users").unwrap().rows.len(), 2);
    }
}
