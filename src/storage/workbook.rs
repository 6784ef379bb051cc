//! Workbook model shared by the bundled stores

use serde::{Deserialize, Serialize};

use super::errors::{StoreError, StoreResult};
use super::{RowPosition, SheetRef, HEADER_ROW};

/// One stored cell: its text value and, optionally, the formula behind it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCell {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
}

impl StoredCell {
    pub fn value(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            formula: None,
        }
    }

    /// Applies written text. Text starting with `=` is kept as formula and
    /// the rendered value is left as it was.
    fn write(&mut self, text: &str) {
        if text.starts_with('=') {
            self.formula = Some(text.to_string());
        } else {
            self.value = text.to_string();
            self.formula = None;
        }
    }

    fn from_text(text: &str) -> Self {
        let mut cell = StoredCell::default();
        cell.write(text);
        cell
    }
}

/// A named sheet: header plus data rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sheet {
    pub name: String,
    pub header: Vec<String>,
    #[serde(default)]
    pub rows: Vec<Vec<StoredCell>>,
}

impl Sheet {
    pub fn new(name: impl Into<String>, header: &[&str]) -> Self {
        Self {
            name: name.into(),
            header: header.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Adds a data row of plain values
    pub fn with_row(mut self, row: &[&str]) -> Self {
        self.rows
            .push(row.iter().map(|v| StoredCell::value(*v)).collect());
        self
    }

    pub fn values(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| row.iter().map(|cell| cell.value.clone()).collect())
            .collect()
    }

    pub fn formulas(&self) -> Vec<Vec<String>> {
        self.rows
            .iter()
            .map(|row| {
                row.iter()
                    .map(|cell| cell.formula.clone().unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    pub fn append(&mut self, row: &[String]) {
        self.rows
            .push(row.iter().map(|text| StoredCell::from_text(text)).collect());
    }

    pub fn write(&mut self, position: RowPosition, row: &[String]) -> StoreResult<()> {
        let index = self.data_index(position)?;
        let cells = &mut self.rows[index];
        if cells.len() < row.len() {
            cells.resize(row.len(), StoredCell::default());
        }
        for (cell, text) in cells.iter_mut().zip(row) {
            cell.write(text);
        }
        Ok(())
    }

    pub fn delete(&mut self, position: RowPosition) -> StoreResult<()> {
        let index = self.data_index(position)?;
        self.rows.remove(index);
        Ok(())
    }

    pub fn last_position(&self) -> RowPosition {
        RowPosition::new(self.rows.len() + HEADER_ROW)
    }

    fn data_index(&self, position: RowPosition) -> StoreResult<usize> {
        position
            .to_index()
            .filter(|index| *index < self.rows.len())
            .ok_or(StoreError::RowOutOfRange(position.get()))
    }
}

/// A store: an ordered list of sheets
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Sheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sheet(mut self, sheet: Sheet) -> Self {
        self.sheets.push(sheet);
        self
    }

    pub fn sheet(&self, sheet: &SheetRef) -> Option<&Sheet> {
        match sheet {
            SheetRef::Name(name) => self.sheets.iter().find(|s| &s.name == name),
            SheetRef::Index(index) => self.sheets.get(*index),
        }
    }

    pub fn sheet_named(&self, name: &str) -> Option<&Sheet> {
        self.sheets.iter().find(|s| s.name == name)
    }

    pub fn sheet_named_mut(&mut self, name: &str) -> Option<&mut Sheet> {
        self.sheets.iter_mut().find(|s| s.name == name)
    }
}
