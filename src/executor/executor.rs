//! Query executor for sheetdb
//!
//! Execution flow (strict order):
//! 1. Fetch the primary table (fields prefixed, cells parsed, soft-deleted
//!    rows dropped unless requested)
//! 2. Fold in each join, in declaration order
//! 3. Filter by the query's groups
//! 4. Sort
//! 5. Project the requested fields

use crate::codec::{parse, CellValue};
use crate::errors::DbResult;
use crate::planner::{resolve_field, validate_filter_groups, Projection, Query, TableRef};
use crate::storage::{RowStore, TableHandle};

use super::filters::PredicateFilter;
use super::join::join;
use super::result::Table;
use super::sorter::ResultSorter;

/// Soft-delete marker column
pub const DELETED_AT: &str = "deleted_at";

/// Runs read queries against a row store
pub struct QueryExecutor<'a> {
    store: &'a dyn RowStore,
}

impl<'a> QueryExecutor<'a> {
    pub fn new(store: &'a dyn RowStore) -> Self {
        Self { store }
    }

    /// Loads one table with prefixed fields and parsed cells
    pub fn fetch_table(&self, table: &TableRef, with_trashed: bool) -> DbResult<Table> {
        let handle = self.store.open_table(&table.store_id, &table.sheet)?;
        let header = self.store.read_header(&handle)?;
        let raw_rows = self.store.read_all_rows(&handle, true)?;

        let deleted_at = header.iter().position(|field| field == DELETED_AT);
        let rows: Vec<Vec<CellValue>> = raw_rows
            .into_iter()
            .map(|row| pad_row(row, header.len()))
            .filter(|row| {
                with_trashed || deleted_at.map_or(true, |index| row[index].is_empty())
            })
            .map(|row| row.iter().map(|cell| parse(cell)).collect())
            .collect();

        let prefix = prefix_for(table, &handle);
        let fields: Vec<String> = header
            .iter()
            .map(|field| format!("{}.{}", prefix, field))
            .collect();
        Ok(Table::new(fields, rows))
    }

    /// Runs the full read pipeline
    pub fn execute(&self, query: &Query, projection: &Projection) -> DbResult<Table> {
        let mut table = self.fetch_table(&query.source, query.with_trashed)?;

        for spec in &query.joins {
            let other = self.fetch_table(&spec.table, query.with_trashed)?;
            table = join(&table, &other, &spec.criteria)?;
        }

        let groups = validate_filter_groups(&query.groups, &table.fields, query.strict_fields)?;
        table.rows = PredicateFilter::filter_rows(table.rows, &groups)?;

        ResultSorter::sort(&mut table, &query.sort)?;

        project(table, projection)
    }
}

/// Field prefix: the alias when given, else the resolved sheet name
fn prefix_for<'t>(table: &'t TableRef, handle: &'t TableHandle) -> &'t str {
    table.alias.as_deref().unwrap_or(&handle.sheet_name)
}

/// Pads short rows with empty cells and drops cells past the header
pub(crate) fn pad_row(mut row: Vec<String>, width: usize) -> Vec<String> {
    row.resize(width, String::new());
    row
}

/// Keeps only the requested fields, in the requested order
pub fn project(table: Table, projection: &Projection) -> DbResult<Table> {
    let requested = match projection {
        Projection::All => return Ok(table),
        Projection::Fields(fields) => fields,
    };

    let indices = requested
        .iter()
        .map(|name| resolve_field(name, &table.fields))
        .collect::<DbResult<Vec<_>>>()?;

    let fields: Vec<String> = indices.iter().map(|i| table.fields[*i].clone()).collect();
    let rows: Vec<Vec<CellValue>> = table
        .rows
        .into_iter()
        .map(|row| {
            indices
                .iter()
                .map(|i| row.get(*i).cloned().unwrap_or(CellValue::Null))
                .collect()
        })
        .collect();
    Ok(Table::new(fields, rows))
}
