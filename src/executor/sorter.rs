//! Result sorting for query execution

use std::cmp::Ordering;

use super::compare::sort_order;
use super::result::Table;
use crate::errors::DbResult;
use crate::planner::{resolve_field, SortDirection, SortSpec};

/// Sorts table rows
pub struct ResultSorter;

impl ResultSorter {
    /// Multi-key stable sort: the first key decides unless equal, then the
    /// next, and so on. Sort fields resolve strictly.
    pub fn sort(table: &mut Table, specs: &[SortSpec]) -> DbResult<()> {
        if specs.is_empty() {
            return Ok(());
        }

        let keys = specs
            .iter()
            .map(|spec| Ok((resolve_field(&spec.field, &table.fields)?, spec.direction)))
            .collect::<DbResult<Vec<_>>>()?;

        table.rows.sort_by(|a, b| {
            for (index, direction) in &keys {
                let ordering = sort_order(&a[*index], &b[*index]);
                let ordering = match direction {
                    SortDirection::Asc => ordering,
                    SortDirection::Desc => ordering.reverse(),
                };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        Ok(())
    }
}
