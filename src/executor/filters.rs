//! Row filtering over resolved filter groups

use super::compare::evaluate;
use crate::codec::CellValue;
use crate::errors::DbResult;
use crate::planner::{ResolvedCondition, ResolvedFilter, ResolvedGroup};

/// Evaluates filter groups against rows
pub struct PredicateFilter;

impl PredicateFilter {
    /// True iff ANY group holds. No groups at all match every row.
    pub fn matches_row(row: &[CellValue], groups: &[ResolvedGroup]) -> DbResult<bool> {
        if groups.is_empty() {
            return Ok(true);
        }
        for group in groups {
            if Self::matches_group(row, group)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Keeps the rows matching `groups`, in order
    pub fn filter_rows(
        rows: Vec<Vec<CellValue>>,
        groups: &[ResolvedGroup],
    ) -> DbResult<Vec<Vec<CellValue>>> {
        let mut kept = Vec::with_capacity(rows.len());
        for row in rows {
            if Self::matches_row(&row, groups)? {
                kept.push(row);
            }
        }
        Ok(kept)
    }

    /// ALL conditions must hold
    fn matches_group(row: &[CellValue], group: &ResolvedGroup) -> DbResult<bool> {
        for condition in &group.conditions {
            let holds = match condition {
                ResolvedCondition::Compare(filter) => Self::matches_filter(row, filter)?,
                ResolvedCondition::Any(filters) => Self::matches_any(row, filters)?,
            };
            if !holds {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// OR clause: ANY inner filter; empty is true
    fn matches_any(row: &[CellValue], filters: &[ResolvedFilter]) -> DbResult<bool> {
        if filters.is_empty() {
            return Ok(true);
        }
        for filter in filters {
            if Self::matches_filter(row, filter)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn matches_filter(row: &[CellValue], filter: &ResolvedFilter) -> DbResult<bool> {
        // Unresolved (lenient) field = no match
        let Some(index) = filter.index else {
            return Ok(false);
        };
        let cell = row.get(index).unwrap_or(&CellValue::Null);
        evaluate(cell, &filter.operator, &filter.value)
    }
}
