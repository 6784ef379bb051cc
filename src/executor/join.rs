//! Nested-loop inner join
//!
//! Every main row is paired with every join row; a pair is kept when all
//! criteria hold. Cost is O(|main| x |join| x |criteria|) with no indexing,
//! so large tables should be filtered before joining.

use super::compare::evaluate;
use super::result::Table;
use crate::codec::CellValue;
use crate::errors::{DbError, DbResult};
use crate::planner::{resolve_field, JoinCriterion, Operator};

struct BoundCriterion<'a> {
    left: usize,
    operator: &'a Operator,
    right: usize,
}

/// Joins `join` onto `main`. Result fields are main's followed by join's.
pub fn join(main: &Table, join: &Table, criteria: &[JoinCriterion]) -> DbResult<Table> {
    if criteria.is_empty() {
        return Err(DbError::missing_or_wrong_params(
            "A join needs at least one criterion",
        ));
    }

    let bound = criteria
        .iter()
        .map(|criterion| bind(criterion, main, join))
        .collect::<DbResult<Vec<_>>>()?;

    let mut rows = Vec::new();
    for main_row in &main.rows {
        for join_row in &join.rows {
            if pair_matches(main_row, join_row, &bound)? {
                let mut row = Vec::with_capacity(main_row.len() + join_row.len());
                row.extend(main_row.iter().cloned());
                row.extend(join_row.iter().cloned());
                rows.push(row);
            }
        }
    }

    let mut fields = main.fields.clone();
    fields.extend(join.fields.iter().cloned());
    Ok(Table::new(fields, rows))
}

fn bind<'a>(criterion: &'a JoinCriterion, main: &Table, join: &Table) -> DbResult<BoundCriterion<'a>> {
    let resolve = || -> DbResult<(usize, usize)> {
        Ok((
            resolve_field(&criterion.left, &main.fields)?,
            resolve_field(&criterion.right, &join.fields)?,
        ))
    };
    let (left, right) = resolve().map_err(|err| {
        err.with_context(format!(
            "join criterion [{}, {}, {}]",
            criterion.left, criterion.operator, criterion.right
        ))
    })?;
    Ok(BoundCriterion {
        left,
        operator: &criterion.operator,
        right,
    })
}

fn pair_matches(
    main_row: &[CellValue],
    join_row: &[CellValue],
    criteria: &[BoundCriterion<'_>],
) -> DbResult<bool> {
    for criterion in criteria {
        if !evaluate(&main_row[criterion.left], criterion.operator, &join_row[criterion.right])? {
            return Ok(false);
        }
    }
    Ok(true)
}
