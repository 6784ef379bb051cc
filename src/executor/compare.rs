//! Comparison evaluator
//!
//! Both operands go through the codec (stringify, then parse) before they are
//! compared, so a typed value and its stored text compare identically:
//! `Text("5") = Number(5)` holds. The one exception: a text cell compared with
//! a date filter value is read as a date directly.

use std::cmp::Ordering;

use crate::codec::{parse, parse_date_lenient, stringify, CellValue};
use crate::errors::{DbError, DbResult};
use crate::planner::{Operator, ScaledComparison};

/// Evaluates `cell <operator> filter_value`
pub fn evaluate(cell: &CellValue, operator: &Operator, filter_value: &CellValue) -> DbResult<bool> {
    let value = normalize(filter_value);
    let cell_value = match (&value, normalize(cell)) {
        (CellValue::Date(_), CellValue::Text(text)) => match parse_date_lenient(&text) {
            Some(date) => CellValue::Date(date),
            None => CellValue::Text(text),
        },
        (_, other) => other,
    };

    let result = match operator {
        Operator::Eq => values_equal(&cell_value, &value),
        Operator::Ne => !values_equal(&cell_value, &value),
        Operator::Gt => compare_values(&cell_value, &value) == Ordering::Greater,
        Operator::Lt => compare_values(&cell_value, &value) == Ordering::Less,
        Operator::Gte => compare_values(&cell_value, &value) != Ordering::Less,
        Operator::Lte => compare_values(&cell_value, &value) != Ordering::Greater,
        Operator::In => contains(&value, &cell_value)?,
        Operator::NotIn => !contains(&value, &cell_value)?,
        Operator::Pattern(re) => re.is_match(&stringify(cell)),
        Operator::Predicate(predicate) => predicate(&cell_value, &value),
        Operator::Scaled {
            multiplier,
            comparison,
        } => scaled(&cell_value, &value, *multiplier, *comparison),
    };
    Ok(result)
}

/// Runs a value through its stored form
pub fn normalize(value: &CellValue) -> CellValue {
    parse(&stringify(value))
}

/// Codec equality: numbers and dates by value, everything else by stored text
pub fn values_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x == y,
        (CellValue::Date(x), CellValue::Date(y)) => x == y,
        _ => stringify(a) == stringify(b),
    }
}

/// Ordering used by range operators: numeric when both are numbers,
/// chronological when both are dates, lexicographic otherwise.
///
/// Not transitive across mixed types (`9 < 10`, `"10" < "5x"`, `"5x" < "9"`),
/// so it must never drive a sort. Use [`sort_order`] for that.
pub fn compare_values(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Number(x), CellValue::Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
        _ => stringify(a).cmp(&stringify(b)),
    }
}

/// Total order for sorting. Values rank by type first
/// (null, bool, number, date, text, json) and by value within a type.
pub fn sort_order(a: &CellValue, b: &CellValue) -> Ordering {
    match (a, b) {
        (CellValue::Bool(x), CellValue::Bool(y)) => x.cmp(y),
        (CellValue::Number(x), CellValue::Number(y)) => x.total_cmp(y),
        (CellValue::Date(x), CellValue::Date(y)) => x.cmp(y),
        (CellValue::Text(x), CellValue::Text(y)) => x.cmp(y),
        (CellValue::Json(_), CellValue::Json(_)) => stringify(a).cmp(&stringify(b)),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn type_rank(value: &CellValue) -> u8 {
    match value {
        CellValue::Null => 0,
        CellValue::Bool(_) => 1,
        CellValue::Number(_) => 2,
        CellValue::Date(_) => 3,
        CellValue::Text(_) => 4,
        CellValue::Json(_) => 5,
    }
}

fn contains(list: &CellValue, cell: &CellValue) -> DbResult<bool> {
    match list {
        CellValue::Json(serde_json::Value::Array(items)) => Ok(items
            .iter()
            .map(|item| normalize(&CellValue::from_json(item)))
            .any(|item| values_equal(cell, &item))),
        other => Err(DbError::missing_or_wrong_params(format!(
            "Membership operators need an array value, got '{}'",
            stringify(other)
        ))),
    }
}

fn scaled(cell: &CellValue, value: &CellValue, multiplier: u32, comparison: ScaledComparison) -> bool {
    let (Some(cell), Some(value)) = (cell.as_f64(), value.as_f64()) else {
        return false;
    };
    let target = value * f64::from(multiplier);
    match comparison {
        ScaledComparison::Equal => cell == target,
        ScaledComparison::AtLeast => cell >= target,
        ScaledComparison::AtMost => cell <= target,
    }
}
