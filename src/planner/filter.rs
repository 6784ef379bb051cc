//! Filter groups and field-name resolution
//!
//! A query holds AND-groups combined with OR. Each group holds conditions:
//! a plain filter or an [`OrClause`] whose inner filters are combined with OR.
//! Before evaluation every field name is resolved against the working table's
//! (prefixed) field list, producing the `Resolved*` forms the executor runs.

use super::ast::{Filter, Operator};
use crate::codec::CellValue;
use crate::errors::{DbError, DbResult};

/// Resolves `name` to a field index.
///
/// A field matches when it equals `name` or ends with `.name`. More than one
/// match is always an error; zero matches is an error under `strict` and
/// `None` otherwise.
pub fn resolve_field_name(name: &str, fields: &[String], strict: bool) -> DbResult<Option<usize>> {
    let suffix = format!(".{}", name);
    let matches: Vec<usize> = fields
        .iter()
        .enumerate()
        .filter(|(_, field)| *field == name || field.ends_with(&suffix))
        .map(|(index, _)| index)
        .collect();

    match matches.as_slice() {
        [index] => Ok(Some(*index)),
        [] if !strict => Ok(None),
        _ => Err(DbError::ambiguous_or_missing_field(name, matches.len())),
    }
}

/// Strict resolution: exactly one field must match
pub fn resolve_field(name: &str, fields: &[String]) -> DbResult<usize> {
    resolve_field_name(name, fields, true)?
        .ok_or_else(|| DbError::ambiguous_or_missing_field(name, 0))
}

/// Inner filters combined with OR; an empty clause is true
#[derive(Debug, Clone, Default)]
pub struct OrClause {
    filters: Vec<Filter>,
}

impl OrClause {
    pub fn new(filters: Vec<Filter>) -> Self {
        Self { filters }
    }

    pub fn or(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn filters(&self) -> &[Filter] {
        &self.filters
    }

    /// Resolves every inner filter against `fields`
    pub fn validate(&self, fields: &[String], strict: bool) -> DbResult<Vec<ResolvedFilter>> {
        self.filters
            .iter()
            .map(|filter| validate_filter(filter, fields, strict))
            .collect()
    }
}

/// One condition inside an AND-group
#[derive(Debug, Clone)]
pub enum Condition {
    Compare(Filter),
    Any(OrClause),
}

/// Conditions combined with AND
#[derive(Debug, Clone, Default)]
pub struct FilterGroup {
    conditions: Vec<Condition>,
}

impl FilterGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(self, filter: Filter) -> Self {
        self.with(Condition::Compare(filter))
    }

    pub fn and_any(self, clause: OrClause) -> Self {
        self.with(Condition::Any(clause))
    }

    pub fn with(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// Filter bound to a field index. `index` is `None` when lenient resolution
/// found no field; such a filter never matches.
#[derive(Debug, Clone)]
pub struct ResolvedFilter {
    pub index: Option<usize>,
    pub operator: Operator,
    pub value: CellValue,
}

#[derive(Debug, Clone)]
pub enum ResolvedCondition {
    Compare(ResolvedFilter),
    Any(Vec<ResolvedFilter>),
}

#[derive(Debug, Clone, Default)]
pub struct ResolvedGroup {
    pub conditions: Vec<ResolvedCondition>,
}

/// Resolves every field name and checks operator/value shape
pub fn validate_filter_group(
    group: &FilterGroup,
    fields: &[String],
    strict: bool,
) -> DbResult<ResolvedGroup> {
    let conditions = group
        .conditions()
        .iter()
        .map(|condition| match condition {
            Condition::Compare(filter) => {
                validate_filter(filter, fields, strict).map(ResolvedCondition::Compare)
            }
            Condition::Any(clause) => clause.validate(fields, strict).map(ResolvedCondition::Any),
        })
        .collect::<DbResult<Vec<_>>>()?;
    Ok(ResolvedGroup { conditions })
}

/// Validates all groups of a query
pub fn validate_filter_groups(
    groups: &[FilterGroup],
    fields: &[String],
    strict: bool,
) -> DbResult<Vec<ResolvedGroup>> {
    groups
        .iter()
        .map(|group| validate_filter_group(group, fields, strict))
        .collect()
}

fn validate_filter(filter: &Filter, fields: &[String], strict: bool) -> DbResult<ResolvedFilter> {
    if filter.operator.is_membership() && !is_array(&filter.value) {
        return Err(DbError::missing_or_wrong_params(format!(
            "Operator '{}' on '{}' needs an array value",
            filter.operator, filter.field
        )));
    }
    let index = resolve_field_name(&filter.field, fields, strict)?;
    Ok(ResolvedFilter {
        index,
        operator: filter.operator.clone(),
        value: filter.value.clone(),
    })
}

fn is_array(value: &CellValue) -> bool {
    matches!(value, CellValue::Json(serde_json::Value::Array(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorCode;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolve_by_suffix_and_exact() {
        let f = fields(&["users.id", "users.name", "orders.total"]);
        assert_eq!(resolve_field_name("name", &f, true).unwrap(), Some(1));
        assert_eq!(resolve_field_name("orders.total", &f, true).unwrap(), Some(2));
    }

    #[test]
    fn test_resolve_ambiguous_is_error_even_when_lenient() {
        let f = fields(&["users.id", "orders.id"]);
        let err = resolve_field_name("id", &f, false).unwrap_err();
        assert_eq!(err.code(), ErrorCode::AmbiguousOrMissingField);
        assert_eq!(resolve_field_name("users.id", &f, true).unwrap(), Some(0));
    }

    #[test]
    fn test_resolve_missing_strict_vs_lenient() {
        let f = fields(&["users.id"]);
        assert!(resolve_field_name("email", &f, true).is_err());
        assert_eq!(resolve_field_name("email", &f, false).unwrap(), None);
    }

    #[test]
    fn test_suffix_needs_dot_boundary() {
        let f = fields(&["users.nickname"]);
        assert!(resolve_field("name", &f).is_err());
    }

    #[test]
    fn test_validate_group_with_or_clause() {
        let f = fields(&["users.name", "users.age"]);
        let group = FilterGroup::new()
            .and(Filter::eq("name", "Ann"))
            .and_any(OrClause::default().or(Filter::gt("age", 3)).or(Filter::lt("age", 1)));
        let resolved = validate_filter_group(&group, &f, true).unwrap();
        assert_eq!(resolved.conditions.len(), 2);
        match &resolved.conditions[1] {
            ResolvedCondition::Any(inner) => {
                assert_eq!(inner.len(), 2);
                assert_eq!(inner[0].index, Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_or_clause_bad_field_fails_group() {
        let f = fields(&["users.name"]);
        let group = FilterGroup::new().and_any(OrClause::new(vec![Filter::eq("ghost", 1)]));
        assert!(validate_filter_group(&group, &f, true).is_err());
    }

    #[test]
    fn test_membership_requires_array() {
        let f = fields(&["users.age"]);
        let bad = FilterGroup::new().and(Filter::new("age", Operator::In, 3));
        let err = validate_filter_group(&bad, &f, true).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);

        let good = FilterGroup::new().and(Filter::in_list("age", vec![3.into(), 4.into()]));
        assert!(validate_filter_group(&good, &f, true).is_ok());
    }
}
