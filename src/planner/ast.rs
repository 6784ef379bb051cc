//! Query specification structures
//!
//! A [`Query`] is a plain value: building it never touches a store. The
//! engine reads it when a select or mutation runs.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use regex::Regex;

use super::filter::{Condition, FilterGroup, OrClause};
use crate::codec::CellValue;
use crate::errors::{DbError, DbResult};
use crate::mutation::IdStrategy;
use crate::storage::SheetRef;

/// Caller-supplied predicate, invoked with `(cell, filter_value)`
pub type PredicateFn = Arc<dyn Fn(&CellValue, &CellValue) -> bool + Send + Sync>;

/// Comparison applied by a scaled operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaledComparison {
    /// `cell == n * value`
    Equal,
    /// `cell >= n * value`
    AtLeast,
    /// `cell <= n * value`
    AtMost,
}

/// Comparison operator
#[derive(Clone)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    NotIn,
    /// Regular expression tested against the stringified cell
    Pattern(Regex),
    Predicate(PredicateFn),
    /// `*N=`, `*N>=`, `*N<=` family
    Scaled {
        multiplier: u32,
        comparison: ScaledComparison,
    },
}

impl Operator {
    /// Parses operator text. Unknown text fails with `InvalidOperator`.
    pub fn parse(text: &str) -> DbResult<Self> {
        let trimmed = text.trim();
        let op = match trimmed {
            "=" | "==" => Operator::Eq,
            "!=" | "<>" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Gte,
            "<=" => Operator::Lte,
            _ if trimmed.eq_ignore_ascii_case("in") => Operator::In,
            _ if is_not_in(trimmed) => Operator::NotIn,
            _ => parse_scaled(trimmed).ok_or_else(|| DbError::invalid_operator(text))?,
        };
        Ok(op)
    }

    /// Textual form used in log fields and messages
    pub fn symbol(&self) -> String {
        match self {
            Operator::Eq => "=".to_string(),
            Operator::Ne => "!=".to_string(),
            Operator::Gt => ">".to_string(),
            Operator::Lt => "<".to_string(),
            Operator::Gte => ">=".to_string(),
            Operator::Lte => "<=".to_string(),
            Operator::In => "in".to_string(),
            Operator::NotIn => "not in".to_string(),
            Operator::Pattern(re) => format!("/{}/", re.as_str()),
            Operator::Predicate(_) => "<predicate>".to_string(),
            Operator::Scaled {
                multiplier,
                comparison,
            } => {
                let suffix = match comparison {
                    ScaledComparison::Equal => "=",
                    ScaledComparison::AtLeast => ">=",
                    ScaledComparison::AtMost => "<=",
                };
                format!("*{}{}", multiplier, suffix)
            }
        }
    }

    /// True for operators whose filter value must be an array
    pub fn is_membership(&self) -> bool {
        matches!(self, Operator::In | Operator::NotIn)
    }
}

fn is_not_in(text: &str) -> bool {
    let mut words = text.split_whitespace();
    matches!(
        (words.next(), words.next(), words.next()),
        (Some(not), Some(inn), None)
            if not.eq_ignore_ascii_case("not") && inn.eq_ignore_ascii_case("in")
    )
}

fn parse_scaled(text: &str) -> Option<Operator> {
    let rest = text.strip_prefix('*')?;
    let digits_end = rest.find(|c: char| !c.is_ascii_digit())?;
    if digits_end == 0 {
        return None;
    }
    let multiplier = rest[..digits_end].parse::<u32>().ok()?;
    let comparison = match &rest[digits_end..] {
        "=" => ScaledComparison::Equal,
        ">" | ">=" => ScaledComparison::AtLeast,
        "<" | "<=" => ScaledComparison::AtMost,
        _ => return None,
    };
    Some(Operator::Scaled {
        multiplier,
        comparison,
    })
}

impl FromStr for Operator {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operator::parse(s)
    }
}

impl fmt::Debug for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Operator({})", self.symbol())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// A single `(field, operator, value)` filter
#[derive(Debug, Clone)]
pub struct Filter {
    pub field: String,
    pub operator: Operator,
    pub value: CellValue,
}

impl Filter {
    pub fn new(field: impl Into<String>, operator: Operator, value: impl Into<CellValue>) -> Self {
        Self {
            field: field.into(),
            operator,
            value: value.into(),
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Eq, value)
    }

    pub fn ne(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Ne, value)
    }

    pub fn gt(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Gt, value)
    }

    pub fn gte(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Gte, value)
    }

    pub fn lt(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Lt, value)
    }

    pub fn lte(field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        Self::new(field, Operator::Lte, value)
    }

    /// Membership filter over `values`
    pub fn in_list(field: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self::new(field, Operator::In, membership_value(values))
    }

    pub fn not_in(field: impl Into<String>, values: Vec<CellValue>) -> Self {
        Self::new(field, Operator::NotIn, membership_value(values))
    }

    pub fn matches_pattern(field: impl Into<String>, pattern: Regex) -> Self {
        Self::new(field, Operator::Pattern(pattern), CellValue::Null)
    }

    /// Filter decided by `predicate(cell, value)`
    pub fn satisfies<F>(field: impl Into<String>, value: impl Into<CellValue>, predicate: F) -> Self
    where
        F: Fn(&CellValue, &CellValue) -> bool + Send + Sync + 'static,
    {
        Self::new(field, Operator::Predicate(Arc::new(predicate)), value)
    }

    pub fn scaled(
        field: impl Into<String>,
        multiplier: u32,
        comparison: ScaledComparison,
        value: impl Into<CellValue>,
    ) -> Self {
        Self::new(
            field,
            Operator::Scaled {
                multiplier,
                comparison,
            },
            value,
        )
    }
}

fn membership_value(values: Vec<CellValue>) -> CellValue {
    CellValue::Json(serde_json::Value::Array(
        values.iter().map(CellValue::to_json).collect(),
    ))
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

impl FromStr for SortDirection {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("asc") {
            Ok(SortDirection::Asc)
        } else if s.eq_ignore_ascii_case("desc") {
            Ok(SortDirection::Desc)
        } else {
            Err(DbError::missing_or_wrong_params(format!(
                "Unknown sort direction: {}",
                s
            )))
        }
    }
}

/// Sort specification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    /// Field to sort by
    pub field: String,
    /// Sort direction
    pub direction: SortDirection,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Fields requested by a select
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Projection {
    /// Every field (`"*"`)
    #[default]
    All,
    /// Named fields, emitted in this order
    Fields(Vec<String>),
}

impl Projection {
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let fields: Vec<String> = fields.into_iter().map(Into::into).collect();
        if fields.is_empty() || fields.iter().any(|f| f == "*") {
            Projection::All
        } else {
            Projection::Fields(fields)
        }
    }
}

impl From<&str> for Projection {
    fn from(field: &str) -> Self {
        Projection::fields([field])
    }
}

/// Table address plus the prefix its fields get
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub store_id: String,
    pub sheet: SheetRef,
    /// Field prefix; the sheet name is used when absent
    pub alias: Option<String>,
}

impl TableRef {
    pub fn new(store_id: impl Into<String>, sheet: impl Into<SheetRef>) -> Self {
        Self {
            store_id: store_id.into(),
            sheet: sheet.into(),
            alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

/// One `(left, operator, right)` join criterion
#[derive(Debug, Clone)]
pub struct JoinCriterion {
    pub left: String,
    pub operator: Operator,
    pub right: String,
}

impl JoinCriterion {
    pub fn new(left: impl Into<String>, operator: Operator, right: impl Into<String>) -> Self {
        Self {
            left: left.into(),
            operator,
            right: right.into(),
        }
    }

    /// Equality criterion
    pub fn on(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::new(left, Operator::Eq, right)
    }

    /// Normalizes `[left, right]` or `[left, op, right]`
    pub fn from_parts(parts: &[&str]) -> DbResult<Self> {
        match parts {
            [left, right] => Ok(Self::on(*left, *right)),
            [left, op, right] => Ok(Self::new(*left, Operator::parse(op)?, *right)),
            _ => Err(DbError::missing_or_wrong_params(format!(
                "Join criteria need 2 or 3 elements, got {}",
                parts.len()
            ))),
        }
    }
}

/// Table to fold into the working table
#[derive(Debug, Clone)]
pub struct JoinSpec {
    pub table: TableRef,
    pub criteria: Vec<JoinCriterion>,
}

impl JoinSpec {
    pub fn new(table: TableRef, criteria: Vec<JoinCriterion>) -> DbResult<Self> {
        if criteria.is_empty() {
            return Err(DbError::missing_or_wrong_params(
                "A join needs at least one criterion",
            ));
        }
        Ok(Self { table, criteria })
    }
}

/// Query specification
#[derive(Debug, Clone)]
pub struct Query {
    /// Primary table
    pub source: TableRef,
    /// AND-groups, combined with OR
    pub groups: Vec<FilterGroup>,
    /// Sort keys, most significant first
    pub sort: Vec<SortSpec>,
    pub joins: Vec<JoinSpec>,
    /// Insert values for fields an input object leaves out
    pub defaults: BTreeMap<String, CellValue>,
    /// Include soft-deleted rows in reads
    pub with_trashed: bool,
    pub id_strategy: IdStrategy,
    /// Unknown filter fields are errors (true) or never match (false)
    pub strict_fields: bool,
}

impl Query {
    pub fn new(store_id: impl Into<String>, sheet: impl Into<SheetRef>) -> Self {
        Self::from_table(TableRef::new(store_id, sheet))
    }

    pub fn from_table(source: TableRef) -> Self {
        Self {
            source,
            groups: Vec::new(),
            sort: Vec::new(),
            joins: Vec::new(),
            defaults: BTreeMap::new(),
            with_trashed: false,
            id_strategy: IdStrategy::default(),
            strict_fields: true,
        }
    }

    /// Prefix the primary table's fields with `alias` instead of the sheet name
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.source.alias = Some(alias.into());
        self
    }

    /// ANDs a filter into the current group
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.push_filter(filter);
        self
    }

    /// Starts a new OR'd group holding `filter`
    pub fn or_filter(mut self, filter: Filter) -> Self {
        self.push_group(FilterGroup::new().and(filter));
        self
    }

    /// Adds a whole AND-group as a new OR alternative
    pub fn with_group(mut self, group: FilterGroup) -> Self {
        self.push_group(group);
        self
    }

    /// ANDs an OR clause into the current group
    pub fn with_or_clause(mut self, clause: OrClause) -> Self {
        self.push_condition(Condition::Any(clause));
        self
    }

    /// Adds a filter from operator text
    pub fn filter(
        self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<CellValue>,
    ) -> DbResult<Self> {
        let operator = Operator::parse(operator)?;
        Ok(self.with_filter(Filter::new(field, operator, value)))
    }

    /// Short form for `field = value`
    pub fn where_eq(self, field: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.with_filter(Filter::eq(field, value))
    }

    /// Short form for a pattern filter
    pub fn where_matches(self, field: impl Into<String>, pattern: Regex) -> Self {
        self.with_filter(Filter::matches_pattern(field, pattern))
    }

    pub fn with_order(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn order_by(mut self, spec: SortSpec) -> Self {
        self.sort.push(spec);
        self
    }

    pub fn with_join(mut self, join: JoinSpec) -> Self {
        self.joins.push(join);
        self
    }

    /// Adds a join from raw criteria (`[left, right]` or `[left, op, right]`)
    pub fn join<'c, C>(
        self,
        store_id: impl Into<String>,
        sheet: impl Into<SheetRef>,
        criteria: &[C],
        alias: Option<&str>,
    ) -> DbResult<Self>
    where
        C: AsRef<[&'c str]>,
    {
        let mut table = TableRef::new(store_id, sheet);
        if let Some(alias) = alias {
            table = table.with_alias(alias);
        }
        let criteria = criteria
            .iter()
            .map(|parts| JoinCriterion::from_parts(parts.as_ref()))
            .collect::<DbResult<Vec<_>>>()?;
        Ok(self.with_join(JoinSpec::new(table, criteria)?))
    }

    pub fn with_defaults<I, K, V>(mut self, defaults: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        for (field, value) in defaults {
            self.defaults.insert(field.into(), value.into());
        }
        self
    }

    pub fn with_trashed(mut self) -> Self {
        self.with_trashed = true;
        self
    }

    pub fn with_id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    /// Unknown filter fields simply never match
    pub fn lenient_fields(mut self) -> Self {
        self.strict_fields = false;
        self
    }

    pub fn push_filter(&mut self, filter: Filter) {
        self.push_condition(Condition::Compare(filter));
    }

    pub fn push_condition(&mut self, condition: Condition) {
        match self.groups.last_mut() {
            Some(group) => group.push(condition),
            None => self.groups.push(FilterGroup::new().with(condition)),
        }
    }

    pub fn push_group(&mut self, group: FilterGroup) {
        self.groups.push(group);
    }

    pub fn has_filters(&self) -> bool {
        self.groups.iter().any(|g| !g.is_empty())
    }

    /// Clears filters, order, defaults and the trash flag. Joins, alias and
    /// id strategy stay.
    pub fn reset_modifiers(&mut self) {
        self.groups.clear();
        self.sort.clear();
        self.defaults.clear();
        self.with_trashed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_operators() {
        assert!(matches!(Operator::parse("=").unwrap(), Operator::Eq));
        assert!(matches!(Operator::parse("!=").unwrap(), Operator::Ne));
        assert!(matches!(Operator::parse(">=").unwrap(), Operator::Gte));
        assert!(matches!(Operator::parse("IN").unwrap(), Operator::In));
        assert!(matches!(Operator::parse("not  in").unwrap(), Operator::NotIn));
    }

    #[test]
    fn test_parse_scaled_operators() {
        match Operator::parse("*3>=").unwrap() {
            Operator::Scaled {
                multiplier,
                comparison,
            } => {
                assert_eq!(multiplier, 3);
                assert_eq!(comparison, ScaledComparison::AtLeast);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            Operator::parse("*2<").unwrap(),
            Operator::Scaled {
                comparison: ScaledComparison::AtMost,
                ..
            }
        ));
        assert_eq!(Operator::parse("*10=").unwrap().symbol(), "*10=");
    }

    #[test]
    fn test_parse_unknown_operator() {
        for text in ["~", "*=", "*x>", "*2!", "like", ""] {
            let err = Operator::parse(text).unwrap_err();
            assert_eq!(err.code().code(), "INVALID_OPERATOR", "{}", text);
        }
    }

    #[test]
    fn test_join_criterion_normalization() {
        let two = JoinCriterion::from_parts(&["user_id", "id"]).unwrap();
        assert!(matches!(two.operator, Operator::Eq));
        let three = JoinCriterion::from_parts(&["total", ">", "limit"]).unwrap();
        assert!(matches!(three.operator, Operator::Gt));
        assert!(JoinCriterion::from_parts(&["only"]).is_err());
        assert!(JoinCriterion::from_parts(&["a", "=", "b", "c"]).is_err());
    }

    #[test]
    fn test_filters_accumulate_into_groups() {
        let query = Query::new("book", "users")
            .where_eq("name", "Ann")
            .with_filter(Filter::gt("age", 20))
            .or_filter(Filter::eq("name", "Bo"));
        assert_eq!(query.groups.len(), 2);
        assert_eq!(query.groups[0].len(), 2);
        assert_eq!(query.groups[1].len(), 1);
        assert!(query.has_filters());
    }

    #[test]
    fn test_reset_keeps_joins_and_alias() {
        let mut query = Query::new("book", "users")
            .with_alias("u")
            .where_eq("id", 1)
            .with_order("name", SortDirection::Desc)
            .with_defaults([("age", 18)])
            .with_trashed()
            .join("book", "orders", &[["id", "user_id"]], None)
            .unwrap();
        query.reset_modifiers();
        assert!(!query.has_filters());
        assert!(query.sort.is_empty());
        assert!(query.defaults.is_empty());
        assert!(!query.with_trashed);
        assert_eq!(query.joins.len(), 1);
        assert_eq!(query.source.alias.as_deref(), Some("u"));
    }

    #[test]
    fn test_projection_star_means_all() {
        assert_eq!(Projection::fields(["*"]), Projection::All);
        assert_eq!(Projection::from("name"), Projection::Fields(vec!["name".into()]));
    }
}
