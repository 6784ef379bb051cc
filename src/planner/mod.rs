//! Query specification for sheetdb
//!
//! Builds the immutable description of a read or write: source table, joins,
//! filter groups, order and insert defaults. Nothing here touches a store.
//!
//! # Filter semantics
//!
//! - A query holds AND-groups; a row matches when ANY group matches
//! - A group matches when ALL its conditions hold
//! - An `OrClause` condition holds when ANY inner filter holds
//! - No groups at all: every row matches

mod ast;
mod filter;

pub use ast::{
    Filter, JoinCriterion, JoinSpec, Operator, PredicateFn, Projection, Query, ScaledComparison,
    SortDirection, SortSpec, TableRef,
};
pub use filter::{
    resolve_field, resolve_field_name, validate_filter_group, validate_filter_groups, Condition,
    FilterGroup, OrClause, ResolvedCondition, ResolvedFilter, ResolvedGroup,
};
