//! Query executor for sheetdb
//!
//! Turns a [`Query`](crate::planner::Query) into a [`Table`] and backs the
//! terminal accessors of a select.
//!
//! # Execution flow (strict order)
//!
//! 1. Fetch the primary table
//! 2. Fold in each join (nested-loop, inner)
//! 3. Filter rows by the OR-of-AND groups
//! 4. Stable multi-key sort
//! 5. Project requested fields
//!
//! Reads take no lock and may observe a table mid-mutation.

pub mod compare;
mod executor;
mod filters;
mod join;
mod result;
mod sorter;

pub use compare::{compare_values, evaluate, normalize, values_equal};
pub use executor::{project, QueryExecutor, DELETED_AT};
pub use filters::PredicateFilter;
pub use join::join;
pub use result::{Page, ResultTable, Table};
pub use sorter::ResultSorter;

pub(crate) use executor::pad_row;
