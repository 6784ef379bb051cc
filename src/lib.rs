//! sheetdb - A relational query and mutation engine over sheet-like tables
//!
//! A table is a header row of field names followed by data rows of text
//! cells. Reads filter, join, sort and project; writes run under a single
//! writer lock and keep `id`, timestamps and a content hash up to date.

pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
pub mod errors;
pub mod executor;
pub mod mutation;
pub mod observability;
pub mod planner;
pub mod storage;

pub use codec::CellValue;
pub use config::EngineConfig;
pub use engine::{Engine, TableQuery};
pub use errors::{DbError, DbResult, ErrorCode};
pub use executor::{Page, ResultTable, Table};
pub use mutation::{DeleteMode, IdStrategy};
pub use planner::{
    Filter, FilterGroup, JoinCriterion, Operator, OrClause, Projection, Query, SortDirection,
    SortSpec,
};
