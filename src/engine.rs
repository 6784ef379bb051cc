//! Engine entry point
//!
//! `Engine` owns the collaborators (store, writer lock, hasher, clock, id
//! source, logger) and runs `Query` values. `TableQuery` wraps one query for
//! chained use and resets it after every successful operation.

use std::sync::Arc;

use regex::Regex;
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::codec::CellValue;
use crate::config::EngineConfig;
use crate::errors::{DbError, DbResult, ErrorCode};
use crate::executor::{QueryExecutor, ResultTable};
use crate::mutation::{
    DeleteMode, IdStrategy, MutationController, ProcessLock, UniqueIdSource, UuidSource,
    WriterLock,
};
use crate::observability::{log_event, Event, Logger};
use crate::planner::{
    Condition, Filter, FilterGroup, Operator, OrClause, Projection, Query, SortDirection, SortSpec,
};
use crate::storage::{RowDigest, RowHasher, RowStore, SheetRef};

/// Query and mutation engine over a row store
pub struct Engine {
    store: Arc<dyn RowStore>,
    lock: Arc<dyn WriterLock>,
    hasher: RowHasher,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn UniqueIdSource>,
    logger: Option<Arc<dyn Logger>>,
    config: EngineConfig,
}

impl Engine {
    /// Engine with the default config, an in-process lock, the system clock
    /// and UUID v4 ids. No logger.
    pub fn new(store: Arc<dyn RowStore>) -> Self {
        let config = EngineConfig::default();
        Self {
            store,
            lock: Arc::new(ProcessLock::new()),
            hasher: RowHasher::with_algorithm(config.hash_algorithm),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UuidSource),
            logger: None,
            config,
        }
    }

    /// Replaces the config; the hasher follows its algorithm
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.hasher = RowHasher::with_algorithm(config.hash_algorithm);
        self.config = config;
        self
    }

    /// Share a lock between engines (or processes, with `FileLock`)
    pub fn with_lock(mut self, lock: Arc<dyn WriterLock>) -> Self {
        self.lock = lock;
        self
    }

    pub fn with_digest(mut self, digest: Arc<dyn RowDigest>) -> Self {
        self.hasher = RowHasher::new(digest);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_id_source(mut self, ids: Arc<dyn UniqueIdSource>) -> Self {
        self.ids = ids;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn hasher(&self) -> &RowHasher {
        &self.hasher
    }

    /// New query on a sheet, carrying the configured id strategy and field
    /// strictness
    pub fn query(&self, store_id: impl Into<String>, sheet: impl Into<SheetRef>) -> Query {
        let mut query = Query::new(store_id, sheet).with_id_strategy(self.config.id_strategy);
        if !self.config.strict_fields {
            query = query.lenient_fields();
        }
        query
    }

    /// Chained builder over a sheet
    pub fn table(&self, store_id: impl Into<String>, sheet: impl Into<SheetRef>) -> TableQuery<'_> {
        TableQuery::new(self, self.query(store_id, sheet))
    }

    pub fn select(&self, query: &Query, projection: &Projection) -> DbResult<ResultTable> {
        let result = QueryExecutor::new(self.store.as_ref())
            .execute(query, projection)
            .map(ResultTable::new);
        self.report("select", query, result, |table| {
            (Event::SelectComplete, table.count())
        })
    }

    /// Inserts one object or an array of objects; returns the last id
    pub fn insert(&self, query: &Query, data: &Value) -> DbResult<CellValue> {
        let result = insert_objects(data).and_then(|objects| {
            self.controller()
                .insert(query, &objects)
                .map(|id| (id, objects.len()))
        });
        self.report("insert", query, result, |(_, rows)| (Event::InsertComplete, *rows))
            .map(|(id, _)| id)
    }

    pub fn update(&self, query: &Query, changes: &Value) -> DbResult<usize> {
        let result = match changes {
            Value::Object(changes) => self.controller().update(query, changes),
            _ => Err(DbError::missing_or_wrong_params(
                "Update data must be an object",
            )),
        };
        self.report("update", query, result, |rows| match rows {
            0 => (Event::UpdateNoMatch, 0),
            n => (Event::UpdateComplete, *n),
        })
    }

    pub fn delete(&self, query: &Query, mode: DeleteMode) -> DbResult<usize> {
        let result = self.controller().delete(query, mode);
        self.report("delete", query, result, |rows| (Event::DeleteComplete, *rows))
    }

    pub fn restore(&self, query: &Query) -> DbResult<usize> {
        let result = self.controller().restore(query);
        self.report("restore", query, result, |rows| (Event::RestoreComplete, *rows))
    }

    fn controller(&self) -> MutationController<'_> {
        MutationController::new(
            self.store.as_ref(),
            self.lock.as_ref(),
            self.config.lock_timeout(),
            &self.hasher,
            self.clock.as_ref(),
            self.ids.as_ref(),
        )
    }

    /// Logs the outcome of one operation and passes the result through
    fn report<T, F>(
        &self,
        operation: &str,
        query: &Query,
        result: DbResult<T>,
        success: F,
    ) -> DbResult<T>
    where
        F: FnOnce(&T) -> (Event, usize),
    {
        let table = format!("{}/{}", query.source.store_id, query.source.sheet);
        match &result {
            Ok(value) => {
                let (event, rows) = success(value);
                log_event(
                    self.logger.as_deref(),
                    event,
                    &[("table", table.as_str()), ("rows", rows.to_string().as_str())],
                );
            }
            Err(err) => {
                let event = match err.code() {
                    ErrorCode::Timeout => Event::LockTimeout,
                    _ => Event::OperationFailed,
                };
                log_event(
                    self.logger.as_deref(),
                    event,
                    &[
                        ("table", table.as_str()),
                        ("operation", operation),
                        ("code", err.code().code()),
                        ("message", err.message()),
                    ],
                );
            }
        }
        result
    }
}

fn insert_objects(data: &Value) -> DbResult<Vec<Map<String, Value>>> {
    let invalid =
        || DbError::missing_or_wrong_params("Insert data must be an object or an array of objects");
    match data {
        Value::Object(object) => Ok(vec![object.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_object().cloned().ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}

/// Stateful query over one sheet.
///
/// Filters, order, defaults and the trash flag are cleared after every
/// successful operation. Joins, alias and id strategy persist.
pub struct TableQuery<'e> {
    engine: &'e Engine,
    query: Query,
    result: Option<ResultTable>,
}

impl<'e> TableQuery<'e> {
    pub fn new(engine: &'e Engine, query: Query) -> Self {
        Self {
            engine,
            query,
            result: None,
        }
    }

    /// Current query specification
    pub fn query(&self) -> &Query {
        &self.query
    }

    /// Result of the latest select
    pub fn result(&self) -> Option<&ResultTable> {
        self.result.as_ref()
    }

    pub fn alias(&mut self, alias: impl Into<String>) -> &mut Self {
        self.query.source.alias = Some(alias.into());
        self
    }

    /// ANDs `field <operator> value` into the current group
    pub fn filter(
        &mut self,
        field: impl Into<String>,
        operator: &str,
        value: impl Into<CellValue>,
    ) -> DbResult<&mut Self> {
        let operator = Operator::parse(operator)?;
        self.query.push_filter(Filter::new(field, operator, value));
        Ok(self)
    }

    pub fn where_eq(&mut self, field: impl Into<String>, value: impl Into<CellValue>) -> &mut Self {
        self.query.push_filter(Filter::eq(field, value));
        self
    }

    pub fn where_matches(&mut self, field: impl Into<String>, pattern: Regex) -> &mut Self {
        self.query.push_filter(Filter::matches_pattern(field, pattern));
        self
    }

    pub fn with_filter(&mut self, filter: Filter) -> &mut Self {
        self.query.push_filter(filter);
        self
    }

    /// Starts a new OR'd group holding `filter`
    pub fn or_filter(&mut self, filter: Filter) -> &mut Self {
        self.query.push_group(FilterGroup::new().and(filter));
        self
    }

    /// ANDs an OR clause into the current group
    pub fn or_clause(&mut self, clause: OrClause) -> &mut Self {
        self.query.push_condition(Condition::Any(clause));
        self
    }

    pub fn order_by(&mut self, field: impl Into<String>, direction: SortDirection) -> &mut Self {
        self.query.sort.push(SortSpec {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn join<'c, C>(
        &mut self,
        store_id: impl Into<String>,
        sheet: impl Into<SheetRef>,
        criteria: &[C],
        alias: Option<&str>,
    ) -> DbResult<&mut Self>
    where
        C: AsRef<[&'c str]>,
    {
        let joined = self.query.clone().join(store_id, sheet, criteria, alias)?;
        self.query = joined;
        Ok(self)
    }

    pub fn defaults<I, K, V>(&mut self, defaults: I) -> &mut Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<CellValue>,
    {
        for (field, value) in defaults {
            self.query.defaults.insert(field.into(), value.into());
        }
        self
    }

    pub fn with_trashed(&mut self) -> &mut Self {
        self.query.with_trashed = true;
        self
    }

    pub fn id_strategy(&mut self, strategy: IdStrategy) -> &mut Self {
        self.query.id_strategy = strategy;
        self
    }

    /// Runs the select and keeps its result for the terminal accessors
    pub fn select(&mut self, projection: impl Into<Projection>) -> DbResult<&mut ResultTable> {
        let result = self.engine.select(&self.query, &projection.into())?;
        self.query.reset_modifiers();
        Ok(self.result.insert(result))
    }

    /// Number of visible rows matching the current filters
    pub fn count(&mut self) -> DbResult<usize> {
        Ok(self.select(Projection::All)?.count())
    }

    pub fn insert(&mut self, data: &Value) -> DbResult<CellValue> {
        let id = self.engine.insert(&self.query, data)?;
        self.query.reset_modifiers();
        Ok(id)
    }

    pub fn update(&mut self, changes: &Value) -> DbResult<usize> {
        let rows = self.engine.update(&self.query, changes)?;
        self.query.reset_modifiers();
        Ok(rows)
    }

    pub fn delete(&mut self, mode: DeleteMode) -> DbResult<usize> {
        let rows = self.engine.delete(&self.query, mode)?;
        self.query.reset_modifiers();
        Ok(rows)
    }

    pub fn restore(&mut self) -> DbResult<usize> {
        let rows = self.engine.restore(&self.query)?;
        self.query.reset_modifiers();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemoryLogger;
    use crate::storage::{MemoryStore, Sheet, Workbook};
    use serde_json::json;

    fn engine() -> (Engine, MemoryLogger) {
        let store = MemoryStore::new().with_workbook(
            "book",
            Workbook::new().with_sheet(Sheet::new(
                "users",
                &["id", "name", "age", "created_at", "updated_at", "deleted_at"],
            )),
        );
        let logger = MemoryLogger::new();
        let engine = Engine::new(Arc::new(store)).with_logger(Arc::new(logger.clone()));
        (engine, logger)
    }

    #[test]
    fn test_reset_after_success_keeps_strategy() {
        let (engine, _) = engine();
        let mut users = engine.table("book", "users");
        users
            .id_strategy(IdStrategy::TimestampMillis)
            .where_eq("name", "Ann")
            .with_trashed();
        users.select(Projection::All).unwrap();
        assert!(!users.query().has_filters());
        assert!(!users.query().with_trashed);
        assert_eq!(users.query().id_strategy, IdStrategy::TimestampMillis);
    }

    #[test]
    fn test_failed_filter_keeps_query() {
        let (engine, _) = engine();
        let mut users = engine.table("book", "users");
        users.where_eq("name", "Ann");
        assert!(users.filter("age", "~", 3).is_err());
        assert!(users.query().has_filters());
    }

    #[test]
    fn test_operations_are_logged() {
        let (engine, logger) = engine();
        let mut users = engine.table("book", "users");
        users.insert(&json!([{"name": "Ann"}, {"name": "Bo"}])).unwrap();
        users.where_eq("name", "Nobody");
        assert_eq!(users.update(&json!({"age": 1})).unwrap(), 0);
        users.where_eq("name", "Ann").select("name").unwrap();

        let insert = &logger.events("INSERT_COMPLETE")[0];
        assert_eq!(insert.field("rows"), Some("2"));
        assert_eq!(insert.field("table"), Some("book/users"));
        assert_eq!(logger.events("UPDATE_NO_MATCH").len(), 1);
        assert_eq!(logger.events("SELECT_COMPLETE")[0].field("rows"), Some("1"));
    }

    #[test]
    fn test_failures_are_logged_and_returned() {
        let (engine, logger) = engine();
        let err = engine
            .update(&engine.query("book", "users"), &json!([1, 2]))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);
        let record = &logger.events("OPERATION_FAILED")[0];
        assert_eq!(record.field("operation"), Some("update"));
        assert_eq!(record.field("code"), Some("MISSING_OR_WRONG_PARAMS"));
    }

    #[test]
    fn test_insert_rejects_non_objects() {
        let (engine, _) = engine();
        let query = engine.query("book", "users");
        assert!(engine.insert(&query, &json!("Ann")).is_err());
        assert!(engine.insert(&query, &json!([{"name": "Ann"}, 3])).is_err());
    }
}
