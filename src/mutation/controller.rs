//! Write path: insert, update, delete, restore
//!
//! Every operation validates its input before taking the writer lock, then
//! runs the whole batch under one lock hold. Failures inside the lock are
//! re-raised as `InternalError`; the guard releases the lock on every path.
//! A batch is not rolled back: rows written before a failure stay written.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::{Map, Value};

use super::id::{IdGenerator, UniqueIdSource};
use super::lock::{LockGuard, WriterLock};
use crate::clock::Clock;
use crate::codec::{parse, stringify, CellValue};
use crate::errors::{DbError, DbResult};
use crate::executor::{pad_row, PredicateFilter, DELETED_AT};
use crate::planner::{validate_filter_groups, Condition, Filter, FilterGroup, Query, ResolvedGroup};
use crate::storage::hash::unqualified;
use crate::storage::{RowHasher, RowPosition, RowStore, TableHandle};

pub const ID: &str = "id";
pub const HASH: &str = "hash";
pub const CREATED_AT: &str = "created_at";
pub const UPDATED_AT: &str = "updated_at";

/// How `delete` removes rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeleteMode {
    /// Stamp `deleted_at`
    #[default]
    Soft,
    /// Physically remove the rows
    Hard,
}

/// Opened table plus everything resolved before locking
struct TargetTable {
    handle: TableHandle,
    header: Vec<String>,
    /// `prefix.field` names used to resolve filters
    fields: Vec<String>,
}

impl TargetTable {
    fn column(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|field| field == name)
    }
}

/// Runs mutations against a row store
pub struct MutationController<'a> {
    store: &'a dyn RowStore,
    lock: &'a dyn WriterLock,
    lock_timeout: Duration,
    hasher: &'a RowHasher,
    clock: &'a dyn Clock,
    ids: &'a dyn UniqueIdSource,
}

impl<'a> MutationController<'a> {
    pub fn new(
        store: &'a dyn RowStore,
        lock: &'a dyn WriterLock,
        lock_timeout: Duration,
        hasher: &'a RowHasher,
        clock: &'a dyn Clock,
        ids: &'a dyn UniqueIdSource,
    ) -> Self {
        Self {
            store,
            lock,
            lock_timeout,
            hasher,
            clock,
            ids,
        }
    }

    /// Appends one row per object and returns the last generated id.
    ///
    /// Keys that match no column are dropped; `id` and the timestamps are
    /// always generated. Query defaults fill absent or null keys.
    pub fn insert(&self, query: &Query, objects: &[Map<String, Value>]) -> DbResult<CellValue> {
        if objects.is_empty() {
            return Err(DbError::missing_or_wrong_params("Nothing to insert"));
        }

        let target = self.open(query)?;
        let id_column = target
            .column(ID)
            .ok_or_else(|| DbError::unexpected_table_structure(ID))?;
        let defaults = column_values(&target.header, &query.defaults);

        self.locked(|| {
            let now = CellValue::Date(self.clock.now());
            let mut generator = IdGenerator::new(query.id_strategy, self.clock, self.ids);
            let mut last_id = CellValue::Null;

            for object in objects {
                let values = column_values(&target.header, &from_object(object));
                let id = generator.next_id(|| self.read_last_id(&target, id_column))?;

                let mut cells: Vec<String> = target
                    .header
                    .iter()
                    .enumerate()
                    .map(|(index, field)| match field.as_str() {
                        ID => stringify(&id),
                        CREATED_AT | UPDATED_AT => stringify(&now),
                        HASH => String::new(),
                        _ => values
                            .get(&index)
                            .filter(|value| !value.is_null())
                            .or_else(|| defaults.get(&index))
                            .map(stringify)
                            .unwrap_or_default(),
                    })
                    .collect();

                if let Some(hash_column) = target.column(HASH) {
                    cells[hash_column] = self.hasher.hash(&target.header, &cells);
                }

                self.store.append_row(&target.handle, &cells)?;
                last_id = id;
            }
            Ok(last_id)
        })
    }

    /// Merges `changes` into every matching row; returns the rows written.
    ///
    /// An `id` key becomes an `id =` filter ANDed into every group and is not
    /// written, nor are the timestamps. Unknown keys are an error.
    pub fn update(&self, query: &Query, changes: &Map<String, Value>) -> DbResult<usize> {
        let mut groups = query.groups.clone();
        if let Some(id) = changes.get(ID).filter(|id| !id.is_null()) {
            and_into_groups(&mut groups, Filter::eq(ID, CellValue::from_json(id)));
        }
        require_filters(&groups, "update")?;

        let target = self.open(query)?;
        let mut assignments = Vec::new();
        for (key, value) in changes {
            let name = unqualified(key);
            if matches!(name, ID | CREATED_AT | UPDATED_AT) {
                continue;
            }
            let column = target
                .column(name)
                .ok_or_else(|| DbError::ambiguous_or_missing_field(key, 0))?;
            assignments.push((column, stringify(&CellValue::from_json(value))));
        }

        let resolved = validate_filter_groups(&groups, &target.fields, query.strict_fields)?;
        self.locked(|| self.rewrite(&target, &resolved, &assignments))
    }

    /// Deletes matching rows; soft mode stamps `deleted_at` instead.
    pub fn delete(&self, query: &Query, mode: DeleteMode) -> DbResult<usize> {
        require_filters(&query.groups, "delete")?;
        let target = self.open(query)?;
        let resolved = validate_filter_groups(&query.groups, &target.fields, query.strict_fields)?;

        match mode {
            DeleteMode::Soft => {
                let column = target
                    .column(DELETED_AT)
                    .ok_or_else(|| DbError::unexpected_table_structure(DELETED_AT))?;
                self.locked(|| {
                    let now = stringify(&CellValue::Date(self.clock.now()));
                    self.rewrite(&target, &resolved, &[(column, now)])
                })
            }
            DeleteMode::Hard => self.locked(|| {
                let rows = self.snapshot(&target)?;
                let positions = matching_indices(&rows, &resolved)?;
                // Last to first so earlier positions stay valid
                for index in positions.iter().rev() {
                    self.store
                        .delete_row(&target.handle, RowPosition::from_index(*index))?;
                }
                Ok(positions.len())
            }),
        }
    }

    /// Clears `deleted_at` on matching soft-deleted rows
    pub fn restore(&self, query: &Query) -> DbResult<usize> {
        require_filters(&query.groups, "restore")?;
        let target = self.open(query)?;
        let column = target
            .column(DELETED_AT)
            .ok_or_else(|| DbError::unexpected_table_structure(DELETED_AT))?;

        let mut groups = query.groups.clone();
        and_into_groups(&mut groups, Filter::ne(DELETED_AT, CellValue::Null));
        let resolved = validate_filter_groups(&groups, &target.fields, query.strict_fields)?;
        self.locked(|| self.rewrite(&target, &resolved, &[(column, String::new())]))
    }

    /// Applies `assignments` to every matching row (lock held by caller)
    fn rewrite(
        &self,
        target: &TargetTable,
        groups: &[ResolvedGroup],
        assignments: &[(usize, String)],
    ) -> DbResult<usize> {
        let rows = self.snapshot(target)?;
        let formulas = self.store.read_formula_rows(&target.handle)?;
        let matches = matching_indices(&rows, groups)?;
        if matches.is_empty() {
            return Ok(0);
        }

        let now = stringify(&CellValue::Date(self.clock.now()));
        let hash_column = target.column(HASH);
        let updated_at = target.column(UPDATED_AT);

        for index in &matches {
            let old = &rows[*index];
            let formula_row = formulas.get(*index);

            // Display values feed the hash; formula text is what gets written
            // back into cells the update leaves alone.
            let mut display = old.clone();
            let mut written: Vec<String> = old
                .iter()
                .enumerate()
                .map(|(column, value)| {
                    formula_row
                        .and_then(|row| row.get(column))
                        .filter(|formula| !formula.is_empty())
                        .cloned()
                        .unwrap_or_else(|| value.clone())
                })
                .collect();
            for (column, value) in assignments {
                display[*column] = value.clone();
                written[*column] = value.clone();
            }

            let stored_hash = match hash_column {
                Some(column) => old[column].clone(),
                None => self.hasher.hash(&target.header, old),
            };
            let new_hash = self.hasher.hash(&target.header, &display);
            if let Some(column) = hash_column {
                written[column] = new_hash.clone();
            }
            if new_hash != stored_hash {
                if let Some(column) = updated_at {
                    written[column] = now.clone();
                }
            }

            self.store
                .write_row_range(&target.handle, RowPosition::from_index(*index), &written)?;
        }
        Ok(matches.len())
    }

    fn open(&self, query: &Query) -> DbResult<TargetTable> {
        let handle = self
            .store
            .open_table(&query.source.store_id, &query.source.sheet)?;
        let header = self.store.read_header(&handle)?;
        let prefix = query
            .source
            .alias
            .clone()
            .unwrap_or_else(|| handle.sheet_name.clone());
        let fields = header
            .iter()
            .map(|field| format!("{}.{}", prefix, field))
            .collect();
        Ok(TargetTable {
            handle,
            header,
            fields,
        })
    }

    /// Every data row, soft-deleted ones included, padded to header width
    fn snapshot(&self, target: &TargetTable) -> DbResult<Vec<Vec<String>>> {
        Ok(self
            .store
            .read_all_rows(&target.handle, true)?
            .into_iter()
            .map(|row| pad_row(row, target.header.len()))
            .collect())
    }

    fn read_last_id(&self, target: &TargetTable, id_column: usize) -> DbResult<String> {
        let last = self.store.last_row_position(&target.handle)?;
        let Some(index) = last.to_index() else {
            return Ok(String::new());
        };
        let rows = self.store.read_all_rows(&target.handle, false)?;
        Ok(rows
            .get(index)
            .and_then(|row| row.get(id_column))
            .cloned()
            .unwrap_or_default())
    }

    fn locked<T>(&self, f: impl FnOnce() -> DbResult<T>) -> DbResult<T> {
        let _guard = LockGuard::acquire(self.lock, self.lock_timeout)?;
        f().map_err(DbError::into_internal)
    }
}

fn require_filters(groups: &[FilterGroup], operation: &str) -> DbResult<()> {
    if groups.iter().all(FilterGroup::is_empty) {
        return Err(DbError::missing_or_wrong_params(format!(
            "No filters set for {}",
            operation
        )));
    }
    Ok(())
}

/// ANDs `filter` into every group, or starts a group when there are none
fn and_into_groups(groups: &mut Vec<FilterGroup>, filter: Filter) {
    if groups.is_empty() {
        groups.push(FilterGroup::new());
    }
    for group in groups.iter_mut() {
        group.push(Condition::Compare(filter.clone()));
    }
}

fn matching_indices(rows: &[Vec<String>], groups: &[ResolvedGroup]) -> DbResult<Vec<usize>> {
    let mut indices = Vec::new();
    for (index, row) in rows.iter().enumerate() {
        let parsed: Vec<CellValue> = row.iter().map(|cell| parse(cell)).collect();
        if PredicateFilter::matches_row(&parsed, groups)? {
            indices.push(index);
        }
    }
    Ok(indices)
}

fn from_object(object: &Map<String, Value>) -> BTreeMap<String, CellValue> {
    object
        .iter()
        .map(|(key, value)| (key.clone(), CellValue::from_json(value)))
        .collect()
}

/// Maps keys onto header columns by unqualified name; unknown keys drop out
fn column_values(
    header: &[String],
    values: &BTreeMap<String, CellValue>,
) -> BTreeMap<usize, CellValue> {
    values
        .iter()
        .filter_map(|(key, value)| {
            let name = unqualified(key);
            header
                .iter()
                .position(|field| field == name)
                .map(|column| (column, value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::errors::ErrorCode;
    use crate::mutation::{IdStrategy, ProcessLock, UuidSource};
    use crate::storage::{MemoryStore, Sheet, Workbook};
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use serde_json::json;

    const HEADER: [&str; 7] = ["id", "name", "age", "created_at", "updated_at", "deleted_at", "hash"];

    struct Fixture {
        store: MemoryStore,
        lock: ProcessLock,
        hasher: RowHasher,
        clock: ManualClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: MemoryStore::new().with_workbook(
                    "book",
                    Workbook::new().with_sheet(Sheet::new("users", &HEADER)),
                ),
                lock: ProcessLock::new(),
                hasher: RowHasher::default(),
                clock: ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()),
            }
        }

        fn controller(&self) -> MutationController<'_> {
            MutationController::new(
                &self.store,
                &self.lock,
                Duration::from_millis(50),
                &self.hasher,
                &self.clock,
                &UuidSource,
            )
        }

        fn rows(&self) -> Vec<Vec<String>> {
            self.store.sheet("book", "users").unwrap().values()
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("not an object"),
        }
    }

    fn users() -> Query {
        Query::new("book", "users")
    }

    #[test]
    fn test_insert_assigns_ids_and_stamps() {
        let fx = Fixture::new();
        let id = fx
            .controller()
            .insert(
                &users(),
                &[
                    object(json!({"name": "Ann", "age": 30, "id": 99, "nickname": "x"})),
                    object(json!({"name": "Bo", "age": 41})),
                ],
            )
            .unwrap();
        assert_eq!(id, CellValue::from(2));

        let rows = fx.rows();
        assert_eq!(rows[0][0], "1");
        assert_eq!(rows[0][1], "Ann");
        assert_eq!(rows[0][3], "Wed, 01 May 2024 09:00:00 GMT");
        assert_eq!(rows[0][4], rows[0][3]);
        assert_eq!(rows[0][5], "");
        assert_eq!(rows[0][6], fx.hasher.hash(&HEADER.map(String::from), &rows[0]));
        assert_eq!(rows[1][0], "2");
    }

    #[test]
    fn test_insert_defaults_fill_missing() {
        let fx = Fixture::new();
        let query = users().with_defaults([("age", 18)]);
        fx.controller()
            .insert(&query, &[object(json!({"name": "Cy"})), object(json!({"name": "Di", "age": null}))])
            .unwrap();
        let rows = fx.rows();
        assert_eq!(rows[0][2], "18");
        assert_eq!(rows[1][2], "18");
    }

    #[test]
    fn test_insert_requires_id_column_and_rows() {
        let fx = Fixture::new();
        fx.store.put_workbook(
            "book",
            Workbook::new().with_sheet(Sheet::new("users", &["name"])),
        );
        let err = fx
            .controller()
            .insert(&users(), &[object(json!({"name": "Ann"}))])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedTableStructure);

        let err = fx.controller().insert(&users(), &[]).unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);
    }

    #[test]
    fn test_insert_uuid_strategy() {
        let fx = Fixture::new();
        let query = users().with_id_strategy(IdStrategy::RandomUnique);
        let id = fx
            .controller()
            .insert(&query, &[object(json!({"name": "Ann"}))])
            .unwrap();
        assert_eq!(fx.rows()[0][0], id.to_string());
        assert_eq!(id.to_string().len(), 36);
    }

    #[test]
    fn test_update_is_idempotent_for_timestamps() {
        let fx = Fixture::new();
        fx.controller()
            .insert(&users(), &[object(json!({"name": "Ann", "age": 30}))])
            .unwrap();
        let before = fx.rows()[0].clone();

        fx.clock.advance(ChronoDuration::minutes(5));
        let n = fx
            .controller()
            .update(&users(), &object(json!({"id": 1, "age": 30})))
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(fx.rows()[0], before);

        let n = fx
            .controller()
            .update(&users(), &object(json!({"id": 1, "age": 31})))
            .unwrap();
        assert_eq!(n, 1);
        let after = &fx.rows()[0];
        assert_eq!(after[2], "31");
        assert_eq!(after[4], "Wed, 01 May 2024 09:05:00 GMT");
        assert_ne!(after[6], before[6]);
        assert_eq!(after[3], before[3]);
    }

    #[test]
    fn test_update_requires_filters_and_known_fields() {
        let fx = Fixture::new();
        let err = fx
            .controller()
            .update(&users(), &object(json!({"age": 3})))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::MissingOrWrongParams);

        let err = fx
            .controller()
            .update(&users().where_eq("id", 1), &object(json!({"email": "a@b"})))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AmbiguousOrMissingField);
    }

    #[test]
    fn test_update_without_match_returns_zero() {
        let fx = Fixture::new();
        let n = fx
            .controller()
            .update(&users().where_eq("name", "Nobody"), &object(json!({"age": 1})))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_update_keeps_formulas_in_untouched_cells() {
        let fx = Fixture::new();
        fx.store.put_workbook(
            "book",
            Workbook::new().with_sheet(Sheet::new("users", &["id", "name", "label"]).with_row(&[
                "1", "Ann", "ANN",
            ])),
        );
        let handle = fx.store.open_table("book", &"users".into()).unwrap();
        fx.store
            .write_row_range(
                &handle,
                RowPosition::new(2),
                &["1".into(), "Ann".into(), "=UPPER(B2)".into()],
            )
            .unwrap();

        fx.controller()
            .update(&users().where_eq("id", 1), &object(json!({"name": "Anna"})))
            .unwrap();

        let sheet = fx.store.sheet("book", "users").unwrap();
        assert_eq!(sheet.values()[0][1], "Anna");
        assert_eq!(sheet.formulas()[0][2], "=UPPER(B2)");
    }

    #[test]
    fn test_soft_delete_and_restore() {
        let fx = Fixture::new();
        fx.controller()
            .insert(&users(), &[object(json!({"name": "Ann"})), object(json!({"name": "Bo"}))])
            .unwrap();

        let n = fx
            .controller()
            .delete(&users().where_eq("id", 2), DeleteMode::Soft)
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(fx.rows()[1][5], "Wed, 01 May 2024 09:00:00 GMT");

        let n = fx.controller().restore(&users().where_eq("name", "Bo")).unwrap();
        assert_eq!(n, 1);
        assert_eq!(fx.rows()[1][5], "");
        // nothing left to restore
        assert_eq!(fx.controller().restore(&users().where_eq("name", "Bo")).unwrap(), 0);
    }

    #[test]
    fn test_soft_delete_needs_deleted_at_column() {
        let fx = Fixture::new();
        fx.store.put_workbook(
            "book",
            Workbook::new().with_sheet(Sheet::new("users", &["id", "name"]).with_row(&["1", "Ann"])),
        );
        let err = fx
            .controller()
            .delete(&users().where_eq("id", 1), DeleteMode::Soft)
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::UnexpectedTableStructure);
    }

    #[test]
    fn test_hard_delete_removes_from_last_to_first() {
        let fx = Fixture::new();
        let batch: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| object(json!({ "name": name })))
            .collect();
        fx.controller().insert(&users(), &batch).unwrap();

        let query = users()
            .where_eq("name", "a")
            .or_filter(Filter::eq("name", "c"));
        let n = fx.controller().delete(&query, DeleteMode::Hard).unwrap();
        assert_eq!(n, 2);
        let names: Vec<String> = fx.rows().iter().map(|r| r[1].clone()).collect();
        assert_eq!(names, vec!["b", "d"]);
    }

    #[test]
    fn test_held_lock_times_out() {
        let fx = Fixture::new();
        assert!(fx.lock.try_acquire(Duration::ZERO));
        let err = fx
            .controller()
            .insert(&users(), &[object(json!({"name": "Ann"}))])
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
        assert!(fx.rows().is_empty());
    }

    #[test]
    fn test_sequential_ids_continue_after_existing_rows() {
        let fx = Fixture::new();
        fx.store.put_workbook(
            "book",
            Workbook::new().with_sheet(
                Sheet::new("users", &HEADER).with_row(&["7", "Old", "", "", "", "", ""]),
            ),
        );
        let id = fx
            .controller()
            .insert(&users(), &[object(json!({"name": "New"}))])
            .unwrap();
        assert_eq!(id, CellValue::from(8));
    }
}
