//! Result types for query execution

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::codec::CellValue;
use crate::errors::{DbError, DbResult};

/// Ordered fields plus ordered rows
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub fields: Vec<String>,
    /// Every row holds exactly `fields.len()` cells
    pub rows: Vec<Vec<CellValue>>,
}

impl Table {
    pub fn new(fields: Vec<String>, rows: Vec<Vec<CellValue>>) -> Self {
        Self { fields, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row as one object holding both flat keys (`"users.name"`) and nested
    /// keys (`{"users": {"name": ..}}`).
    ///
    /// A field literally named like a table prefix keeps its flat key; the
    /// nested map for that prefix is left out.
    pub fn row_object(&self, row: &[CellValue]) -> Value {
        let mut object = Map::new();
        let mut nested: BTreeMap<String, Map<String, Value>> = BTreeMap::new();
        for (field, cell) in self.fields.iter().zip(row) {
            let value = cell.to_json();
            if let Some((table, name)) = field.split_once('.') {
                nested
                    .entry(table.to_string())
                    .or_default()
                    .insert(name.to_string(), value.clone());
            }
            object.insert(field.clone(), value);
        }
        for (table, columns) in nested {
            object.entry(table).or_insert(Value::Object(columns));
        }
        Value::Object(object)
    }
}

/// One page of a result set
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub current_page: usize,
    pub page_size: usize,
    pub total_results: usize,
    pub total_pages: usize,
    pub fields: Vec<String>,
    /// Rows as JSON arrays, or the transformed values after `transform`
    pub rows: Vec<Value>,
}

/// Table produced by the latest select, with its terminal accessors
#[derive(Debug, Clone, Default)]
pub struct ResultTable {
    table: Table,
    transformed: Option<Vec<Value>>,
}

impl ResultTable {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            transformed: None,
        }
    }

    pub fn fields(&self) -> &[String] {
        &self.table.fields
    }

    /// Raw typed rows (unaffected by `transform`)
    pub fn rows(&self) -> &[Vec<CellValue>] {
        &self.table.rows
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn count(&self) -> usize {
        match &self.transformed {
            Some(values) => values.len(),
            None => self.table.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Every row in object form (or the transformed values)
    pub fn all(&self) -> Vec<Value> {
        match &self.transformed {
            Some(values) => values.clone(),
            None => self
                .table
                .rows
                .iter()
                .map(|row| self.table.row_object(row))
                .collect(),
        }
    }

    pub fn to_objects(&self) -> Vec<Value> {
        self.all()
    }

    pub fn first(&self) -> Option<Value> {
        self.nth(0)
    }

    pub fn last(&self) -> Option<Value> {
        self.count().checked_sub(1).and_then(|index| self.nth(index))
    }

    pub fn first_or_fail(&self) -> DbResult<Value> {
        self.first()
            .ok_or_else(|| DbError::not_found("There is no record to return"))
    }

    /// Replaces the result set with `f` applied to each row object.
    /// Later accessors see the transformed values.
    pub fn transform<F>(&mut self, f: F) -> &mut Self
    where
        F: FnMut(Value) -> Value,
    {
        let values = self.all().into_iter().map(f).collect();
        self.transformed = Some(values);
        self
    }

    /// Slice `[(page-1)*size, page*size)` of the result set
    pub fn paginate(&self, page_size: usize, page_number: usize) -> DbResult<Page> {
        if page_size == 0 || page_number == 0 {
            return Err(DbError::missing_or_wrong_params(format!(
                "Page size and page number must be positive, got size {} page {}",
                page_size, page_number
            )));
        }

        let total_results = self.count();
        let total_pages = total_results.div_ceil(page_size);
        let start = (page_number - 1).saturating_mul(page_size).min(total_results);
        let end = start.saturating_add(page_size).min(total_results);

        let rows = match &self.transformed {
            Some(values) => values[start..end].to_vec(),
            None => self.table.rows[start..end]
                .iter()
                .map(|row| Value::Array(row.iter().map(CellValue::to_json).collect()))
                .collect(),
        };

        Ok(Page {
            current_page: page_number,
            page_size,
            total_results,
            total_pages,
            fields: self.table.fields.clone(),
            rows,
        })
    }

    fn nth(&self, index: usize) -> Option<Value> {
        match &self.transformed {
            Some(values) => values.get(index).cloned(),
            None => self
                .table
                .rows
                .get(index)
                .map(|row| self.table.row_object(row)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn table(n: usize) -> ResultTable {
        let rows = (1..=n)
            .map(|i| vec![CellValue::from(i as i64), CellValue::text(format!("user{}", i))])
            .collect();
        ResultTable::new(Table::new(vec!["users.id".into(), "users.name".into()], rows))
    }

    #[test]
    fn test_row_object_has_flat_and_nested_keys() {
        let result = table(1);
        let first = result.first().unwrap();
        assert_eq!(first["users.name"], json!("user1"));
        assert_eq!(first["users"]["name"], json!("user1"));
        assert_eq!(first["users"]["id"], json!(1));
    }

    #[test]
    fn test_row_object_flat_field_named_like_alias() {
        let fields = vec!["orders".into(), "orders.total".into(), "o.total".into()];
        let table = Table::new(
            fields,
            vec![vec![CellValue::text("flat"), CellValue::from(5), CellValue::from(7)]],
        );
        let row = table.row_object(&table.rows[0]);
        assert_eq!(row["orders"], json!("flat"));
        assert_eq!(row["orders.total"], json!(5));
        assert_eq!(row["o"]["total"], json!(7));

        // same result whichever side comes first
        let fields = vec!["orders.total".into(), "orders".into()];
        let table = Table::new(fields, vec![vec![CellValue::from(5), CellValue::text("flat")]]);
        let row = table.row_object(&table.rows[0]);
        assert_eq!(row["orders"], json!("flat"));
        assert_eq!(row["orders.total"], json!(5));
    }

    #[test]
    fn test_first_last_on_empty() {
        let result = table(0);
        assert!(result.first().is_none());
        assert!(result.last().is_none());
        let err = result.first_or_fail().unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_last_and_count() {
        let result = table(3);
        assert_eq!(result.count(), 3);
        assert_eq!(result.last().unwrap()["users.id"], json!(3));
    }

    #[test]
    fn test_pagination_sizes() {
        let result = table(5);
        let sizes: Vec<usize> = (1..=3)
            .map(|p| result.paginate(2, p).unwrap().rows.len())
            .collect();
        assert_eq!(sizes, vec![2, 2, 1]);

        let page = result.paginate(2, 3).unwrap();
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.total_results, 5);
        assert_eq!(page.rows[0], json!([5, "user5"]));
    }

    #[test]
    fn test_pagination_past_end_is_empty() {
        let page = table(5).paginate(2, 9).unwrap();
        assert!(page.rows.is_empty());
        assert_eq!(page.current_page, 9);
    }

    #[test]
    fn test_pagination_rejects_zero() {
        assert!(table(5).paginate(0, 1).is_err());
        assert!(table(5).paginate(2, 0).is_err());
    }

    #[test]
    fn test_transform_replaces_results() {
        let mut result = table(3);
        result.transform(|row| row["users.name"].clone());
        assert_eq!(result.all(), vec![json!("user1"), json!("user2"), json!("user3")]);
        assert_eq!(result.first(), Some(json!("user1")));
        assert_eq!(result.paginate(2, 2).unwrap().rows, vec![json!("user3")]);
        // raw rows stay available
        assert_eq!(result.rows().len(), 3);
    }
}
