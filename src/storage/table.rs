use super::engine::RowValues;
use crate::core::{DbError, Result, Row, TableSchema, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Rows of one table keyed by their engine-assigned primary key.
///
/// Ids start at 1, grow monotonically and are never reused, even after the
/// row holding the highest id is deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    schema: TableSchema,
    rows: BTreeMap<i64, Row>,
    next_id: i64,
}

impl Table {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            rows: BTreeMap::new(),
            next_id: 1,
        }
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    pub fn name(&self) -> &str {
        self.schema.name()
    }

    /// Id the next successful insert will receive.
    pub fn next_id(&self) -> i64 {
        self.next_id
    }

    /// Builds and validates a full row from named values without storing it.
    /// The primary key slot is filled with `id`.
    pub fn prepare_row(&self, id: i64, values: &RowValues) -> Result<Row> {
        let pk_index = self.pk_index()?;
        let mut row = vec![Value::Null; self.schema.column_count()];
        row[pk_index] = Value::Integer(id);

        for (name, value) in values {
            let idx = self.column_index(name)?;
            if idx == pk_index {
                return Err(DbError::ConstraintViolation(format!(
                    "Primary key '{}' of table '{}' is assigned by storage",
                    name,
                    self.name()
                )));
            }
            row[idx] = value.clone();
        }

        self.validate_row(&row)?;
        Ok(row)
    }

    /// Stores a row produced by [`Table::prepare_row`] for [`Table::next_id`].
    pub fn insert_prepared(&mut self, row: Row) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        self.rows.insert(id, row);
        id
    }

    pub fn insert(&mut self, values: &RowValues) -> Result<i64> {
        let row = self.prepare_row(self.next_id, values)?;
        Ok(self.insert_prepared(row))
    }

    /// Applies the named values on top of the stored row. Returns `None` when
    /// no row has this id.
    pub fn prepare_update(&self, id: i64, values: &RowValues) -> Result<Option<Row>> {
        let Some(current) = self.rows.get(&id) else {
            return Ok(None);
        };
        let pk_index = self.pk_index()?;

        let mut row = current.clone();
        for (name, value) in values {
            let idx = self.column_index(name)?;
            if idx == pk_index {
                return Err(DbError::ConstraintViolation(format!(
                    "Primary key '{}' of table '{}' cannot be updated",
                    name,
                    self.name()
                )));
            }
            row[idx] = value.clone();
        }

        self.validate_row(&row)?;
        Ok(Some(row))
    }

    pub fn replace(&mut self, id: i64, row: Row) -> bool {
        match self.rows.get_mut(&id) {
            Some(slot) => {
                *slot = row;
                true
            }
            None => false,
        }
    }

    pub fn delete(&mut self, id: i64) -> bool {
        self.rows.remove(&id).is_some()
    }

    /// Removes every row whose `column` holds `value`; returns the removed ids.
    pub fn delete_where(&mut self, column: &str, value: &Value) -> Result<Vec<i64>> {
        let idx = self.column_index(column)?;
        let ids: Vec<i64> = self
            .rows
            .iter()
            .filter(|(_, row)| &row[idx] == value)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.rows.remove(id);
        }
        Ok(ids)
    }

    pub fn get(&self, id: i64) -> Option<&Row> {
        self.rows.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.rows.contains_key(&id)
    }

    /// At most `limit` rows in ascending id order.
    pub fn scan(&self, limit: usize) -> Vec<Row> {
        self.rows.values().take(limit).cloned().collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    fn pk_index(&self) -> Result<usize> {
        self.schema.primary_key_index().ok_or_else(|| {
            DbError::ExecutionError(format!("Table '{}' has no primary key", self.name()))
        })
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.schema
            .find_column_index(name)
            .ok_or_else(|| DbError::ColumnNotFound(name.to_string(), self.name().to_string()))
    }

    fn validate_row(&self, row: &Row) -> Result<()> {
        if row.len() != self.schema.column_count() {
            return Err(DbError::ExecutionError(format!(
                "Expected {} values, got {}",
                self.schema.column_count(),
                row.len()
            )));
        }
        for (value, column) in row.iter().zip(self.schema.columns()) {
            column.validate(value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Column, ColumnType};

    fn users() -> Table {
        Table::new(TableSchema::new(
            "users",
            vec![
                Column::new("id", ColumnType::Integer).primary_key(),
                Column::new("name", ColumnType::Text).not_null(),
                Column::new("age", ColumnType::Integer),
            ],
        ))
    }

    fn values(name: &str, age: i64) -> RowValues {
        vec![
            ("name".to_string(), Value::from(name)),
            ("age".to_string(), Value::Integer(age)),
        ]
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut table = users();
        assert_eq!(table.insert(&values("Alice", 30)).unwrap(), 1);
        assert_eq!(table.insert(&values("Bob", 25)).unwrap(), 2);
        assert_eq!(
            table.get(1).unwrap(),
            &vec![Value::Integer(1), Value::from("Alice"), Value::Integer(30)]
        );
    }

    #[test]
    fn test_ids_not_reused_after_delete() {
        let mut table = users();
        table.insert(&values("Alice", 30)).unwrap();
        let id = table.insert(&values("Bob", 25)).unwrap();
        assert!(table.delete(id));
        assert!(!table.delete(id));
        assert_eq!(table.insert(&values("Carol", 41)).unwrap(), 3);
    }

    #[test]
    fn test_failed_insert_does_not_consume_id() {
        let mut table = users();
        let missing_name = vec![("age".to_string(), Value::Integer(3))];
        assert!(matches!(
            table.insert(&missing_name),
            Err(DbError::ConstraintViolation(_))
        ));
        assert!(matches!(
            table.insert(&vec![("nope".to_string(), Value::Null)]),
            Err(DbError::ColumnNotFound(_, _))
        ));
        assert_eq!(table.insert(&values("Alice", 30)).unwrap(), 1);
    }

    #[test]
    fn test_primary_key_is_not_writable() {
        let mut table = users();
        let with_id = vec![
            ("id".to_string(), Value::Integer(7)),
            ("name".to_string(), Value::from("Alice")),
        ];
        assert!(table.insert(&with_id).is_err());

        table.insert(&values("Alice", 30)).unwrap();
        assert!(table.prepare_update(1, &with_id).is_err());
    }

    #[test]
    fn test_partial_update() {
        let mut table = users();
        table.insert(&values("Alice", 30)).unwrap();

        let row = table
            .prepare_update(1, &vec![("age".to_string(), Value::Integer(31))])
            .unwrap()
            .unwrap();
        // preparing does not touch the stored row
        assert_eq!(table.get(1).unwrap()[2], Value::Integer(30));

        assert!(table.replace(1, row));
        assert_eq!(table.get(1).unwrap()[1], Value::from("Alice"));
        assert_eq!(table.get(1).unwrap()[2], Value::Integer(31));

        let missing = table.prepare_update(99, &vec![("age".to_string(), Value::Integer(1))]);
        assert_eq!(missing.unwrap(), None);
    }

    #[test]
    fn test_scan_respects_limit_and_order() {
        let mut table = users();
        for (i, name) in ["a", "b", "c"].iter().enumerate() {
            table.insert(&values(name, i as i64)).unwrap();
        }
        let rows = table.scan(2);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][0], Value::Integer(1));
        assert_eq!(rows[1][0], Value::Integer(2));
        assert!(table.scan(0).is_empty());
    }

    #[test]
    fn test_delete_where() {
        let mut table = users();
        table.insert(&values("a", 1)).unwrap();
        table.insert(&values("b", 2)).unwrap();
        table.insert(&values("c", 1)).unwrap();

        let removed = table.delete_where("age", &Value::Integer(1)).unwrap();
        assert_eq!(removed, vec![1, 3]);
        assert_eq!(table.row_count(), 1);
    }
}
