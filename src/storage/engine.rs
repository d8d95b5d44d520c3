use super::catalog::CatalogEntry;
use crate::core::{Result, Row, TableSchema, Value};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Column name -> value pairs for one row.
pub type RowValues = Vec<(String, Value)>;

/// Row written into a child table as part of its parent's insert. The
/// child's foreign key column is filled with the new parent id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildInsert {
    pub table: String,
    pub values: RowValues,
}

/// One unit of work applied atomically by [`StorageEngine::commit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Mutation {
    Insert {
        table: String,
        values: RowValues,
        children: Vec<ChildInsert>,
    },
    Update {
        table: String,
        id: i64,
        values: RowValues,
    },
    Delete {
        table: String,
        id: i64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Inserted { id: i64, child_ids: Vec<i64> },
    Updated(bool),
    Deleted(bool),
}

/// Storage engine trait - allows pluggable storage backends.
///
/// Every table has an integer primary key assigned by the engine on insert.
/// Rows are returned in the column order of the table schema.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Creates the table if it does not exist yet. Returns `false` and leaves
    /// the existing table untouched otherwise.
    async fn create_table(&self, schema: TableSchema) -> Result<bool>;

    async fn table_exists(&self, name: &str) -> bool;

    async fn list_tables(&self) -> Vec<String>;

    async fn get_schema(&self, table: &str) -> Result<TableSchema>;

    /// Point lookup by primary key.
    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>>;

    /// Up to `limit` rows in ascending primary key order.
    async fn scan(&self, table: &str, limit: usize) -> Result<Vec<Row>>;

    /// Applies one mutation atomically: either all of it is visible
    /// afterwards or none of it is.
    async fn commit(&self, mutation: Mutation) -> Result<CommitOutcome>;

    /// Records a registered collection so it can be re-registered on restart.
    async fn store_catalog_entry(&self, entry: CatalogEntry) -> Result<()>;

    async fn catalog(&self) -> Result<Vec<CatalogEntry>>;
}
