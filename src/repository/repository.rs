use super::codec::{Record, coerce_value, row_to_record};
use crate::core::{ColumnType, DbError, Value};
use crate::inference::Schema;
use crate::registry::{
    CREATED_AT_COLUMN, CollectionDefinition, PARENT_ID_COLUMN, Registry, RegistryError,
    TableEntry, sanitize_identifier,
};
use crate::storage::{CatalogEntry, ChildInsert, CommitOutcome, Mutation, RowValues, StorageEngine};
use chrono::Utc;
use serde_json::Value as JsonValue;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Collection '{0}' is not registered")]
    NotRegistered(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Storage failure: {0}")]
    Storage(#[from] DbError),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// CRUD over every table the registry knows about, main or child.
///
/// Each call performs at most one storage commit.
#[derive(Clone)]
pub struct Repository {
    registry: Arc<Registry>,
    engine: Arc<dyn StorageEngine>,
    /// Serializes first registrations.
    provisioning: Arc<Mutex<()>>,
}

impl Repository {
    pub fn new(registry: Arc<Registry>, engine: Arc<dyn StorageEngine>) -> Self {
        Self {
            registry,
            engine,
            provisioning: Arc::new(Mutex::new(())),
        }
    }

    /// Re-registers every collection recorded in the engine's catalog.
    pub async fn open(engine: Arc<dyn StorageEngine>) -> Result<Self> {
        let repository = Self::new(Arc::new(Registry::new()), engine);
        let catalog = repository.engine.catalog().await?;
        for entry in &catalog {
            let definition = CollectionDefinition::derive(entry.collection.clone(), &entry.schema)?;
            // completes provisioning interrupted before the restart
            repository.ensure_tables(&definition).await?;
            repository.registry.publish(definition)?;
        }
        if !catalog.is_empty() {
            info!(collections = catalog.len(), "restored registered collections");
        }
        Ok(repository)
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn engine(&self) -> &Arc<dyn StorageEngine> {
        &self.engine
    }

    /// Registers `name` (first schema wins) once its catalog entry and
    /// physical tables exist.
    ///
    /// The definition is published last, so a collection is either fully
    /// provisioned and persisted or unknown to every other call. A failed
    /// attempt can simply be retried.
    pub async fn create_from_schema(
        &self,
        name: &str,
        schema: &Schema,
    ) -> Result<Arc<CollectionDefinition>> {
        let table_name = sanitize_identifier(name)?;
        if let Some(existing) = self.registry.collection(&table_name)? {
            return Ok(existing);
        }

        let _provisioning = self.provisioning.lock().await;
        if let Some(existing) = self.registry.collection(&table_name)? {
            return Ok(existing);
        }

        // the catalog keeps the first schema ever recorded for this name, even
        // when an earlier attempt failed after writing it
        self.engine
            .store_catalog_entry(CatalogEntry {
                collection: table_name.clone(),
                schema: schema.clone(),
            })
            .await?;
        let recorded = self
            .engine
            .catalog()
            .await?
            .into_iter()
            .find(|entry| entry.collection == table_name)
            .map(|entry| entry.schema)
            .ok_or_else(|| {
                DbError::ExecutionError(format!("Catalog entry for '{}' was not stored", table_name))
            })?;

        let definition = CollectionDefinition::derive(table_name, &recorded)?;
        self.ensure_tables(&definition).await?;
        Ok(self.registry.publish(definition)?.definition)
    }

    async fn ensure_tables(&self, definition: &CollectionDefinition) -> Result<()> {
        for table_schema in definition.table_schemas() {
            let name = table_schema.name().to_string();
            if self.engine.create_table(table_schema).await? {
                info!(table = %name, "provisioned table");
            }
        }
        Ok(())
    }

    /// Returns the id of the new row.
    ///
    /// Fields without a matching column are dropped. For a main collection,
    /// object values of nested fields are written to the child tables in the
    /// same commit.
    pub async fn insert(&self, name: &str, record: &Record) -> Result<i64> {
        let entry = self.resolve(name)?;
        let created_at = Value::Timestamp(Utc::now());

        let mut values = encode_values(&entry, record)?;
        values.push((CREATED_AT_COLUMN.to_string(), created_at.clone()));

        let mut children = Vec::new();
        if let TableEntry::Main(definition) = &entry {
            for child in &definition.children {
                let nested = record
                    .get(&child.source_field)
                    .or_else(|| record.get(&child.field_name))
                    .and_then(JsonValue::as_object);
                let Some(nested) = nested else {
                    continue;
                };
                let child_entry = TableEntry::Child(child.clone());
                let mut child_values = encode_values(&child_entry, nested)?;
                child_values.push((CREATED_AT_COLUMN.to_string(), created_at.clone()));
                children.push(ChildInsert {
                    table: child.table_name.clone(),
                    values: child_values,
                });
            }
        }

        let mutation = Mutation::Insert {
            table: entry.table_name().to_string(),
            values,
            children,
        };
        match self.engine.commit(mutation).await? {
            CommitOutcome::Inserted { id, child_ids } => {
                debug!(table = entry.table_name(), id, children = child_ids.len(), "inserted row");
                Ok(id)
            }
            other => Err(unexpected_outcome(other)),
        }
    }

    pub async fn get(&self, name: &str, id: i64) -> Result<Option<Record>> {
        let entry = self.resolve(name)?;
        let schema = entry.table_schema();
        let row = self.engine.get(entry.table_name(), id).await?;
        Ok(row.map(|row| row_to_record(&schema, &row)))
    }

    /// At most `limit` records in ascending id order.
    pub async fn list(&self, name: &str, limit: usize) -> Result<Vec<Record>> {
        let entry = self.resolve(name)?;
        let schema = entry.table_schema();
        let rows = self.engine.scan(entry.table_name(), limit).await?;
        Ok(rows.iter().map(|row| row_to_record(&schema, row)).collect())
    }

    /// Overwrites the columns present in `partial`. Returns `false` when no
    /// row has this id. Nested fields are ignored.
    pub async fn update(&self, name: &str, id: i64, partial: &Record) -> Result<bool> {
        let entry = self.resolve(name)?;
        let values = encode_values(&entry, partial)?;
        let mutation = Mutation::Update {
            table: entry.table_name().to_string(),
            id,
            values,
        };
        match self.engine.commit(mutation).await? {
            CommitOutcome::Updated(updated) => Ok(updated),
            other => Err(unexpected_outcome(other)),
        }
    }

    /// Returns `false` when no row has this id. Child rows go with their parent.
    pub async fn delete(&self, name: &str, id: i64) -> Result<bool> {
        let entry = self.resolve(name)?;
        let mutation = Mutation::Delete {
            table: entry.table_name().to_string(),
            id,
        };
        match self.engine.commit(mutation).await? {
            CommitOutcome::Deleted(deleted) => Ok(deleted),
            other => Err(unexpected_outcome(other)),
        }
    }

    pub fn collections(&self) -> Result<Vec<Arc<CollectionDefinition>>> {
        Ok(self.registry.collections()?)
    }

    fn resolve(&self, name: &str) -> Result<TableEntry> {
        self.registry
            .table(name)?
            .ok_or_else(|| RepositoryError::NotRegistered(name.to_string()))
    }
}

/// Column values for the keys of `record` that match a column of `entry`.
/// Child tables additionally accept `parent_id`.
fn encode_values(entry: &TableEntry, record: &Record) -> Result<RowValues> {
    let mut values = RowValues::new();

    if let TableEntry::Child(_) = entry
        && let Some(parent_id) = record.get(PARENT_ID_COLUMN)
    {
        let value = coerce_value(PARENT_ID_COLUMN, ColumnType::Integer, parent_id)?;
        values.push((PARENT_ID_COLUMN.to_string(), value));
    }

    for column in entry.columns() {
        let Some(raw) = record
            .get(&column.source_field)
            .or_else(|| record.get(&column.name))
        else {
            continue;
        };
        values.push((
            column.name.clone(),
            coerce_value(&column.name, column.column_type, raw)?,
        ));
    }
    Ok(values)
}

fn unexpected_outcome(outcome: CommitOutcome) -> RepositoryError {
    RepositoryError::Storage(DbError::ExecutionError(format!(
        "Unexpected commit outcome: {:?}",
        outcome
    )))
}
