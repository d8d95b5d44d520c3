use super::catalog::{Catalog, CatalogEntry};
use super::engine::{ChildInsert, CommitOutcome, Mutation, RowValues, StorageEngine};
use super::table::Table;
use crate::core::{DbError, Result, Row, TableSchema, Value};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Default)]
struct MemoryState {
    tables: HashMap<String, Table>,
    catalog: Catalog,
}

/// Process-local storage engine.
///
/// All tables sit behind one lock so a commit touching a parent table and its
/// child tables is observed either completely or not at all.
#[derive(Default)]
pub struct InMemoryStorage {
    state: RwLock<MemoryState>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every table and the catalog, for persistence snapshots.
    pub async fn snapshot(&self) -> (HashMap<String, Table>, Vec<CatalogEntry>) {
        let state = self.state.read().await;
        (state.tables.clone(), state.catalog.entries())
    }

    /// Replaces all contents, for crash recovery.
    pub async fn restore(&self, tables: HashMap<String, Table>, catalog: Vec<CatalogEntry>) {
        let mut state = self.state.write().await;
        state.tables = tables;
        state.catalog = catalog.into_iter().collect();
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        let state = self.state.read().await;
        Ok(table_ref(&state.tables, table)?.row_count())
    }

    /// Validates `mutation`, runs `before_apply`, then applies it, all under
    /// one write lock. `before_apply` only runs for mutations that change
    /// state; when it fails nothing is applied.
    pub(crate) async fn commit_with<F>(&self, mutation: &Mutation, before_apply: F) -> Result<CommitOutcome>
    where
        F: FnOnce() -> Result<()> + Send,
    {
        let mut state = self.state.write().await;
        let plan = match plan(&state.tables, mutation)? {
            Plan::Unchanged(outcome) => return Ok(outcome),
            plan => plan,
        };
        before_apply()?;
        execute(&mut state.tables, plan)
    }

    /// Like [`InMemoryStorage::commit_with`] for table creation. Returns
    /// `false` without calling `before_apply` when the table already exists.
    pub(crate) async fn create_table_with<F>(&self, schema: TableSchema, before_apply: F) -> Result<bool>
    where
        F: FnOnce(&TableSchema) -> Result<()> + Send,
    {
        let mut state = self.state.write().await;
        if state.tables.contains_key(schema.name()) {
            debug!(table = schema.name(), "table already exists");
            return Ok(false);
        }
        if let Some(fk) = schema.foreign_key()
            && !state.tables.contains_key(&fk.references_table)
        {
            return Err(DbError::TableNotFound(fk.references_table.clone()));
        }

        before_apply(&schema)?;
        debug!(table = schema.name(), columns = schema.column_count(), "creating table");
        state
            .tables
            .insert(schema.name().to_string(), Table::new(schema));
        Ok(true)
    }

    /// Returns `false` without calling `before_apply` when the collection is
    /// already in the catalog.
    pub(crate) async fn store_catalog_entry_with<F>(&self, entry: CatalogEntry, before_apply: F) -> Result<bool>
    where
        F: FnOnce(&CatalogEntry) -> Result<()> + Send,
    {
        let mut state = self.state.write().await;
        if state.catalog.contains(&entry.collection) {
            return Ok(false);
        }
        before_apply(&entry)?;
        let catalog = std::mem::take(&mut state.catalog);
        state.catalog = catalog.with_entry(entry);
        Ok(true)
    }
}

#[async_trait]
impl StorageEngine for InMemoryStorage {
    async fn create_table(&self, schema: TableSchema) -> Result<bool> {
        self.create_table_with(schema, |_| Ok(())).await
    }

    async fn table_exists(&self, name: &str) -> bool {
        self.state.read().await.tables.contains_key(name)
    }

    async fn list_tables(&self) -> Vec<String> {
        let state = self.state.read().await;
        let mut names: Vec<String> = state.tables.keys().cloned().collect();
        names.sort();
        names
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        let state = self.state.read().await;
        Ok(table_ref(&state.tables, table)?.schema().clone())
    }

    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>> {
        let state = self.state.read().await;
        Ok(table_ref(&state.tables, table)?.get(id).cloned())
    }

    async fn scan(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        let state = self.state.read().await;
        Ok(table_ref(&state.tables, table)?.scan(limit))
    }

    async fn commit(&self, mutation: Mutation) -> Result<CommitOutcome> {
        self.commit_with(&mutation, || Ok(())).await
    }

    async fn store_catalog_entry(&self, entry: CatalogEntry) -> Result<()> {
        self.store_catalog_entry_with(entry, |_| Ok(())).await?;
        Ok(())
    }

    async fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        Ok(self.state.read().await.catalog.entries())
    }
}

/// A mutation that passed every check and can be written without failing.
enum Plan {
    Insert {
        table: String,
        row: Row,
        children: Vec<(String, Row)>,
        outcome: CommitOutcome,
    },
    Update {
        table: String,
        id: i64,
        row: Row,
    },
    Delete {
        table: String,
        id: i64,
    },
    /// Nothing to write, e.g. the target row does not exist.
    Unchanged(CommitOutcome),
}

/// Validates `mutation` against the current tables without modifying them.
fn plan(tables: &HashMap<String, Table>, mutation: &Mutation) -> Result<Plan> {
    match mutation {
        Mutation::Insert {
            table,
            values,
            children,
        } => plan_insert(tables, table, values, children),
        Mutation::Update { table, id, values } => {
            let target = table_ref(tables, table)?;
            check_reference(tables, target.schema(), values)?;
            Ok(match target.prepare_update(*id, values)? {
                Some(row) => Plan::Update {
                    table: table.clone(),
                    id: *id,
                    row,
                },
                None => Plan::Unchanged(CommitOutcome::Updated(false)),
            })
        }
        Mutation::Delete { table, id } => Ok(if table_ref(tables, table)?.contains(*id) {
            Plan::Delete {
                table: table.clone(),
                id: *id,
            }
        } else {
            Plan::Unchanged(CommitOutcome::Deleted(false))
        }),
    }
}

fn plan_insert(
    tables: &HashMap<String, Table>,
    table: &str,
    values: &RowValues,
    children: &[ChildInsert],
) -> Result<Plan> {
    let parent = table_ref(tables, table)?;
    check_reference(tables, parent.schema(), values)?;
    let id = parent.next_id();
    let row = parent.prepare_row(id, values)?;

    let mut seen = HashSet::new();
    let mut child_rows = Vec::with_capacity(children.len());
    let mut child_ids = Vec::with_capacity(children.len());
    for child in children {
        if !seen.insert(child.table.as_str()) {
            return Err(DbError::ConstraintViolation(format!(
                "Table '{}' appears twice in one insert",
                child.table
            )));
        }
        let child_table = table_ref(tables, &child.table)?;
        let fk = child_table
            .schema()
            .foreign_key()
            .filter(|fk| fk.references_table == table)
            .ok_or_else(|| {
                DbError::ConstraintViolation(format!(
                    "Table '{}' does not reference '{}'",
                    child.table, table
                ))
            })?;

        let mut child_values: RowValues = child
            .values
            .iter()
            .filter(|(name, _)| *name != fk.column)
            .cloned()
            .collect();
        child_values.push((fk.column.clone(), Value::Integer(id)));
        let child_id = child_table.next_id();
        child_rows.push((child.table.clone(), child_table.prepare_row(child_id, &child_values)?));
        child_ids.push(child_id);
    }

    Ok(Plan::Insert {
        table: table.to_string(),
        row,
        children: child_rows,
        outcome: CommitOutcome::Inserted { id, child_ids },
    })
}

/// Writes a plan produced by [`plan`] against the same, unmodified tables.
fn execute(tables: &mut HashMap<String, Table>, plan: Plan) -> Result<CommitOutcome> {
    match plan {
        Plan::Insert {
            table,
            row,
            children,
            outcome,
        } => {
            table_mut(tables, &table)?.insert_prepared(row);
            for (name, row) in children {
                table_mut(tables, &name)?.insert_prepared(row);
            }
            Ok(outcome)
        }
        Plan::Update { table, id, row } => {
            Ok(CommitOutcome::Updated(table_mut(tables, &table)?.replace(id, row)))
        }
        Plan::Delete { table, id } => cascade_delete(tables, &table, id),
        Plan::Unchanged(outcome) => Ok(outcome),
    }
}

fn cascade_delete(tables: &mut HashMap<String, Table>, table: &str, id: i64) -> Result<CommitOutcome> {
    if !table_mut(tables, table)?.delete(id) {
        return Ok(CommitOutcome::Deleted(false));
    }

    // cascade to rows referencing the deleted ones
    let mut pending = vec![(table.to_string(), id)];
    while let Some((parent, parent_id)) = pending.pop() {
        let referencing: Vec<(String, String)> = tables
            .values()
            .filter_map(|t| {
                t.schema()
                    .foreign_key()
                    .filter(|fk| fk.references_table == parent)
                    .map(|fk| (t.name().to_string(), fk.column.clone()))
            })
            .collect();

        for (child, column) in referencing {
            let removed = table_mut(tables, &child)?.delete_where(&column, &Value::Integer(parent_id))?;
            if !removed.is_empty() {
                debug!(table = %child, parent = %parent, parent_id, rows = removed.len(), "cascaded delete");
            }
            pending.extend(removed.into_iter().map(|removed_id| (child.clone(), removed_id)));
        }
    }

    Ok(CommitOutcome::Deleted(true))
}

/// A foreign key value being written must point at an existing parent row.
fn check_reference(
    tables: &HashMap<String, Table>,
    schema: &TableSchema,
    values: &RowValues,
) -> Result<()> {
    let Some(fk) = schema.foreign_key() else {
        return Ok(());
    };
    let Some((_, value)) = values.iter().find(|(name, _)| *name == fk.column) else {
        return Ok(());
    };
    if value.is_null() {
        // rejected by the NOT NULL check
        return Ok(());
    }

    let exists = value
        .as_i64()
        .is_some_and(|parent_id| table_ref(tables, &fk.references_table).is_ok_and(|t| t.contains(parent_id)));
    if !exists {
        return Err(DbError::ConstraintViolation(format!(
            "Column '{}' of '{}' references missing row {} in '{}'",
            fk.column,
            schema.name(),
            value,
            fk.references_table
        )));
    }
    Ok(())
}

fn table_ref<'a>(tables: &'a HashMap<String, Table>, name: &str) -> Result<&'a Table> {
    tables
        .get(name)
        .ok_or_else(|| DbError::TableNotFound(name.to_string()))
}

fn table_mut<'a>(tables: &'a mut HashMap<String, Table>, name: &str) -> Result<&'a mut Table> {
    tables
        .get_mut(name)
        .ok_or_else(|| DbError::TableNotFound(name.to_string()))
}

/// Replays a mutation during recovery, outside of any lock.
pub(crate) fn replay(tables: &mut HashMap<String, Table>, mutation: &Mutation) -> Result<CommitOutcome> {
    let plan = plan(tables, mutation)?;
    execute(tables, plan)
}
