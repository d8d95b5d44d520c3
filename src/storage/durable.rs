use super::catalog::CatalogEntry;
use super::engine::{CommitOutcome, Mutation, StorageEngine};
use super::memory::InMemoryStorage;
use super::persistence::{DurabilityMode, PersistenceManager, WalEntry};
use crate::core::{Result, Row, TableSchema};
use async_trait::async_trait;
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// [`InMemoryStorage`] whose changes are written to a WAL and periodically
/// compacted into a snapshot.
///
/// A change is validated, written to the WAL and only then applied, with the
/// persistence mutex held throughout. The WAL order always matches the order
/// changes became visible, and a change whose WAL append failed is never
/// visible.
pub struct DurableStorage {
    memory: InMemoryStorage,
    persistence: Mutex<PersistenceManager>,
}

impl DurableStorage {
    /// Opens (or creates) the data directory and rebuilds its state.
    pub async fn open<P: AsRef<Path>>(
        data_dir: P,
        durability_mode: DurabilityMode,
        checkpoint_threshold: usize,
    ) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let mut persistence = PersistenceManager::new(data_dir, durability_mode)?;
        persistence
            .wal_mut()
            .set_checkpoint_threshold(checkpoint_threshold);

        let memory = InMemoryStorage::new();
        if let Some(recovered) = persistence.recover()? {
            info!(
                path = %data_dir.display(),
                tables = recovered.tables.len(),
                collections = recovered.catalog.len(),
                "recovered persisted state"
            );
            memory.restore(recovered.tables, recovered.catalog).await;
            // start from a clean WAL so a torn tail frame is never appended to
            let (tables, catalog) = memory.snapshot().await;
            persistence.checkpoint(tables, catalog)?;
        }

        Ok(Self {
            memory,
            persistence: Mutex::new(persistence),
        })
    }

    /// Writes a snapshot and truncates the WAL.
    pub async fn checkpoint(&self) -> Result<()> {
        let mut persistence = self.persistence.lock().await;
        let (tables, catalog) = self.memory.snapshot().await;
        persistence.checkpoint(tables, catalog)
    }

    pub async fn row_count(&self, table: &str) -> Result<usize> {
        self.memory.row_count(table).await
    }

    async fn checkpoint_if_due(&self, persistence: &mut PersistenceManager) {
        if !persistence.needs_checkpoint() {
            return;
        }
        let (tables, catalog) = self.memory.snapshot().await;
        if let Err(err) = persistence.checkpoint(tables, catalog) {
            // the WAL still holds everything, retry on the next append
            warn!(error = %err, "automatic checkpoint failed");
        }
    }
}

#[async_trait]
impl StorageEngine for DurableStorage {
    async fn create_table(&self, schema: TableSchema) -> Result<bool> {
        let mut persistence = self.persistence.lock().await;
        let created = self
            .memory
            .create_table_with(schema, |schema| {
                persistence.log(&WalEntry::CreateTable(schema.clone()))
            })
            .await?;
        self.checkpoint_if_due(&mut persistence).await;
        Ok(created)
    }

    async fn table_exists(&self, name: &str) -> bool {
        self.memory.table_exists(name).await
    }

    async fn list_tables(&self) -> Vec<String> {
        self.memory.list_tables().await
    }

    async fn get_schema(&self, table: &str) -> Result<TableSchema> {
        self.memory.get_schema(table).await
    }

    async fn get(&self, table: &str, id: i64) -> Result<Option<Row>> {
        self.memory.get(table, id).await
    }

    async fn scan(&self, table: &str, limit: usize) -> Result<Vec<Row>> {
        self.memory.scan(table, limit).await
    }

    async fn commit(&self, mutation: Mutation) -> Result<CommitOutcome> {
        let mut persistence = self.persistence.lock().await;
        let outcome = self
            .memory
            .commit_with(&mutation, || persistence.log(&WalEntry::Commit(mutation.clone())))
            .await?;
        self.checkpoint_if_due(&mut persistence).await;
        Ok(outcome)
    }

    async fn store_catalog_entry(&self, entry: CatalogEntry) -> Result<()> {
        let mut persistence = self.persistence.lock().await;
        self.memory
            .store_catalog_entry_with(entry, |entry| {
                persistence.log(&WalEntry::Catalog(entry.clone()))
            })
            .await?;
        self.checkpoint_if_due(&mut persistence).await;
        Ok(())
    }

    async fn catalog(&self) -> Result<Vec<CatalogEntry>> {
        self.memory.catalog().await
    }
}
