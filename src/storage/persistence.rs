//! Write-ahead log and snapshot files backing [`DurableStorage`].
//!
//! [`DurableStorage`]: super::DurableStorage

use super::catalog::CatalogEntry;
use super::engine::Mutation;
use super::memory;
use super::table::Table;
use crate::core::{DbError, Result, TableSchema};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const WAL_FILE: &str = "autorestdb.wal";
const SNAPSHOT_FILE: &str = "autorestdb.snapshot";
const SNAPSHOT_VERSION: u32 = 1;

// ============================================================================
// WAL Entry Types
// ============================================================================

/// Only state changes that succeeded are logged, so replaying them in order
/// rebuilds exactly the state that was visible before the restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WalEntry {
    CreateTable(TableSchema),
    Catalog(CatalogEntry),
    Commit(Mutation),
}

// ============================================================================
// Database Snapshot
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: u32,
    pub tables: HashMap<String, Table>,
    pub catalog: Vec<CatalogEntry>,
    pub metadata: SnapshotMetadata,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub created_at: i64,
    pub row_count: usize,
    pub table_count: usize,
}

impl DatabaseSnapshot {
    pub fn new(tables: HashMap<String, Table>, catalog: Vec<CatalogEntry>) -> Self {
        let row_count = tables.values().map(Table::row_count).sum();
        let table_count = tables.len();

        Self {
            version: SNAPSHOT_VERSION,
            tables,
            catalog,
            metadata: SnapshotMetadata {
                created_at: Utc::now().timestamp_millis(),
                row_count,
                table_count,
            },
        }
    }
}

// ============================================================================
// Durability Configuration
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync after every WAL append
    Sync,
    /// flush to the OS, no fsync
    #[default]
    Async,
    /// nothing is written to disk
    None,
}

impl DurabilityMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sync => "sync",
            Self::Async => "async",
            Self::None => "none",
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DurabilityMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sync" => Ok(Self::Sync),
            "async" => Ok(Self::Async),
            "none" => Ok(Self::None),
            other => Err(format!("unknown durability mode '{other}' (expected sync, async or none)")),
        }
    }
}

// ============================================================================
// WAL Manager
// ============================================================================

pub struct WalManager {
    wal_path: PathBuf,
    wal_file: Option<BufWriter<File>>,
    durability_mode: DurabilityMode,
    /// Length of the file up to the end of the last complete frame.
    committed_len: u64,
    entries_since_checkpoint: usize,
    checkpoint_threshold: usize,
}

impl WalManager {
    pub fn new<P: AsRef<Path>>(wal_path: P, durability_mode: DurabilityMode) -> Result<Self> {
        let wal_path = wal_path.as_ref().to_path_buf();
        if let Some(parent) = wal_path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                DbError::IoError(format!("Failed to create WAL directory: {}", e))
            })?;
        }

        let (wal_file, committed_len) = if durability_mode != DurabilityMode::None {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&wal_path)
                .map_err(|e| DbError::IoError(format!("Failed to open WAL file: {}", e)))?;
            let len = file
                .metadata()
                .map_err(|e| DbError::IoError(format!("Failed to stat WAL file: {}", e)))?
                .len();
            (Some(BufWriter::new(file)), len)
        } else {
            (None, 0)
        };

        Ok(Self {
            wal_path,
            wal_file,
            durability_mode,
            committed_len,
            entries_since_checkpoint: 0,
            checkpoint_threshold: 1000,
        })
    }

    /// Frames are a little-endian `u32` length followed by a MessagePack body.
    ///
    /// Either the whole frame is durable when this returns `Ok`, or the file
    /// is cut back to the previous frame boundary.
    pub fn append(&mut self, entry: &WalEntry) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let serialized = rmp_serde::to_vec(entry).map_err(|e| {
            DbError::ExecutionError(format!("Failed to serialize WAL entry: {}", e))
        })?;
        let len = u32::try_from(serialized.len())
            .map_err(|_| DbError::ExecutionError("WAL entry too large".to_string()))?;
        let mut frame = Vec::with_capacity(4 + serialized.len());
        frame.extend_from_slice(&len.to_le_bytes());
        frame.extend_from_slice(&serialized);

        if let Err(err) = self.write_frame(&frame) {
            self.rollback();
            return Err(err);
        }
        self.committed_len += frame.len() as u64;
        self.entries_since_checkpoint += 1;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let file = self
            .wal_file
            .as_mut()
            .ok_or_else(|| DbError::ExecutionError("WAL file not initialized".to_string()))?;
        file.write_all(frame)
            .map_err(|e| DbError::IoError(format!("Failed to write WAL: {}", e)))?;
        file.flush()
            .map_err(|e| DbError::IoError(format!("Failed to flush WAL: {}", e)))?;
        if self.durability_mode == DurabilityMode::Sync {
            file.get_mut()
                .sync_all()
                .map_err(|e| DbError::IoError(format!("Failed to sync WAL: {}", e)))?;
        }
        Ok(())
    }

    /// Drops whatever part of a failed frame reached the file and reopens the
    /// writer. If that fails too, the WAL stays closed and later appends fail.
    fn rollback(&mut self) {
        // dropping the writer may still flush buffered bytes, so cut afterwards
        self.wal_file = None;
        let reopened = OpenOptions::new()
            .write(true)
            .open(&self.wal_path)
            .and_then(|file| file.set_len(self.committed_len))
            .and_then(|()| OpenOptions::new().append(true).open(&self.wal_path));
        match reopened {
            Ok(file) => self.wal_file = Some(BufWriter::new(file)),
            Err(err) => {
                warn!(path = %self.wal_path.display(), error = %err, "failed to roll back WAL append");
            }
        }
    }

    /// Swaps the writer for a read-only handle so the next append fails.
    #[cfg(test)]
    pub(crate) fn break_writer(&mut self) {
        if let Ok(file) = File::open(&self.wal_path) {
            self.wal_file = Some(BufWriter::new(file));
        }
    }

    /// Reads every complete frame. A torn frame at the end of the file (a crash
    /// in the middle of an append) is dropped with a warning.
    pub fn read_all(&self) -> Result<Vec<WalEntry>> {
        if !self.wal_path.exists() {
            return Ok(Vec::new());
        }
        let file = File::open(&self.wal_path)
            .map_err(|e| DbError::IoError(format!("Failed to open WAL for reading: {}", e)))?;
        let mut reader = BufReader::new(file);
        let mut entries = Vec::new();
        loop {
            let mut len_bytes = [0u8; 4];
            match reader.read_exact(&mut len_bytes) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(e) => {
                    return Err(DbError::IoError(format!(
                        "Failed to read WAL entry length: {}",
                        e
                    )));
                }
            }
            let len = u32::from_le_bytes(len_bytes) as usize;
            let mut data = vec![0u8; len];
            if let Err(e) = reader.read_exact(&mut data) {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    warn!(path = %self.wal_path.display(), "dropping truncated WAL frame");
                    break;
                }
                return Err(DbError::IoError(format!("Failed to read WAL entry data: {}", e)));
            }
            let entry: WalEntry = rmp_serde::from_slice(&data).map_err(|e| {
                DbError::ExecutionError(format!("Failed to deserialize WAL entry: {}", e))
            })?;
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn clear(&mut self) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        self.wal_file = None;
        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.wal_path)
            .map_err(|e| DbError::IoError(format!("Failed to truncate WAL: {}", e)))?;
        self.wal_file = Some(BufWriter::new(file));
        self.committed_len = 0;
        self.entries_since_checkpoint = 0;
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.checkpoint_threshold > 0 && self.entries_since_checkpoint >= self.checkpoint_threshold
    }

    pub fn entries_since_checkpoint(&self) -> usize {
        self.entries_since_checkpoint
    }

    /// `0` disables automatic checkpoints.
    pub fn set_checkpoint_threshold(&mut self, threshold: usize) {
        self.checkpoint_threshold = threshold;
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
        }
    }

    /// Writes to a temporary file in the same directory and renames it over
    /// the old snapshot, so a crash never leaves a half-written snapshot.
    pub fn save(&self, snapshot: &DatabaseSnapshot) -> Result<()> {
        let dir = match self.snapshot_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(|e| {
            DbError::IoError(format!("Failed to create snapshot directory: {}", e))
        })?;

        let serialized = rmp_serde::to_vec(snapshot).map_err(|e| {
            DbError::ExecutionError(format!("Failed to serialize snapshot: {}", e))
        })?;
        let temp = NamedTempFile::new_in(&dir)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            writer
                .write_all(&serialized)
                .map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
            writer
                .flush()
                .map_err(|e| DbError::IoError(format!("Failed to flush snapshot: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to rename snapshot: {}", e)))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<DatabaseSnapshot>> {
        if !self.snapshot_path.exists() {
            return Ok(None);
        }
        let mut file = File::open(&self.snapshot_path)
            .map_err(|e| DbError::IoError(format!("Failed to open snapshot: {}", e)))?;
        let mut data = Vec::new();
        file.read_to_end(&mut data)
            .map_err(|e| DbError::IoError(format!("Failed to read snapshot: {}", e)))?;
        let snapshot: DatabaseSnapshot = rmp_serde::from_slice(&data).map_err(|e| {
            DbError::ExecutionError(format!("Failed to deserialize snapshot: {}", e))
        })?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(DbError::ExecutionError(format!(
                "Unsupported snapshot version {}",
                snapshot.version
            )));
        }
        Ok(Some(snapshot))
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }
}

// ============================================================================
// Persistence Manager
// ============================================================================

/// State rebuilt from the snapshot plus the WAL tail.
#[derive(Debug, Default)]
pub struct RecoveredState {
    pub tables: HashMap<String, Table>,
    pub catalog: Vec<CatalogEntry>,
}

pub struct PersistenceManager {
    wal: WalManager,
    snapshot: SnapshotManager,
    durability_mode: DurabilityMode,
}

impl PersistenceManager {
    pub fn new<P: AsRef<Path>>(data_dir: P, durability_mode: DurabilityMode) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let wal = WalManager::new(data_dir.join(WAL_FILE), durability_mode)?;
        let snapshot = SnapshotManager::new(data_dir.join(SNAPSHOT_FILE));
        Ok(Self {
            wal,
            snapshot,
            durability_mode,
        })
    }

    pub fn log(&mut self, entry: &WalEntry) -> Result<()> {
        self.wal.append(entry)
    }

    pub fn checkpoint(
        &mut self,
        tables: HashMap<String, Table>,
        catalog: Vec<CatalogEntry>,
    ) -> Result<()> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(());
        }
        let snapshot = DatabaseSnapshot::new(tables, catalog);
        self.snapshot.save(&snapshot)?;
        self.wal.clear()?;
        info!(
            tables = snapshot.metadata.table_count,
            rows = snapshot.metadata.row_count,
            "checkpoint written"
        );
        Ok(())
    }

    pub fn needs_checkpoint(&self) -> bool {
        self.wal.needs_checkpoint()
    }

    pub fn recover(&self) -> Result<Option<RecoveredState>> {
        if self.durability_mode == DurabilityMode::None {
            return Ok(None);
        }

        let mut state = match self.snapshot.load()? {
            Some(snapshot) => RecoveredState {
                tables: snapshot.tables,
                catalog: snapshot.catalog,
            },
            None => RecoveredState::default(),
        };

        let wal_entries = self.wal.read_all()?;
        if state.tables.is_empty() && state.catalog.is_empty() && wal_entries.is_empty() {
            return Ok(None);
        }

        debug!(entries = wal_entries.len(), "replaying WAL");
        for entry in wal_entries {
            match entry {
                WalEntry::CreateTable(schema) => {
                    let name = schema.name().to_string();
                    state.tables.entry(name).or_insert_with(|| Table::new(schema));
                }
                WalEntry::Catalog(entry) => {
                    if !state.catalog.iter().any(|e| e.collection == entry.collection) {
                        state.catalog.push(entry);
                    }
                }
                WalEntry::Commit(mutation) => {
                    memory::replay(&mut state.tables, &mutation)?;
                }
            }
        }
        Ok(Some(state))
    }

    pub fn wal(&self) -> &WalManager {
        &self.wal
    }

    pub fn wal_mut(&mut self) -> &mut WalManager {
        &mut self.wal
    }
}
