use super::definition::{CollectionDefinition, TableEntry};
use super::naming::{lookup_keys, sanitize_identifier};
use crate::inference::Schema;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Invalid name '{0}': nothing left after sanitization")]
    InvalidName(String),

    #[error("Registry lock poisoned: {0}")]
    LockError(String),
}

impl<T> From<std::sync::PoisonError<T>> for RegistryError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}

/// Outcome of [`Registry::register`].
#[derive(Debug, Clone)]
pub struct Registration {
    pub definition: Arc<CollectionDefinition>,
    /// `false` when the name was already registered and the existing
    /// definition was returned untouched.
    pub created: bool,
}

#[derive(Default)]
struct RegistryState {
    collections: HashMap<String, Arc<CollectionDefinition>>,
    tables: HashMap<String, TableEntry>,
}

/// Collection name -> definitions, shared between requests.
///
/// Definitions are immutable once registered: registering a known name again
/// returns the first definition and ignores the new schema.
#[derive(Default)]
pub struct Registry {
    state: RwLock<RegistryState>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, name: &str, schema: &Schema) -> Result<Registration, RegistryError> {
        let table_name = sanitize_identifier(name)?;

        if let Some(existing) = self.state.read()?.collections.get(&table_name) {
            debug!(collection = %table_name, "collection already registered");
            return Ok(Registration {
                definition: existing.clone(),
                created: false,
            });
        }

        self.publish(CollectionDefinition::derive(table_name, schema)?)
    }

    /// Makes an already derived definition visible. If a definition with the
    /// same table name won in the meantime, that one is returned instead.
    pub fn publish(&self, definition: CollectionDefinition) -> Result<Registration, RegistryError> {
        let table_name = definition.table_name.clone();
        let mut state = self.state.write()?;
        if let Some(existing) = state.collections.get(&table_name) {
            debug!(collection = %table_name, "collection registered concurrently");
            return Ok(Registration {
                definition: existing.clone(),
                created: false,
            });
        }

        let derived = Arc::new(definition);
        state
            .tables
            .insert(table_name.clone(), TableEntry::Main(derived.clone()));
        for child in &derived.children {
            state
                .tables
                .insert(child.table_name.clone(), TableEntry::Child(child.clone()));
        }
        state.collections.insert(table_name.clone(), derived.clone());

        info!(
            collection = %table_name,
            columns = derived.columns.len(),
            children = derived.children.len(),
            "registered collection"
        );

        Ok(Registration {
            definition: derived,
            created: true,
        })
    }

    /// Main collection definition by caller-supplied name.
    pub fn collection(&self, name: &str) -> Result<Option<Arc<CollectionDefinition>>, RegistryError> {
        let state = self.state.read()?;
        Ok(lookup_keys(name)
            .iter()
            .find_map(|key| state.collections.get(key).cloned()))
    }

    /// Any registered table, main or child, by caller-supplied name.
    pub fn table(&self, name: &str) -> Result<Option<TableEntry>, RegistryError> {
        let state = self.state.read()?;
        Ok(lookup_keys(name)
            .iter()
            .find_map(|key| state.tables.get(key).cloned()))
    }

    pub fn contains(&self, name: &str) -> Result<bool, RegistryError> {
        Ok(self.table(name)?.is_some())
    }

    /// All main collections, sorted by table name.
    pub fn collections(&self) -> Result<Vec<Arc<CollectionDefinition>>, RegistryError> {
        let state = self.state.read()?;
        let mut collections: Vec<_> = state.collections.values().cloned().collect();
        collections.sort_by(|a, b| a.table_name.cmp(&b.table_name));
        Ok(collections)
    }
}
