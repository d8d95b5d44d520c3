use crate::inference::Schema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A collection as it was first registered: the sanitized collection name and
/// the schema its definition was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub collection: String,
    pub schema: Schema,
}

/// Registered collections kept next to the table data, so definitions can be
/// re-derived after a restart.
///
/// Immutable once built; `with_entry` returns a new catalog and the old one
/// stays valid for readers holding a clone.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Arc<BTreeMap<String, CatalogEntry>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first entry for a collection wins; later ones are ignored.
    pub fn with_entry(self, entry: CatalogEntry) -> Self {
        if self.entries.contains_key(&entry.collection) {
            return self;
        }
        let mut entries = (*self.entries).clone();
        entries.insert(entry.collection.clone(), entry);
        Self {
            entries: Arc::new(entries),
        }
    }

    pub fn get(&self, collection: &str) -> Option<&CatalogEntry> {
        self.entries.get(collection)
    }

    pub fn contains(&self, collection: &str) -> bool {
        self.entries.contains_key(collection)
    }

    /// Entries sorted by collection name.
    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.entries.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<CatalogEntry> for Catalog {
    fn from_iter<I: IntoIterator<Item = CatalogEntry>>(iter: I) -> Self {
        iter.into_iter().fold(Catalog::new(), Catalog::with_entry)
    }
}
