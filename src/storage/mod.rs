pub mod catalog;
pub mod durable;
pub mod engine;
pub mod memory;
pub mod persistence;
pub mod table;

pub use catalog::{Catalog, CatalogEntry};
pub use durable::DurableStorage;
pub use engine::{ChildInsert, CommitOutcome, Mutation, RowValues, StorageEngine};
pub use memory::InMemoryStorage;
pub use persistence::DurabilityMode;
pub use table::Table;
