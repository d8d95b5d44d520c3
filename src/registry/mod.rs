//! Collection registry: turns inferred schemas into table definitions.
//!
//! - `naming.rs` - identifier sanitization and child table naming
//! - `definition.rs` - main and child table definitions
//! - `registry.rs` - the synchronized name -> definition map

mod definition;
mod naming;
mod registry;

pub use definition::{
    CREATED_AT_COLUMN, ChildCollectionDefinition, CollectionDefinition, ColumnDefinition,
    ID_COLUMN, PARENT_ID_COLUMN, TableEntry,
};
pub use naming::{child_table_name, sanitize_identifier};
pub use registry::{Registration, Registry, RegistryError};
