pub mod error;
pub mod types;
pub mod value;

pub use error::{DbError, Result};
pub use types::{Column, ColumnType, ForeignKey, Row, TableSchema};
pub use value::Value;
