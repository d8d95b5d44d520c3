//! Schema inference for loosely-typed JSON documents.
//!
//! - `detector.rs` - classifies a single value into a [`TypeLabel`]
//! - `schema.rs` - the recursive [`Schema`] produced by inference
//! - `inferer.rs` - merges per-field observations across a document batch

mod detector;
mod inferer;
mod schema;

pub use detector::{TypeLabel, detect};
pub use inferer::{SchemaInferer, merge_scalar_types};
pub use schema::{FieldType, Schema, SchemaError};
