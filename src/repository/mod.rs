//! Generic CRUD over registered collections.
//!
//! Callers address a collection (or one of its child tables) by name and
//! exchange plain JSON objects; this layer maps them onto the typed rows of the
//! storage engine.

pub mod codec;
pub mod repository;

pub use codec::{Record, coerce_value, row_to_record};
pub use repository::{Repository, RepositoryError};
