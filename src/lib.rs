//! # autorestdb
//!
//! A document store that infers a relational schema from sample JSON
//! documents, provisions typed tables for it at runtime and serves generic
//! CRUD over them.
//!
//! ```text
//! documents -> inference::SchemaInferer -> Schema
//!           -> registry::Registry       -> CollectionDefinition (+ child tables)
//!           -> repository::Repository   -> storage::StorageEngine
//! ```
//!
//! The [`web`] module exposes all of it over HTTP behind a
//! [`security::SecurityGate`].

pub mod app;
pub mod config;
pub mod core;
pub mod inference;
pub mod registry;
pub mod repository;
pub mod security;
pub mod storage;
pub mod web;

pub use app::{Bootstrap, BootstrapError, bootstrap, init_tracing, shutdown_signal};
pub use config::AppConfig;
pub use inference::{Schema, SchemaInferer, TypeLabel};
pub use registry::Registry;
pub use repository::{Record, Repository, RepositoryError};
pub use storage::{DurabilityMode, DurableStorage, InMemoryStorage, StorageEngine};
