//! Core types and consumed capabilities for the querel query layer.
//!
//! This crate provides the foundation the relation/prefetch machinery in
//! `querel-query` is built on:
//!
//! - `Value` and `Row` for statement arguments and results
//! - `Connection` trait for statement execution
//! - `SchemaInfo` trait for schema introspection lookups
//! - `Outcome` re-export from asupersync for cancel-correct operations
//! - `Cx` context for structured concurrency

// Re-export asupersync primitives for structured concurrency
pub use asupersync::{Cx, Outcome};

pub mod connection;
pub mod error;
pub mod row;
pub mod schema;
pub mod value;

pub use connection::Connection;
pub use error::{Error, QueryError, Result, SchemaError, SchemaErrorKind, TypeError};
pub use row::{ColumnInfo, Row};
pub use schema::{ForeignKeyInfo, SchemaInfo, StaticSchema};
pub use value::{FromValue, Value};
