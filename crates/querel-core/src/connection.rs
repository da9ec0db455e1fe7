//! Statement execution capability.
//!
//! The query layer never owns a connection; it consumes this trait. An
//! implementation executes SQL text with bound arguments and returns rows
//! (SELECT) or an affected-row count (UPDATE/DELETE). Transactions,
//! pooling, and interruption belong to the implementation, not here.
//!
//! All operations are async and take a `Cx` context for cancellation and
//! timeout handling via asupersync's structured concurrency.

use asupersync::{Cx, Outcome};

use crate::error::Error;
use crate::row::Row;
use crate::value::Value;

/// A database connection capable of executing statements.
///
/// # Example
///
/// ```rust,ignore
/// let rows = conn.query(&cx, "SELECT * FROM teams WHERE id = $1", &[Value::BigInt(1)]).await?;
/// ```
pub trait Connection: Send + Sync {
    /// Execute a query and return all rows.
    fn query(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Vec<Row>, Error>> + Send;

    /// Execute a query and return the first row, if any.
    fn query_one(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<Option<Row>, Error>> + Send;

    /// Execute a statement (UPDATE, DELETE) and return rows affected.
    fn execute(
        &self,
        cx: &Cx,
        sql: &str,
        params: &[Value],
    ) -> impl Future<Output = Outcome<u64, Error>> + Send;
}
