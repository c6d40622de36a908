//! The seam between the engine and the relational store.
//!
//! Everything the reconciliation engine does — catalog reads, DDL, the
//! transaction statements themselves — goes through [`Session`]. The trait is
//! object-safe and string-shaped: catalog queries cast every projected column
//! to `text`, so rows come back as `Vec<Option<String>>` and a test can
//! script a whole reconciliation run without a server.

use std::future::Future;
use std::pin::Pin;

use crate::error::SqlError;

/// Boxed future returned by [`Session`] methods.
pub type SqlFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, SqlError>> + Send + 'a>>;

/// A live database session capable of executing SQL and controlling the
/// surrounding transaction (`BEGIN` / `SAVEPOINT` / `COMMIT` are issued
/// through [`Session::execute`] like any other statement).
pub trait Session: Send + Sync {
    /// Execute a statement, returning the number of rows affected.
    fn execute<'a>(&'a self, sql: &'a str) -> SqlFuture<'a, u64>;

    /// Run a query with text parameters, returning rows of text columns.
    fn query<'a>(
        &'a self,
        sql: &'a str,
        params: &'a [&'a str],
    ) -> SqlFuture<'a, Vec<Vec<Option<String>>>>;

    /// Run a query returning a single `bigint` (row counts, capability
    /// probes).
    fn query_i64<'a>(&'a self, sql: &'a str, params: &'a [&'a str]) -> SqlFuture<'a, i64>;
}
