//! The connection contract implemented by the raw engine and by the
//! cache-controlled proxy.

use std::path::Path;

use crate::cursor::Cursor;
use crate::error::Result;
use crate::statement::{Query, Statement};
use crate::value::{ConflictAlgorithm, ContentValues, Value};

/// A database connection.
///
/// The trait is object safe: lifecycle callbacks and migration steps
/// receive a `&dyn Database`.
pub trait Database: Send + Sync {
    /// Executes a single statement that returns no data.
    fn exec_sql(&self, sql: &str) -> Result<()>;

    /// Executes a single statement with positional arguments.
    fn exec_sql_with_args(&self, sql: &str, args: &[Value]) -> Result<()>;

    /// Runs a query without arguments.
    fn query(&self, sql: &str) -> Result<Cursor>;

    /// Runs a query with positional arguments.
    fn query_with_args(&self, sql: &str, args: &[Value]) -> Result<Cursor>;

    /// Runs a structured query object.
    fn query_object(&self, query: &dyn Query) -> Result<Cursor>;

    /// Inserts a row and returns its row id, or `-1` if nothing was inserted.
    fn insert(&self, table: &str, conflict: ConflictAlgorithm, values: &ContentValues)
    -> Result<i64>;

    /// Updates rows matching `where_clause` and returns the number changed.
    ///
    /// `None` updates every row.
    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize>;

    /// Deletes rows matching `where_clause` and returns the number removed.
    ///
    /// `None` deletes every row.
    fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value])
    -> Result<usize>;

    /// Executes a statement that configures the connection itself.
    fn exec_per_connection_sql(&self, sql: &str, args: &[Value]) -> Result<()>;

    /// Compiles `sql` into a reusable statement.
    fn compile_statement(&self, sql: &str) -> Result<Box<dyn Statement + '_>>;

    /// Begins a (possibly nested) transaction.
    fn begin_transaction(&self) -> Result<()>;

    /// Marks the innermost transaction as successful.
    fn set_transaction_successful(&self) -> Result<()>;

    /// Ends the innermost transaction. The outermost end commits only if
    /// every level was marked successful.
    fn end_transaction(&self) -> Result<()>;

    /// Returns `true` while a transaction is open.
    fn in_transaction(&self) -> bool;

    /// The schema version stored in the database.
    fn version(&self) -> Result<i32>;

    /// Stores a new schema version.
    fn set_version(&self, version: i32) -> Result<()>;

    /// Turns foreign key enforcement on or off.
    fn set_foreign_key_constraints_enabled(&self, enabled: bool) -> Result<()>;

    /// Location of the database file, `None` for in-memory databases.
    fn path(&self) -> Option<&Path>;

    /// Returns `true` until [`close`](Database::close) is called.
    fn is_open(&self) -> bool;

    /// Closes the connection.
    fn close(&self) -> Result<()>;
}

/// Runs `f` inside a transaction on `db`.
///
/// The transaction is marked successful only when `f` returns `Ok`; it is
/// ended on both paths. A failure from `f` takes precedence over a failure
/// to end the transaction.
pub fn run_in_transaction<T>(db: &dyn Database, f: impl FnOnce() -> Result<T>) -> Result<T> {
    db.begin_transaction()?;
    let result = f().and_then(|value| {
        db.set_transaction_successful()?;
        Ok(value)
    });
    let ended = db.end_transaction();
    let value = result?;
    ended?;
    Ok(value)
}
