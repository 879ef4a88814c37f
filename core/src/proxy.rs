//! Connection proxy that keeps the engine's statement cache from ever
//! producing a hit.
//!
//! [`CacheControlledDatabase`] implements [`Database`] over a raw
//! connection. Every entry point that carries SQL rewrites it with a fresh
//! marker before delegating, so the engine never sees the same text twice
//! and can never hand back a plan compiled before a backup restore or a
//! corruption recovery replaced the database underneath it. The one
//! deliberate exception is [`CacheControlledQuery`], which keeps its text
//! stable across repeated reads within one logical execution.
//!
//! Structured insert, update, and delete are lowered to text here, compiled
//! as a [`DeferredStatement`] against the raw connection, and executed with
//! the lowered arguments, so they follow the same path as any other
//! compiled statement.
//!
//! # Examples
//!
//! ```ignore
//! let db = CacheControlledDatabase::new(raw);
//! db.exec_sql("DELETE FROM update_check")?; // engine sees "DELETE FROM update_check -- <marker>"
//! ```

use std::path::Path;

use tracing::{Span, debug_span, trace};

use crate::cursor::Cursor;
use crate::database::Database;
use crate::deferred::DeferredStatement;
use crate::error::Result;
use crate::lowering::{LoweredStatement, lower_delete, lower_insert, lower_update};
use crate::query::CacheControlledQuery;
use crate::rewrite::{checked_where_clause, rewrite};
use crate::statement::{Query, SimpleQuery, Statement};
use crate::value::{ConflictAlgorithm, ContentValues, Value};

/// [`Database`] proxy that rewrites every statement before it reaches the
/// wrapped connection.
#[derive(Debug)]
pub struct CacheControlledDatabase<D> {
    inner: D,
    span: Span,
}

impl<D: Database> CacheControlledDatabase<D> {
    /// Wraps the raw connection `inner`.
    pub fn new(inner: D) -> Self {
        Self::with_span(inner, debug_span!("cache_control"))
    }

    /// Wraps `inner`, logging under `span`.
    pub fn with_span(inner: D, span: Span) -> Self {
        Self { inner, span }
    }

    /// The raw connection.
    pub fn inner(&self) -> &D {
        &self.inner
    }

    /// Unwraps the raw connection.
    pub fn into_inner(self) -> D {
        self.inner
    }

    fn rewrite(&self, sql: &str) -> String {
        let rewritten = rewrite(sql);
        trace!(parent: &self.span, sql = %rewritten, "Rewrote statement");
        rewritten
    }

    fn deferred(&self, sql: impl Into<String>) -> DeferredStatement<'_, D> {
        DeferredStatement::with_span(sql, &self.inner, self.span.clone())
    }

    fn compile_lowered(&self, lowered: LoweredStatement) -> Result<DeferredStatement<'_, D>> {
        let mut statement = self.deferred(lowered.sql);
        SimpleQuery::bind(&mut statement, &lowered.bind_args)?;
        Ok(statement)
    }
}

impl<D: Database> Database for CacheControlledDatabase<D> {
    fn exec_sql(&self, sql: &str) -> Result<()> {
        self.inner.exec_sql(&self.rewrite(sql))
    }

    fn exec_sql_with_args(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.inner.exec_sql_with_args(&self.rewrite(sql), args)
    }

    fn query(&self, sql: &str) -> Result<Cursor> {
        self.inner.query(&self.rewrite(sql))
    }

    fn query_with_args(&self, sql: &str, args: &[Value]) -> Result<Cursor> {
        self.inner.query_with_args(&self.rewrite(sql), args)
    }

    fn query_object(&self, query: &dyn Query) -> Result<Cursor> {
        self.inner.query_object(&CacheControlledQuery::new(query))
    }

    fn insert(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
    ) -> Result<i64> {
        let mut statement = self.compile_lowered(lower_insert(table, conflict, values))?;
        statement.execute_insert()
    }

    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        let where_clause = checked_where_clause(where_clause)?;
        let lowered = lower_update(table, conflict, values, Some(where_clause), where_args)?;
        self.compile_lowered(lowered)?.execute_update_delete()
    }

    fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value]) -> Result<usize> {
        let where_clause = checked_where_clause(where_clause)?;
        let lowered = lower_delete(table, Some(where_clause), where_args);
        self.compile_lowered(lowered)?.execute_update_delete()
    }

    fn exec_per_connection_sql(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.inner.exec_per_connection_sql(&self.rewrite(sql), args)
    }

    fn compile_statement(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        Ok(Box::new(self.deferred(sql)))
    }

    fn begin_transaction(&self) -> Result<()> {
        self.inner.begin_transaction()
    }

    fn set_transaction_successful(&self) -> Result<()> {
        self.inner.set_transaction_successful()
    }

    fn end_transaction(&self) -> Result<()> {
        self.inner.end_transaction()
    }

    fn in_transaction(&self) -> bool {
        self.inner.in_transaction()
    }

    fn version(&self) -> Result<i32> {
        self.inner.version()
    }

    fn set_version(&self, version: i32) -> Result<()> {
        self.inner.set_version(version)
    }

    fn set_foreign_key_constraints_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.set_foreign_key_constraints_enabled(enabled)
    }

    fn path(&self) -> Option<&Path> {
        self.inner.path()
    }

    fn is_open(&self) -> bool {
        self.inner.is_open()
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
    }
}
