//! Shared helpers for the sqlguard-sqlite integration tests.

#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};

use sqlguard_core::lowering::{lower_delete, lower_insert, lower_update};
use sqlguard_core::{
    ConflictAlgorithm, ContentValues, Cursor, Database, Query, Result, Statement, Value,
};
use sqlguard_sqlite::SqliteDatabase;

/// Raw database that records every SQL text it is asked to run.
#[derive(Clone)]
pub struct RecordingDatabase {
    inner: SqliteDatabase,
    texts: Arc<Mutex<Vec<String>>>,
}

impl RecordingDatabase {
    pub fn in_memory() -> Self {
        Self::wrap(SqliteDatabase::open_in_memory().unwrap())
    }

    pub fn wrap(inner: SqliteDatabase) -> Self {
        Self {
            inner,
            texts: Arc::default(),
        }
    }

    /// Every text seen so far, in order.
    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.texts.lock().unwrap().clear();
    }

    fn record(&self, sql: &str) {
        self.texts.lock().unwrap().push(sql.to_string());
    }
}

impl Database for RecordingDatabase {
    fn exec_sql(&self, sql: &str) -> Result<()> {
        self.record(sql);
        self.inner.exec_sql(sql)
    }

    fn exec_sql_with_args(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.record(sql);
        self.inner.exec_sql_with_args(sql, args)
    }

    fn query(&self, sql: &str) -> Result<Cursor> {
        self.record(sql);
        self.inner.query(sql)
    }

    fn query_with_args(&self, sql: &str, args: &[Value]) -> Result<Cursor> {
        self.record(sql);
        self.inner.query_with_args(sql, args)
    }

    fn query_object(&self, query: &dyn Query) -> Result<Cursor> {
        self.record(&query.sql());
        self.inner.query_object(query)
    }

    fn insert(&self, table: &str, conflict: ConflictAlgorithm, values: &ContentValues) -> Result<i64> {
        self.record(&lower_insert(table, conflict, values).sql);
        self.inner.insert(table, conflict, values)
    }

    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        self.record(&lower_update(table, conflict, values, where_clause, where_args)?.sql);
        self.inner.update(table, conflict, values, where_clause, where_args)
    }

    fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value]) -> Result<usize> {
        self.record(&lower_delete(table, where_clause, where_args).sql);
        self.inner.delete(table, where_clause, where_args)
    }

    fn exec_per_connection_sql(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.record(sql);
        self.inner.exec_per_connection_sql(sql, args)
    }

    fn compile_statement(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        self.record(sql);
        self.inner.compile_statement(sql)
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

/// Splits a rewritten text into the SQL as given and its marker.
pub fn split_marker(text: &str) -> (&str, &str) {
    text.rsplit_once(" -- ")
        .unwrap_or_else(|| panic!("no marker in {text:?}"))
}

/// Asserts `marker` is a hyphenated UUID.
pub fn assert_uuid(marker: &str) {
    assert_eq!(marker.len(), 36, "marker {marker:?}");
    assert_eq!(marker.matches('-').count(), 4, "marker {marker:?}");
}

/// Single column of every row, as text.
pub fn column(cursor: &Cursor, name: &str) -> Vec<Option<String>> {
    (0..cursor.len())
        .map(|row| {
            cursor
                .get(row, name)
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect()
}
