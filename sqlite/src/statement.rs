//! Statement execution over a rusqlite connection.
//!
//! Every execution goes through `Connection::prepare_cached`, so identical
//! SQL text reuses one compiled plan. This is the cache the proxy layer in
//! `sqlguard-core` defeats by never repeating a text.

use std::collections::BTreeMap;

use rusqlite::Connection;
use rusqlite::types::{Value as SqlValue, ValueRef};
use sqlguard_core::{Cursor, Error, Program, Result, Statement, Value};

use crate::database::SqliteDatabase;

/// Positional bind arguments, keyed by 1-based index.
#[derive(Debug, Clone, Default)]
pub(crate) struct BindArgs(BTreeMap<usize, Value>);

impl BindArgs {
    pub(crate) fn from_slice(args: &[Value]) -> Self {
        Self(
            args.iter()
                .enumerate()
                .map(|(i, value)| (i + 1, value.clone()))
                .collect(),
        )
    }

    fn set(&mut self, index: usize, value: Value) -> Result<()> {
        if index == 0 {
            return Err(Error::engine(rusqlite::Error::InvalidParameterCount(0, 0)));
        }
        self.0.insert(index, value);
        Ok(())
    }
}

impl Program for BindArgs {
    fn bind_null(&mut self, index: usize) -> Result<()> {
        self.set(index, Value::Null)
    }

    fn bind_long(&mut self, index: usize, value: i64) -> Result<()> {
        self.set(index, Value::Integer(value))
    }

    fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.set(index, Value::Real(value))
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
        self.set(index, Value::Blob(value.to_vec()))
    }

    fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.set(index, Value::Text(value.to_string()))
    }

    fn clear_bindings(&mut self) -> Result<()> {
        self.0.clear();
        Ok(())
    }
}

fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(v) => SqlValue::Integer(*v),
        Value::Real(v) => SqlValue::Real(*v),
        Value::Text(v) => SqlValue::Text(v.clone()),
        Value::Blob(v) => SqlValue::Blob(v.clone()),
    }
}

fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(v) => Value::Integer(v),
        ValueRef::Real(v) => Value::Real(v),
        ValueRef::Text(v) => Value::Text(String::from_utf8_lossy(v).into_owned()),
        ValueRef::Blob(v) => Value::Blob(v.to_vec()),
    }
}

fn bind(statement: &mut rusqlite::Statement<'_>, args: &BindArgs) -> rusqlite::Result<()> {
    for (index, value) in &args.0 {
        statement.raw_bind_parameter(*index, to_sql(value))?;
    }
    Ok(())
}

/// Runs `sql` to completion, discarding any rows it produces.
pub(crate) fn run(conn: &Connection, sql: &str, args: &BindArgs) -> rusqlite::Result<()> {
    let mut statement = conn.prepare_cached(sql)?;
    bind(&mut statement, args)?;
    let mut rows = statement.raw_query();
    while rows.next()?.is_some() {}
    Ok(())
}

/// Runs a data-changing statement and returns the number of rows changed.
pub(crate) fn run_for_changes(conn: &Connection, sql: &str, args: &BindArgs) -> rusqlite::Result<usize> {
    let mut statement = conn.prepare_cached(sql)?;
    bind(&mut statement, args)?;
    statement.raw_execute()
}

/// Runs an insert and returns the new row id, or -1 if no row was inserted.
pub(crate) fn run_for_insert(conn: &Connection, sql: &str, args: &BindArgs) -> rusqlite::Result<i64> {
    let changed = run_for_changes(conn, sql, args)?;
    Ok(if changed > 0 { conn.last_insert_rowid() } else { -1 })
}

/// Runs a query and materializes every row.
pub(crate) fn query_rows(conn: &Connection, sql: &str, args: &BindArgs) -> rusqlite::Result<Cursor> {
    let mut statement = conn.prepare_cached(sql)?;
    let columns: Vec<String> = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect();
    bind(&mut statement, args)?;

    let mut rows = statement.raw_query();
    let mut materialized = Vec::new();
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(columns.len());
        for index in 0..columns.len() {
            values.push(from_sql(row.get_ref(index)?));
        }
        materialized.push(values);
    }
    Ok(Cursor::new(columns, materialized))
}

/// First column of the first row, or `None` if the query returned no rows.
fn query_first(conn: &Connection, sql: &str, args: &BindArgs) -> rusqlite::Result<Option<Value>> {
    let mut statement = conn.prepare_cached(sql)?;
    bind(&mut statement, args)?;
    let mut rows = statement.raw_query();
    match rows.next()? {
        Some(row) => Ok(Some(from_sql(row.get_ref(0)?))),
        None => Ok(None),
    }
}

// Follows SQLite's own column coercions for scalar reads: text converts
// through its longest numeric prefix, truncated toward zero.
fn coerce_i64(value: &Value) -> i64 {
    match value {
        Value::Null | Value::Blob(_) => 0,
        Value::Integer(v) => *v,
        Value::Real(v) => *v as i64,
        Value::Text(v) => {
            let prefix = numeric_prefix(v);
            prefix
                .parse::<i64>()
                .unwrap_or_else(|_| prefix.parse::<f64>().map_or(0, |v| v as i64))
        }
    }
}

/// Longest leading `[+-]digits[.digits][e[+-]digits]` of `text`, after
/// leading whitespace.
fn numeric_prefix(text: &str) -> &str {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let digits = |from: usize| bytes[from..].iter().take_while(|b| b.is_ascii_digit()).count();

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    end += digits(end);
    if bytes.get(end) == Some(&b'.') {
        end += 1 + digits(end + 1);
    }
    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let mut exponent = end + 1;
        if matches!(bytes.get(exponent), Some(b'+' | b'-')) {
            exponent += 1;
        }
        let count = digits(exponent);
        if count > 0 {
            end = exponent + count;
        }
    }
    &text[..end]
}

fn coerce_text(value: Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Integer(v) => Some(v.to_string()),
        Value::Real(v) => Some(v.to_string()),
        Value::Text(v) => Some(v),
        Value::Blob(v) => Some(String::from_utf8_lossy(&v).into_owned()),
    }
}

/// Reusable statement over a [`SqliteDatabase`].
///
/// The SQL was validated when the statement was compiled. Bindings are
/// held here and applied to the engine's cached plan on every execution.
pub struct SqliteStatement<'db> {
    db: &'db SqliteDatabase,
    sql: String,
    args: BindArgs,
}

impl<'db> SqliteStatement<'db> {
    pub(crate) fn new(db: &'db SqliteDatabase, sql: impl Into<String>) -> Self {
        Self {
            db,
            sql: sql.into(),
            args: BindArgs::default(),
        }
    }

    /// SQL text this statement executes.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    fn scalar(&self) -> Result<Value> {
        self.db
            .with_connection(|conn| query_first(conn, &self.sql, &self.args))?
            .ok_or(Error::NoRows)
    }
}

impl Program for SqliteStatement<'_> {
    fn bind_null(&mut self, index: usize) -> Result<()> {
        self.args.bind_null(index)
    }

    fn bind_long(&mut self, index: usize, value: i64) -> Result<()> {
        self.args.bind_long(index, value)
    }

    fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.args.bind_double(index, value)
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
        self.args.bind_blob(index, value)
    }

    fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.args.bind_string(index, value)
    }

    fn clear_bindings(&mut self) -> Result<()> {
        self.args.clear_bindings()
    }
}

impl Statement for SqliteStatement<'_> {
    fn execute(&mut self) -> Result<()> {
        self.db.with_connection(|conn| run(conn, &self.sql, &self.args))
    }

    fn execute_insert(&mut self) -> Result<i64> {
        self.db
            .with_connection(|conn| run_for_insert(conn, &self.sql, &self.args))
    }

    fn execute_update_delete(&mut self) -> Result<usize> {
        self.db
            .with_connection(|conn| run_for_changes(conn, &self.sql, &self.args))
    }

    fn query_scalar_i64(&mut self) -> Result<i64> {
        self.scalar().map(|value| coerce_i64(&value))
    }

    fn query_scalar_text(&mut self) -> Result<Option<String>> {
        self.scalar().map(coerce_text)
    }

    fn close(&mut self) -> Result<()> {
        self.args.clear_bindings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlguard_core::Database;

    fn db() -> SqliteDatabase {
        let db = SqliteDatabase::open_in_memory().unwrap();
        db.exec_sql("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();
        db
    }

    #[test]
    fn test_bindings_are_kept_across_executions() {
        let db = db();
        let mut statement = db
            .compile_statement("INSERT INTO t (name, score) VALUES (?, ?)")
            .unwrap();
        statement.bind_string(1, "a").unwrap();
        statement.bind_double(2, 1.5).unwrap();
        assert_eq!(statement.execute_insert().unwrap(), 1);
        assert_eq!(statement.execute_insert().unwrap(), 2);

        let cursor = db.query("SELECT name, score FROM t ORDER BY id").unwrap();
        assert_eq!(cursor.len(), 2);
        assert_eq!(cursor.get(1, "score"), Some(&Value::Real(1.5)));
    }

    #[test]
    fn test_insert_ignored_returns_minus_one() {
        let db = db();
        db.exec_sql("INSERT INTO t (id, name) VALUES (1, 'x')").unwrap();
        let mut statement = db
            .compile_statement("INSERT OR IGNORE INTO t (id, name) VALUES (1, 'y')")
            .unwrap();
        assert_eq!(statement.execute_insert().unwrap(), -1);
    }

    #[test]
    fn test_update_delete_counts() {
        let db = db();
        db.exec_sql("INSERT INTO t (name) VALUES ('a'), ('b'), ('c')").unwrap();
        let mut statement = db.compile_statement("UPDATE t SET score = 2 WHERE name != ?").unwrap();
        statement.bind_string(1, "a").unwrap();
        assert_eq!(statement.execute_update_delete().unwrap(), 2);
    }

    #[test]
    fn test_scalars() {
        let db = db();
        db.exec_sql("INSERT INTO t (name) VALUES ('a'), ('b')").unwrap();
        let mut count = db.compile_statement("SELECT count(*) FROM t").unwrap();
        assert_eq!(count.query_scalar_i64().unwrap(), 2);

        let mut name = db.compile_statement("SELECT name FROM t WHERE id = ?").unwrap();
        name.bind_long(1, 2).unwrap();
        assert_eq!(name.query_scalar_text().unwrap().as_deref(), Some("b"));

        let mut score = db.compile_statement("SELECT score FROM t WHERE id = 1").unwrap();
        assert_eq!(score.query_scalar_text().unwrap(), None);
    }

    #[test]
    fn test_scalar_without_rows() {
        let db = db();
        let mut statement = db.compile_statement("SELECT id FROM t").unwrap();
        assert!(matches!(statement.query_scalar_i64(), Err(Error::NoRows)));
    }

    #[test]
    fn test_clear_bindings_binds_null() {
        let db = db();
        let mut statement = db.compile_statement("INSERT INTO t (name) VALUES (?)").unwrap();
        statement.bind_string(1, "a").unwrap();
        statement.clear_bindings().unwrap();
        statement.execute_insert().unwrap();
        let cursor = db.query("SELECT name FROM t").unwrap();
        assert_eq!(cursor.get(0, "name"), Some(&Value::Null));
    }

    #[test]
    fn test_invalid_sql_fails_at_compile() {
        let db = db();
        assert!(matches!(
            db.compile_statement("SELEKT 1"),
            Err(Error::Engine(_))
        ));
    }

    #[test]
    fn test_zero_index_rejected() {
        let mut args = BindArgs::default();
        assert!(args.bind_long(0, 1).is_err());
    }

    #[test]
    fn test_scalar_text_converts_numeric_prefix() {
        let db = db();
        let cases = [
            ("'1.5'", 1),
            ("'12abc'", 12),
            ("'  -7 apples'", -7),
            ("'2.9e1'", 29),
            ("'abc'", 0),
            ("'-'", 0),
            ("'9223372036854775807'", i64::MAX),
        ];
        for (literal, expected) in cases {
            let mut statement = db.compile_statement(&format!("SELECT {literal}")).unwrap();
            assert_eq!(statement.query_scalar_i64().unwrap(), expected, "{literal}");
        }
    }

    #[test]
    fn test_numeric_prefix() {
        assert_eq!(numeric_prefix("  +3.25e2xyz"), "+3.25e2");
        assert_eq!(numeric_prefix("4e"), "4");
        assert_eq!(numeric_prefix("4e+"), "4");
        assert_eq!(numeric_prefix(".5"), ".5");
        assert_eq!(numeric_prefix("x1"), "");
    }
}
