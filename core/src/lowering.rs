//! Lowering of structured insert, update, and delete into SQL text.
//!
//! Both the raw engine and the cache-controlled proxy use these functions,
//! so a structured operation produces the same statement whichever layer
//! lowers it; the proxy only adds its marker afterwards.
//!
//! Table and column names are inserted verbatim. They are identifiers chosen
//! by the caller, never user input.

use crate::error::{Error, Result};
use crate::value::{ConflictAlgorithm, ContentValues, Value};

/// A statement lowered to text together with its positional arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredStatement {
    /// SQL text with `?` placeholders.
    pub sql: String,
    /// Arguments for placeholders `1..=bind_args.len()`.
    pub bind_args: Vec<Value>,
}

/// Lowers a structured insert.
///
/// An empty mapping inserts a row of column defaults.
///
/// # Examples
///
/// ```
/// use sqlguard_core::lowering::lower_insert;
/// use sqlguard_core::{ConflictAlgorithm, ContentValues};
///
/// let mut values = ContentValues::new();
/// values.put("name", "webdav").put("position", 2);
///
/// let lowered = lower_insert("clouds", ConflictAlgorithm::Replace, &values);
/// assert_eq!(lowered.sql, "INSERT OR REPLACE INTO clouds(name,position) VALUES (?,?)");
/// assert_eq!(lowered.bind_args.len(), 2);
/// ```
pub fn lower_insert(table: &str, conflict: ConflictAlgorithm, values: &ContentValues) -> LoweredStatement {
    let verb = verb("INSERT", conflict);
    if values.is_empty() {
        return LoweredStatement {
            sql: format!("{verb} INTO {table} DEFAULT VALUES"),
            bind_args: Vec::new(),
        };
    }

    let columns: Vec<&str> = values.iter().map(|(c, _)| c).collect();
    let placeholders = vec!["?"; values.len()].join(",");
    LoweredStatement {
        sql: format!(
            "{verb} INTO {table}({}) VALUES ({placeholders})",
            columns.join(",")
        ),
        bind_args: values.iter().map(|(_, v)| v.clone()).collect(),
    }
}

/// Lowers a structured update.
///
/// Value arguments come first, followed by `where_args`.
///
/// # Errors
///
/// Returns [`Error::EmptyValues`] if `values` is empty.
///
/// # Examples
///
/// ```
/// use sqlguard_core::lowering::lower_update;
/// use sqlguard_core::{ConflictAlgorithm, ContentValues, Value};
///
/// let mut values = ContentValues::new();
/// values.put("name", "renamed");
///
/// let lowered = lower_update(
///     "vaults",
///     ConflictAlgorithm::None,
///     &values,
///     Some("id = ?"),
///     &[Value::Integer(4)],
/// )
/// .unwrap();
/// assert_eq!(lowered.sql, "UPDATE vaults SET name=? WHERE id = ?");
/// assert_eq!(lowered.bind_args, vec![Value::Text("renamed".into()), Value::Integer(4)]);
/// ```
pub fn lower_update(
    table: &str,
    conflict: ConflictAlgorithm,
    values: &ContentValues,
    where_clause: Option<&str>,
    where_args: &[Value],
) -> Result<LoweredStatement> {
    if values.is_empty() {
        return Err(Error::EmptyValues(table.to_string()));
    }

    let verb = verb("UPDATE", conflict);
    let assignments: Vec<String> = values.iter().map(|(c, _)| format!("{c}=?")).collect();
    let mut sql = format!("{verb} {table} SET {}", assignments.join(","));
    append_where(&mut sql, where_clause);

    let mut bind_args: Vec<Value> = values.iter().map(|(_, v)| v.clone()).collect();
    bind_args.extend_from_slice(where_args);
    Ok(LoweredStatement { sql, bind_args })
}

/// Lowers a structured delete.
pub fn lower_delete(table: &str, where_clause: Option<&str>, where_args: &[Value]) -> LoweredStatement {
    let mut sql = format!("DELETE FROM {table}");
    append_where(&mut sql, where_clause);
    LoweredStatement {
        sql,
        bind_args: where_args.to_vec(),
    }
}

fn verb(verb: &str, conflict: ConflictAlgorithm) -> String {
    match conflict {
        ConflictAlgorithm::None => verb.to_string(),
        other => format!("{verb}{}", other.sql_fragment().trim_end()),
    }
}

fn append_where(sql: &mut String, where_clause: Option<&str>) {
    if let Some(clause) = where_clause.filter(|c| !c.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(clause);
    }
}
