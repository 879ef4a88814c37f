//! Materialized query results.

use crate::value::Value;

/// Rows returned by a query, fully read from the engine.
///
/// # Examples
///
/// ```
/// use sqlguard_core::{Cursor, Value};
///
/// let cursor = Cursor::new(
///     vec!["id".into(), "name".into()],
///     vec![vec![Value::Integer(1), Value::Text("dropbox".into())]],
/// );
/// assert_eq!(cursor.len(), 1);
/// assert_eq!(cursor.column_index("name"), Some(1));
/// assert_eq!(cursor.get(0, "name").and_then(Value::as_str), Some("dropbox"));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Cursor {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Cursor {
    /// Creates a cursor from column names and row values.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Column names in result order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Position of the column called `name`.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns `true` if the query produced no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// The values of row `row`.
    pub fn row(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    /// The value in row `row` under column `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.column_index(column)?;
        self.rows.get(row)?.get(index)
    }

    /// Iterates over all rows.
    pub fn rows(&self) -> impl Iterator<Item = &[Value]> {
        self.rows.iter().map(Vec::as_slice)
    }
}
