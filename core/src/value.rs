//! Bindable values, column/value mappings, and conflict algorithms.

/// A value that can be bound to a statement parameter or read from a row.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point number.
    Real(f64),
    /// Raw byte sequence.
    Blob(Vec<u8>),
    /// UTF-8 text.
    Text(String),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the real payload, if this is a real.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the text payload, if this is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    /// Returns the blob payload, if this is a blob.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(v) => Some(v),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Blob(v.to_vec())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Ordered mapping from column names to values, used by structured
/// insert and update.
///
/// Columns keep their insertion order. Putting a column a second time
/// replaces its value in place.
///
/// # Examples
///
/// ```
/// use sqlguard_core::{ContentValues, Value};
///
/// let mut values = ContentValues::new();
/// values.put("name", "vault");
/// values.put("position", 3);
/// values.put("name", "renamed");
///
/// assert_eq!(values.len(), 2);
/// assert_eq!(values.get("name"), Some(&Value::Text("renamed".into())));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContentValues {
    entries: Vec<(String, Value)>,
}

impl ContentValues {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `column` to `value`.
    pub fn put(&mut self, column: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        let column = column.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    /// Sets `column` to `NULL`.
    pub fn put_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.put(column, Value::Null)
    }

    /// Returns the value stored for `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v)
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no columns are set.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over `(column, value)` pairs in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for ContentValues {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut values = ContentValues::new();
        for (column, value) in iter {
            values.put(column, value);
        }
        values
    }
}

/// Conflict resolution algorithm for structured insert and update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConflictAlgorithm {
    /// Use the table's declared behavior (no `OR` clause).
    #[default]
    None,
    /// `OR ROLLBACK`
    Rollback,
    /// `OR ABORT`
    Abort,
    /// `OR FAIL`
    Fail,
    /// `OR IGNORE`
    Ignore,
    /// `OR REPLACE`
    Replace,
}

impl ConflictAlgorithm {
    /// The fragment placed between the verb and the table, including the
    /// surrounding spaces (empty for [`ConflictAlgorithm::None`]).
    pub fn sql_fragment(self) -> &'static str {
        match self {
            ConflictAlgorithm::None => "",
            ConflictAlgorithm::Rollback => " OR ROLLBACK ",
            ConflictAlgorithm::Abort => " OR ABORT ",
            ConflictAlgorithm::Fail => " OR FAIL ",
            ConflictAlgorithm::Ignore => " OR IGNORE ",
            ConflictAlgorithm::Replace => " OR REPLACE ",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_replaces_in_place() {
        let mut values = ContentValues::new();
        values.put("a", 1).put("b", 2).put("a", 3);
        let columns: Vec<_> = values.iter().map(|(c, _)| c).collect();
        assert_eq!(columns, vec!["a", "b"]);
        assert_eq!(values.get("a"), Some(&Value::Integer(3)));
    }

    #[test]
    fn test_option_into_value() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn test_conflict_fragments() {
        assert_eq!(ConflictAlgorithm::None.sql_fragment(), "");
        assert_eq!(ConflictAlgorithm::Replace.sql_fragment(), " OR REPLACE ");
    }

    #[test]
    fn test_collect_content_values() {
        let values: ContentValues = [("x", Value::Null), ("y", Value::Integer(1))]
            .into_iter()
            .collect();
        assert_eq!(values.len(), 2);
        assert!(values.get("x").unwrap().is_null());
    }
}
