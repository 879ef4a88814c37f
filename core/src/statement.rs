//! Compiled-statement and query contracts shared by the raw engine and the
//! cache-controlled proxy.

use crate::error::Result;
use crate::value::Value;

/// Something positional parameters can be bound to.
///
/// Parameter indexes are 1-based, as in SQL.
pub trait Program {
    /// Binds `NULL` at `index`.
    fn bind_null(&mut self, index: usize) -> Result<()>;

    /// Binds a 64-bit integer at `index`.
    fn bind_long(&mut self, index: usize, value: i64) -> Result<()>;

    /// Binds a double at `index`.
    fn bind_double(&mut self, index: usize, value: f64) -> Result<()>;

    /// Binds a byte sequence at `index`.
    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()>;

    /// Binds text at `index`.
    fn bind_string(&mut self, index: usize, value: &str) -> Result<()>;

    /// Discards every binding.
    fn clear_bindings(&mut self) -> Result<()>;

    /// Binds `value` at `index`, dispatching on its type.
    fn bind_value(&mut self, index: usize, value: &Value) -> Result<()> {
        match value {
            Value::Null => self.bind_null(index),
            Value::Integer(v) => self.bind_long(index, *v),
            Value::Real(v) => self.bind_double(index, *v),
            Value::Blob(v) => self.bind_blob(index, v),
            Value::Text(v) => self.bind_string(index, v),
        }
    }
}

/// A compiled statement that can be executed with its current bindings.
pub trait Statement: Program + Send {
    /// Executes the statement, discarding any result rows.
    fn execute(&mut self) -> Result<()>;

    /// Executes an insert and returns the new row id, or `-1` when no row
    /// was inserted.
    fn execute_insert(&mut self) -> Result<i64>;

    /// Executes an update or delete and returns the number of rows changed.
    fn execute_update_delete(&mut self) -> Result<usize>;

    /// Returns the first column of the first row as an integer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRows`](crate::Error::NoRows) if the query yields
    /// no rows.
    fn query_scalar_i64(&mut self) -> Result<i64>;

    /// Returns the first column of the first row as text, `None` for `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoRows`](crate::Error::NoRows) if the query yields
    /// no rows.
    fn query_scalar_text(&mut self) -> Result<Option<String>>;

    /// Releases the statement's engine resources.
    fn close(&mut self) -> Result<()>;
}

/// A read-only query: SQL text plus the arguments it binds.
///
/// Engines may read [`sql`](Query::sql) more than once per execution and
/// rely on getting the same text each time.
pub trait Query: Send + Sync {
    /// The SQL text of the query.
    fn sql(&self) -> String;

    /// Number of arguments bound by [`bind_to`](Query::bind_to).
    fn arg_count(&self) -> usize;

    /// Binds the query's arguments to `program`.
    fn bind_to(&self, program: &mut dyn Program) -> Result<()>;
}

impl<Q: Query + ?Sized> Query for &Q {
    fn sql(&self) -> String {
        (**self).sql()
    }

    fn arg_count(&self) -> usize {
        (**self).arg_count()
    }

    fn bind_to(&self, program: &mut dyn Program) -> Result<()> {
        (**self).bind_to(program)
    }
}

/// A [`Query`] over fixed text and positional arguments.
///
/// # Examples
///
/// ```
/// use sqlguard_core::{Query, SimpleQuery, Value};
///
/// let query = SimpleQuery::with_args("SELECT * FROM clouds WHERE id = ?", vec![Value::Integer(7)]);
/// assert_eq!(query.sql(), "SELECT * FROM clouds WHERE id = ?");
/// assert_eq!(query.arg_count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleQuery {
    sql: String,
    args: Vec<Value>,
}

impl SimpleQuery {
    /// Creates a query without arguments.
    pub fn new(sql: impl Into<String>) -> Self {
        Self::with_args(sql, Vec::new())
    }

    /// Creates a query binding `args` to parameters `1..=args.len()`.
    pub fn with_args(sql: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            args,
        }
    }

    /// Binds `args` to parameters `1..=args.len()` of `program`.
    pub fn bind(program: &mut dyn Program, args: &[Value]) -> Result<()> {
        for (i, arg) in args.iter().enumerate() {
            program.bind_value(i + 1, arg)?;
        }
        Ok(())
    }
}

impl Query for SimpleQuery {
    fn sql(&self) -> String {
        self.sql.clone()
    }

    fn arg_count(&self) -> usize {
        self.args.len()
    }

    fn bind_to(&self, program: &mut dyn Program) -> Result<()> {
        SimpleQuery::bind(program, &self.args)
    }
}
