//! A statement that recompiles from freshly rewritten text on every
//! execution.
//!
//! [`DeferredStatement`] records bindings instead of applying them. Each
//! execution rewrites the caller's SQL with a new marker, compiles the
//! result against the raw connection, replays the recorded bindings in
//! order, runs the requested verb, and closes the compiled handle before
//! returning. No engine handle survives between executions, so a plan the
//! engine cached earlier can never be reused.
//!
//! A single instance is not meant to be shared between threads while it is
//! being bound; the `&mut self` receivers make that a compile-time rule.

use tracing::{Span, trace};

use crate::database::Database;
use crate::error::Result;
use crate::rewrite::rewrite;
use crate::statement::{Program, Statement};
use crate::value::Value;

/// One recorded binding.
#[derive(Debug, Clone, PartialEq)]
pub struct BindingOp {
    /// 1-based parameter index.
    pub position: usize,
    /// Bound value.
    pub value: Value,
}

impl BindingOp {
    /// Applies this binding to `program`.
    pub fn apply<P: Program + ?Sized>(&self, program: &mut P) -> Result<()> {
        program.bind_value(self.position, &self.value)
    }
}

/// Statement that compiles a fresh, uniquely rewritten handle for every
/// execution.
///
/// `db` is the raw connection underneath the proxy, never the proxy
/// itself; compiling through the proxy would wrap the statement again.
///
/// # Examples
///
/// ```ignore
/// let mut statement = DeferredStatement::new("UPDATE vaults SET position = ?", &raw);
/// statement.bind_long(1, 3)?;
/// statement.execute_update_delete()?; // compiled as "UPDATE ... -- <marker-1>"
/// statement.execute_update_delete()?; // compiled as "UPDATE ... -- <marker-2>"
/// ```
pub struct DeferredStatement<'db, D: ?Sized> {
    sql: String,
    db: &'db D,
    bindings: Vec<BindingOp>,
    span: Span,
}

impl<'db, D: Database + ?Sized> DeferredStatement<'db, D> {
    /// Creates an unbound statement for `sql` over the raw connection `db`.
    pub fn new(sql: impl Into<String>, db: &'db D) -> Self {
        Self::with_span(sql, db, Span::current())
    }

    /// Like [`new`](Self::new), logging under `span`.
    pub fn with_span(sql: impl Into<String>, db: &'db D, span: Span) -> Self {
        Self {
            sql: sql.into(),
            db,
            bindings: Vec::new(),
            span,
        }
    }

    /// The SQL as given, before rewriting.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Bindings recorded so far, in call order.
    pub fn bindings(&self) -> &[BindingOp] {
        &self.bindings
    }

    fn record(&mut self, position: usize, value: Value) -> Result<()> {
        self.bindings.push(BindingOp { position, value });
        Ok(())
    }

    fn replay(&self, statement: &mut (dyn Statement + 'db)) -> Result<()> {
        for op in &self.bindings {
            op.apply(&mut *statement)?;
        }
        Ok(())
    }

    /// Compiles a fresh handle, replays the bindings and runs `f` on it.
    /// The handle is closed on every path once compiled; a close failure
    /// is only reported when nothing failed before it.
    fn with_bound_statement<T>(
        &self,
        f: impl FnOnce(&mut (dyn Statement + 'db)) -> Result<T>,
    ) -> Result<T> {
        let sql = rewrite(&self.sql);
        trace!(parent: &self.span, sql = %sql, bindings = self.bindings.len(), "Compiling deferred statement");
        let db: &'db D = self.db;
        let mut statement = db.compile_statement(&sql)?;
        let result = match self.replay(statement.as_mut()) {
            Ok(()) => f(statement.as_mut()),
            Err(err) => Err(err),
        };
        let closed = statement.close();
        let value = result?;
        closed?;
        Ok(value)
    }
}

impl<D: Database + ?Sized> Program for DeferredStatement<'_, D> {
    fn bind_null(&mut self, index: usize) -> Result<()> {
        self.record(index, Value::Null)
    }

    fn bind_long(&mut self, index: usize, value: i64) -> Result<()> {
        self.record(index, Value::Integer(value))
    }

    fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
        self.record(index, Value::Real(value))
    }

    fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
        self.record(index, Value::Blob(value.to_vec()))
    }

    fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
        self.record(index, Value::Text(value.to_string()))
    }

    fn clear_bindings(&mut self) -> Result<()> {
        self.bindings.clear();
        Ok(())
    }

    fn bind_value(&mut self, index: usize, value: &Value) -> Result<()> {
        self.record(index, value.clone())
    }
}

impl<D: Database + ?Sized> Statement for DeferredStatement<'_, D> {
    fn execute(&mut self) -> Result<()> {
        self.with_bound_statement(|s| s.execute())
    }

    fn execute_insert(&mut self) -> Result<i64> {
        self.with_bound_statement(|s| s.execute_insert())
    }

    fn execute_update_delete(&mut self) -> Result<usize> {
        self.with_bound_statement(|s| s.execute_update_delete())
    }

    fn query_scalar_i64(&mut self) -> Result<i64> {
        self.with_bound_statement(|s| s.query_scalar_i64())
    }

    fn query_scalar_text(&mut self) -> Result<Option<String>> {
        self.with_bound_statement(|s| s.query_scalar_text())
    }

    fn close(&mut self) -> Result<()> {
        // Nothing is held between executions.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cursor::Cursor;
    use crate::error::Error;
    use crate::statement::Query;
    use crate::value::{ConflictAlgorithm, ContentValues};

    /// Engine whose compiled statements fail on demand and count what
    /// happens to them.
    #[derive(Default)]
    struct ScriptedDatabase {
        fail_bind: bool,
        fail_execute: bool,
        fail_close: bool,
        compiled: Mutex<Vec<String>>,
        bound: Mutex<Vec<(usize, Value)>>,
        executions: AtomicUsize,
        closes: AtomicUsize,
    }

    impl ScriptedDatabase {
        fn closes(&self) -> usize {
            self.closes.load(Ordering::SeqCst)
        }

        fn executions(&self) -> usize {
            self.executions.load(Ordering::SeqCst)
        }
    }

    struct ScriptedStatement<'a> {
        db: &'a ScriptedDatabase,
    }

    impl ScriptedStatement<'_> {
        fn bind(&mut self, index: usize, value: Value) -> Result<()> {
            if self.db.fail_bind {
                return Err(Error::engine("bind rejected"));
            }
            self.db.bound.lock().unwrap().push((index, value));
            Ok(())
        }

        fn run(&mut self) -> Result<()> {
            self.db.executions.fetch_add(1, Ordering::SeqCst);
            if self.db.fail_execute {
                return Err(Error::engine("execution failed"));
            }
            Ok(())
        }
    }

    impl Program for ScriptedStatement<'_> {
        fn bind_null(&mut self, index: usize) -> Result<()> {
            self.bind(index, Value::Null)
        }

        fn bind_long(&mut self, index: usize, value: i64) -> Result<()> {
            self.bind(index, Value::Integer(value))
        }

        fn bind_double(&mut self, index: usize, value: f64) -> Result<()> {
            self.bind(index, Value::Real(value))
        }

        fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<()> {
            self.bind(index, Value::Blob(value.to_vec()))
        }

        fn bind_string(&mut self, index: usize, value: &str) -> Result<()> {
            self.bind(index, Value::Text(value.to_string()))
        }

        fn clear_bindings(&mut self) -> Result<()> {
            Ok(())
        }
    }

    impl Statement for ScriptedStatement<'_> {
        fn execute(&mut self) -> Result<()> {
            self.run()
        }

        fn execute_insert(&mut self) -> Result<i64> {
            self.run().map(|()| 7)
        }

        fn execute_update_delete(&mut self) -> Result<usize> {
            self.run().map(|()| 1)
        }

        fn query_scalar_i64(&mut self) -> Result<i64> {
            self.run().map(|()| 42)
        }

        fn query_scalar_text(&mut self) -> Result<Option<String>> {
            self.run().map(|()| None)
        }

        fn close(&mut self) -> Result<()> {
            self.db.closes.fetch_add(1, Ordering::SeqCst);
            if self.db.fail_close {
                return Err(Error::Closed);
            }
            Ok(())
        }
    }

    impl Database for ScriptedDatabase {
        fn exec_sql(&self, _sql: &str) -> Result<()> {
            unimplemented!()
        }

        fn exec_sql_with_args(&self, _sql: &str, _args: &[Value]) -> Result<()> {
            unimplemented!()
        }

        fn query(&self, _sql: &str) -> Result<Cursor> {
            unimplemented!()
        }

        fn query_with_args(&self, _sql: &str, _args: &[Value]) -> Result<Cursor> {
            unimplemented!()
        }

        fn query_object(&self, _query: &dyn Query) -> Result<Cursor> {
            unimplemented!()
        }

        fn insert(&self, _table: &str, _conflict: ConflictAlgorithm, _values: &ContentValues) -> Result<i64> {
            unimplemented!()
        }

        fn update(
            &self,
            _table: &str,
            _conflict: ConflictAlgorithm,
            _values: &ContentValues,
            _where_clause: Option<&str>,
            _where_args: &[Value],
        ) -> Result<usize> {
            unimplemented!()
        }

        fn delete(&self, _table: &str, _where_clause: Option<&str>, _where_args: &[Value]) -> Result<usize> {
            unimplemented!()
        }

        fn exec_per_connection_sql(&self, _sql: &str, _args: &[Value]) -> Result<()> {
            unimplemented!()
        }

        fn compile_statement(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
            self.compiled.lock().unwrap().push(sql.to_string());
            Ok(Box::new(ScriptedStatement { db: self }))
        }

        fn begin_transaction(&self) -> Result<()> {
            unimplemented!()
        }

        fn set_transaction_successful(&self) -> Result<()> {
            unimplemented!()
        }

        fn end_transaction(&self) -> Result<()> {
            unimplemented!()
        }

        fn in_transaction(&self) -> bool {
            false
        }

        fn version(&self) -> Result<i32> {
            unimplemented!()
        }

        fn set_version(&self, _version: i32) -> Result<()> {
            unimplemented!()
        }

        fn set_foreign_key_constraints_enabled(&self, _enabled: bool) -> Result<()> {
            unimplemented!()
        }

        fn path(&self) -> Option<&Path> {
            None
        }

        fn is_open(&self) -> bool {
            true
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }
    }

    fn engine_message(err: &Error) -> String {
        err.engine_source().map(ToString::to_string).unwrap_or_default()
    }

    #[test]
    fn test_each_execution_compiles_and_closes_fresh_handle() {
        let db = ScriptedDatabase::default();
        let mut statement = DeferredStatement::new("UPDATE vaults SET position = ?", &db);
        statement.bind_long(1, 3).unwrap();
        assert!(db.compiled.lock().unwrap().is_empty());

        assert_eq!(statement.execute_update_delete().unwrap(), 1);
        assert_eq!(statement.execute_update_delete().unwrap(), 1);

        let compiled = db.compiled.lock().unwrap().clone();
        assert_eq!(compiled.len(), 2);
        assert_ne!(compiled[0], compiled[1]);
        assert!(compiled.iter().all(|sql| sql.starts_with("UPDATE vaults SET position = ? -- ")));
        assert_eq!(
            *db.bound.lock().unwrap(),
            vec![(1, Value::Integer(3)), (1, Value::Integer(3))]
        );
        assert_eq!(db.closes(), 2);
    }

    #[test]
    fn test_failed_execution_still_closes() {
        let db = ScriptedDatabase {
            fail_execute: true,
            ..ScriptedDatabase::default()
        };
        let mut statement = DeferredStatement::new("DELETE FROM vaults", &db);

        let err = statement.execute().unwrap_err();
        assert_eq!(engine_message(&err), "execution failed");
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_failed_binding_replay_closes_without_executing() {
        let db = ScriptedDatabase {
            fail_bind: true,
            ..ScriptedDatabase::default()
        };
        let mut statement = DeferredStatement::new("INSERT INTO vaults (name) VALUES (?)", &db);
        // Recording never fails; the engine rejects the binding on replay.
        statement.bind_string(1, "home").unwrap();

        let err = statement.execute_insert().unwrap_err();
        assert_eq!(engine_message(&err), "bind rejected");
        assert_eq!(db.executions(), 0);
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_close_failure_does_not_mask_execution_error() {
        let db = ScriptedDatabase {
            fail_execute: true,
            fail_close: true,
            ..ScriptedDatabase::default()
        };
        let mut statement = DeferredStatement::new("SELECT count(*) FROM vaults", &db);

        let err = statement.query_scalar_i64().unwrap_err();
        assert_eq!(engine_message(&err), "execution failed");
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_close_failure_after_success_is_reported() {
        let db = ScriptedDatabase {
            fail_close: true,
            ..ScriptedDatabase::default()
        };
        let mut statement = DeferredStatement::new("SELECT name FROM vaults", &db);

        assert!(matches!(statement.query_scalar_text(), Err(Error::Closed)));
        assert_eq!(db.executions(), 1);
        assert_eq!(db.closes(), 1);
    }

    #[test]
    fn test_clear_bindings_drops_recorded_ops() {
        let db = ScriptedDatabase::default();
        let mut statement = DeferredStatement::new("SELECT ?", &db);
        statement.bind_null(1).unwrap();
        statement.clear_bindings().unwrap();
        statement.bind_double(1, 0.5).unwrap();

        assert_eq!(statement.bindings(), [BindingOp { position: 1, value: Value::Real(0.5) }]);
        statement.execute().unwrap();
        assert_eq!(*db.bound.lock().unwrap(), vec![(1, Value::Real(0.5))]);
    }
}
