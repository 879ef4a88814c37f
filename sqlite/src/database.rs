//! Raw SQLite connection implementing [`Database`].
//!
//! [`SqliteDatabase`] is a cheaply cloneable handle to one connection behind
//! a mutex. It executes SQL exactly as given, through rusqlite's
//! prepared-statement cache, and keeps nested transaction
//! bookkeeping: only the outermost `end_transaction` commits, and only if
//! every nested level was marked successful.
//!
//! A transaction belongs to the thread that began it. While it is open,
//! every other thread's work on the same handle waits until it ends.
//!
//! An open helper may install a corruption handler. It runs the first time
//! a statement on a live connection reports an unreadable file.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};
use std::time::Duration;

use rusqlite::Connection;
use sqlguard_core::lowering::{lower_delete, lower_insert, lower_update};
use sqlguard_core::{
    ConflictAlgorithm, ContentValues, Cursor, Database, DatabaseConfig, Error, Query, Result,
    Statement, Value,
};
use tracing::{debug, trace, warn};

use crate::error::{engine, is_corruption};
use crate::statement::{self, BindArgs, SqliteStatement};

#[derive(Default)]
struct State {
    conn: Option<Connection>,
    // One success flag per open nesting level.
    transactions: Vec<bool>,
    child_failed: bool,
    owner: Option<ThreadId>,
}

/// Called with the database the first time a live connection reports an
/// unreadable file.
pub(crate) type CorruptionHandler = Box<dyn Fn(&SqliteDatabase) + Send + Sync>;

struct Shared {
    path: Option<PathBuf>,
    state: Mutex<State>,
    // Signalled whenever the owning transaction ends.
    released: Condvar,
    corruption_handler: OnceLock<CorruptionHandler>,
    corruption_reported: AtomicBool,
}

/// Handle to one SQLite connection.
#[derive(Clone)]
pub struct SqliteDatabase {
    shared: Arc<Shared>,
}

impl fmt::Debug for SqliteDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteDatabase")
            .field("path", &self.shared.path)
            .finish_non_exhaustive()
    }
}

impl SqliteDatabase {
    /// Opens the database described by `config`.
    ///
    /// No pages are read here; a corrupt file is only detected by the first
    /// statement that touches it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if the file cannot be opened.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        let conn = match &config.path {
            Some(path) => Connection::open(path),
            None => Connection::open_in_memory(),
        }
        .map_err(engine)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))
            .map_err(engine)?;
        conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
        debug!(name = %config.name, path = ?config.path, "Opened SQLite connection");
        Ok(Self::from_connection(conn, config.path.clone()))
    }

    /// Opens a private in-memory database with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Engine`] if SQLite cannot allocate the database.
    pub fn open_in_memory() -> Result<Self> {
        Self::open(&DatabaseConfig::in_memory("memory"))
    }

    /// Wraps an existing connection.
    pub fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self {
            shared: Arc::new(Shared {
                path,
                state: Mutex::new(State {
                    conn: Some(conn),
                    ..State::default()
                }),
                released: Condvar::new(),
                corruption_handler: OnceLock::new(),
                corruption_reported: AtomicBool::new(false),
            }),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.shared.state.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Locks the state once no other thread owns a transaction.
    fn lock_for_current_thread(&self) -> Result<MutexGuard<'_, State>> {
        let me = thread::current().id();
        let mut state = self.lock()?;
        while state.owner.is_some_and(|owner| owner != me) {
            state = self
                .shared
                .released
                .wait(state)
                .map_err(|_| Error::LockPoisoned)?;
        }
        Ok(state)
    }

    /// Runs `f` on the open connection.
    pub(crate) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let result = {
            let state = self.lock_for_current_thread()?;
            let conn = state.conn.as_ref().ok_or(Error::Closed)?;
            f(conn).map_err(engine)
        };
        if let Err(err) = &result {
            self.report_corruption(err);
        }
        result
    }

    /// Installs the handler run on the first corruption error. Only the
    /// first installation takes effect.
    pub(crate) fn set_corruption_handler(&self, handler: CorruptionHandler) {
        if self.shared.corruption_handler.set(handler).is_err() {
            debug!("Corruption handler already installed");
        }
    }

    // Must be called without the state lock held: the handler may use the database.
    fn report_corruption(&self, err: &Error) {
        if !is_corruption(err) {
            return;
        }
        let Some(handler) = self.shared.corruption_handler.get() else {
            return;
        };
        if self.shared.corruption_reported.swap(true, Ordering::SeqCst) {
            return;
        }
        warn!(path = ?self.shared.path, error = %err, "Live connection reported an unreadable file");
        handler(self);
    }

    fn finish_transaction(conn: Option<&Connection>, commit: bool) -> Result<()> {
        let conn = conn.ok_or(Error::Closed)?;
        if !commit {
            debug!("Rolling back transaction");
            return conn.execute_batch("ROLLBACK").map_err(engine);
        }
        if let Err(err) = conn.execute_batch("COMMIT") {
            if !conn.is_autocommit() {
                if let Err(rollback) = conn.execute_batch("ROLLBACK") {
                    warn!(error = %rollback, "Rollback after failed commit failed");
                }
            }
            return Err(engine(err));
        }
        Ok(())
    }

    fn run(&self, sql: &str, args: &[Value]) -> Result<()> {
        trace!(sql, "Executing");
        self.with_connection(|conn| statement::run(conn, sql, &BindArgs::from_slice(args)))
    }

    fn query_object_raw(&self, query: &dyn Query) -> Result<Cursor> {
        let mut args = BindArgs::default();
        query.bind_to(&mut args)?;
        let sql = query.sql();
        trace!(sql = %sql, "Querying");
        self.with_connection(|conn| statement::query_rows(conn, &sql, &args))
    }
}

impl Database for SqliteDatabase {
    fn exec_sql(&self, sql: &str) -> Result<()> {
        self.run(sql, &[])
    }

    fn exec_sql_with_args(&self, sql: &str, args: &[Value]) -> Result<()> {
        self.run(sql, args)
    }

    fn query(&self, sql: &str) -> Result<Cursor> {
        self.query_with_args(sql, &[])
    }

    fn query_with_args(&self, sql: &str, args: &[Value]) -> Result<Cursor> {
        trace!(sql, "Querying");
        self.with_connection(|conn| statement::query_rows(conn, sql, &BindArgs::from_slice(args)))
    }

    fn query_object(&self, query: &dyn Query) -> Result<Cursor> {
        self.query_object_raw(query)
    }

    fn insert(&self, table: &str, conflict: ConflictAlgorithm, values: &ContentValues) -> Result<i64> {
        let lowered = lower_insert(table, conflict, values);
        let args = BindArgs::from_slice(&lowered.bind_args);
        self.with_connection(|conn| statement::run_for_insert(conn, &lowered.sql, &args))
    }

    fn update(
        &self,
        table: &str,
        conflict: ConflictAlgorithm,
        values: &ContentValues,
        where_clause: Option<&str>,
        where_args: &[Value],
    ) -> Result<usize> {
        let lowered = lower_update(table, conflict, values, where_clause, where_args)?;
        let args = BindArgs::from_slice(&lowered.bind_args);
        self.with_connection(|conn| statement::run_for_changes(conn, &lowered.sql, &args))
    }

    fn delete(&self, table: &str, where_clause: Option<&str>, where_args: &[Value]) -> Result<usize> {
        let lowered = lower_delete(table, where_clause, where_args);
        let args = BindArgs::from_slice(&lowered.bind_args);
        self.with_connection(|conn| statement::run_for_changes(conn, &lowered.sql, &args))
    }

    fn exec_per_connection_sql(&self, sql: &str, args: &[Value]) -> Result<()> {
        // A single connection: running it once covers every connection.
        self.run(sql, args)
    }

    fn compile_statement(&self, sql: &str) -> Result<Box<dyn Statement + '_>> {
        self.with_connection(|conn| conn.prepare_cached(sql).map(drop))?;
        Ok(Box::new(SqliteStatement::new(self, sql)))
    }

    fn begin_transaction(&self) -> Result<()> {
        let mut state = self.lock_for_current_thread()?;
        if state.transactions.is_empty() {
            let conn = state.conn.as_ref().ok_or(Error::Closed)?;
            if let Err(err) = conn.execute_batch("BEGIN EXCLUSIVE").map_err(engine) {
                drop(state);
                self.report_corruption(&err);
                return Err(err);
            }
            state.owner = Some(thread::current().id());
            state.child_failed = false;
        }
        state.transactions.push(false);
        Ok(())
    }

    fn set_transaction_successful(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.owner != Some(thread::current().id()) {
            return Err(Error::NoTransaction);
        }
        let top = state.transactions.last_mut().ok_or(Error::NoTransaction)?;
        *top = true;
        Ok(())
    }

    fn end_transaction(&self) -> Result<()> {
        let mut state = self.lock()?;
        if state.owner != Some(thread::current().id()) {
            return Err(Error::NoTransaction);
        }
        let successful = state.transactions.pop().ok_or(Error::NoTransaction)?;
        if !successful {
            state.child_failed = true;
        }
        if !state.transactions.is_empty() {
            return Ok(());
        }

        let commit = !state.child_failed;
        state.child_failed = false;
        state.owner = None;
        let result = Self::finish_transaction(state.conn.as_ref(), commit);
        drop(state);
        self.shared.released.notify_all();
        if let Err(err) = &result {
            self.report_corruption(err);
        }
        result
    }

    fn in_transaction(&self) -> bool {
        let me = thread::current().id();
        self.lock().is_ok_and(|state| state.owner == Some(me))
    }

    fn version(&self) -> Result<i32> {
        self.with_connection(|conn| {
            conn.prepare_cached("PRAGMA user_version")?
                .query_row([], |row| row.get(0))
        })
    }

    fn set_version(&self, version: i32) -> Result<()> {
        self.run(&format!("PRAGMA user_version = {version}"), &[])
    }

    fn set_foreign_key_constraints_enabled(&self, enabled: bool) -> Result<()> {
        let value = if enabled { "ON" } else { "OFF" };
        self.run(&format!("PRAGMA foreign_keys = {value}"), &[])
    }

    fn path(&self) -> Option<&Path> {
        self.shared.path.as_deref()
    }

    fn is_open(&self) -> bool {
        self.lock().is_ok_and(|state| state.conn.is_some())
    }

    fn close(&self) -> Result<()> {
        let mut state = self.lock()?;
        state.transactions.clear();
        state.child_failed = false;
        state.owner = None;
        let conn = state.conn.take();
        drop(state);
        self.shared.released.notify_all();
        match conn {
            Some(conn) => conn.close().map_err(|(_, err)| engine(err)),
            None => Ok(()),
        }
    }
}
