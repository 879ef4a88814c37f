//! Opening a SQLite database and driving the lifecycle callbacks.
//!
//! [`SqliteOpenHelper`] runs the open protocol once and caches the result:
//!
//! 1. copy the configured template into place if the file is missing;
//! 2. open the connection and call `on_configure`;
//! 3. read the stored version;
//! 4. if the file proved unreadable in 2 or 3, call `on_corruption`, then
//!    reopen once (deleting the file first when the configuration allows
//!    data loss);
//! 5. bring the schema to the expected version: `on_create` for an empty
//!    store, `on_upgrade` or `on_downgrade` otherwise, inside a transaction
//!    that also stores the new version;
//! 6. call `on_open`.
//!
//! Once open, a corruption error on the live connection calls
//! `on_corruption` once for that connection.

use std::io;
use std::sync::{Arc, Mutex};

use sqlguard_core::{
    Configuration, Database, Error, OpenHelper, OpenHelperCallback, OpenHelperFactory, Result,
    run_in_transaction,
};
use tracing::{Span, debug, info, info_span, warn};

use crate::database::SqliteDatabase;
use crate::error::is_corruption;

/// Factory producing [`SqliteOpenHelper`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteOpenHelperFactory;

impl SqliteOpenHelperFactory {
    /// Creates the factory. It holds no state; every helper it creates
    /// opens its own connection.
    pub fn new() -> Self {
        Self
    }
}

impl OpenHelperFactory for SqliteOpenHelperFactory {
    type Helper = SqliteOpenHelper;

    fn create(&self, configuration: Configuration) -> SqliteOpenHelper {
        SqliteOpenHelper::new(configuration)
    }
}

/// Opens one SQLite database and runs its lifecycle callbacks.
pub struct SqliteOpenHelper {
    configuration: Configuration,
    database: Mutex<Option<SqliteDatabase>>,
    span: Span,
}

impl SqliteOpenHelper {
    /// Creates a helper for `configuration`. Nothing is opened until the
    /// first call to [`OpenHelper::writable_database`].
    pub fn new(configuration: Configuration) -> Self {
        let span = info_span!("open_helper", name = %configuration.config.name);
        Self {
            configuration,
            database: Mutex::new(None),
            span,
        }
    }

    fn callback(&self) -> &dyn OpenHelperCallback {
        self.configuration.callback.as_ref()
    }

    fn open(&self) -> Result<SqliteDatabase> {
        self.copy_template()?;
        let db = SqliteDatabase::open(&self.configuration.config)?;
        match self.configure(&db) {
            Ok(version) => self.finish_open(db, version),
            Err(err) if is_corruption(&err) => self.recover(db, &err),
            Err(err) => {
                let _ = db.close();
                Err(err)
            }
        }
    }

    fn copy_template(&self) -> Result<()> {
        let config = &self.configuration.config;
        let (Some(path), Some(template)) = (&config.path, &config.template) else {
            return Ok(());
        };
        if path.exists() {
            return Ok(());
        }
        info!(parent: &self.span, template = %template.display(), path = %path.display(), "Copying prepackaged database");
        std::fs::copy(template, path)?;
        Ok(())
    }

    fn configure(&self, db: &SqliteDatabase) -> Result<i32> {
        self.callback().on_configure(db)?;
        db.version()
    }

    fn recover(&self, db: SqliteDatabase, cause: &Error) -> Result<SqliteDatabase> {
        warn!(parent: &self.span, error = %cause, "Database file is unreadable");
        let recovered = self.callback().on_corruption(&db);
        let closed = db.close();
        recovered?;
        closed?;

        let config = &self.configuration.config;
        if config.allow_data_loss_on_recovery {
            if let Some(path) = &config.path {
                warn!(parent: &self.span, path = %path.display(), "Deleting unreadable database file");
                match std::fs::remove_file(path) {
                    Err(err) if err.kind() != io::ErrorKind::NotFound => return Err(err.into()),
                    _ => {}
                }
            }
        }

        let db = SqliteDatabase::open(config)?;
        let version = self.configure(&db)?;
        self.finish_open(db, version)
    }

    fn watch_corruption(&self, db: &SqliteDatabase) {
        let callback = Arc::clone(&self.configuration.callback);
        let span = self.span.clone();
        db.set_corruption_handler(Box::new(move |db: &SqliteDatabase| {
            if let Err(err) = callback.on_corruption(db) {
                warn!(parent: &span, error = %err, "Corruption callback failed");
            }
        }));
    }

    fn is_empty(db: &SqliteDatabase) -> Result<bool> {
        let cursor = db.query("SELECT count(*) FROM sqlite_master")?;
        let objects = cursor
            .row(0)
            .and_then(|row| row.first())
            .and_then(|value| value.as_i64())
            .unwrap_or(0);
        Ok(objects == 0)
    }

    fn finish_open(&self, db: SqliteDatabase, version: i32) -> Result<SqliteDatabase> {
        let callback = self.callback();
        let target = callback.version();
        if version != target {
            let result = run_in_transaction(&db, || {
                if version == 0 && Self::is_empty(&db)? {
                    callback.on_create(&db)?;
                } else if version < target {
                    callback.on_upgrade(&db, version, target)?;
                } else {
                    callback.on_downgrade(&db, version, target)?;
                }
                db.set_version(target)
            });
            if let Err(err) = result {
                let _ = db.close();
                return Err(err);
            }
        }
        callback.on_open(&db)?;
        self.watch_corruption(&db);
        debug!(parent: &self.span, version = target, "Database ready");
        Ok(db)
    }
}

impl OpenHelper for SqliteOpenHelper {
    type Database = SqliteDatabase;

    fn database_name(&self) -> &str {
        &self.configuration.config.name
    }

    fn writable_database(&self) -> Result<SqliteDatabase> {
        let mut cached = self.database.lock().map_err(|_| Error::LockPoisoned)?;
        if let Some(db) = cached.as_ref().filter(|db| db.is_open()) {
            return Ok(db.clone());
        }
        let db = self.open()?;
        *cached = Some(db.clone());
        Ok(db)
    }

    fn readable_database(&self) -> Result<SqliteDatabase> {
        // One connection serves reads and writes.
        self.writable_database()
    }

    fn close(&self) -> Result<()> {
        let mut cached = self.database.lock().map_err(|_| Error::LockPoisoned)?;
        match cached.take() {
            Some(db) => db.close(),
            None => Ok(()),
        }
    }
}
