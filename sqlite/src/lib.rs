//! SQLite backend for sqlguard.
//!
//! This crate implements the `sqlguard-core` engine traits over
//! [`rusqlite`] and provides the open helper that drives the lifecycle
//! callbacks.
//!
//! # Architecture
//!
//! - **`database`** — [`SqliteDatabase`], the raw connection with nested transactions
//! - **`statement`** — execution through rusqlite's prepared-statement cache
//! - **`open_helper`** — [`SqliteOpenHelper`], the open protocol and corruption recovery
//! - **`builder`** — [`DatabaseBuilder`], guarded and cache-controlled assembly
//!
//! # Quick start
//!
//! ```no_run
//! use sqlguard_core::{Database, DatabaseConfig, MigrationStep};
//! use sqlguard_sqlite::DatabaseBuilder;
//!
//! let db = DatabaseBuilder::new(DatabaseConfig::file("clouds.db"))
//!     .version(3)
//!     .min_supported_version(2)
//!     .add_migrations([MigrationStep::sql(2, 3, ["DROP TABLE update_check"])])
//!     .build()
//!     .unwrap();
//!
//! let clouds = db.query("SELECT * FROM clouds").unwrap();
//! println!("{} clouds", clouds.len());
//! ```
//!
//! # Working with the raw connection
//!
//! ```
//! use sqlguard_core::{CacheControlledDatabase, Database};
//! use sqlguard_sqlite::SqliteDatabase;
//!
//! let db = CacheControlledDatabase::new(SqliteDatabase::open_in_memory().unwrap());
//! db.exec_sql("CREATE TABLE t (x INTEGER)").unwrap();
//! db.exec_sql("INSERT INTO t VALUES (1)").unwrap();
//! assert_eq!(db.query("SELECT x FROM t").unwrap().len(), 1);
//! ```

mod builder;
mod database;
mod error;
mod open_helper;
mod statement;

pub use builder::DatabaseBuilder;
pub use database::SqliteDatabase;
pub use error::{is_corruption, sqlite_error};
pub use open_helper::{SqliteOpenHelper, SqliteOpenHelperFactory};
pub use statement::SqliteStatement;
