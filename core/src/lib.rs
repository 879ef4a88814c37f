//! Statement-cache-defeating SQL proxy and fail-closed schema lifecycle.
//!
//! Embedded SQL engines cache compiled statements keyed by their exact text.
//! After a backup restore or a corruption recovery swaps the database file
//! underneath a live connection, such a cache can hand back plans compiled
//! against the old file. This crate sits between the client and the engine
//! and makes sure no proxied statement ever hits that cache, and it governs
//! how a database may be opened, upgraded, and declared lost.
//!
//! # Architecture
//!
//! - **`rewrite`** — appends a unique marker comment to SQL text
//! - **`deferred`** — statements that recompile from fresh text on every execution
//! - **`query`** — query wrapper with a stable marker per instance
//! - **`proxy`** — [`CacheControlledDatabase`], routing every entry point through the above
//! - **`migration`** — validated, ordered [`MigrationChain`]
//! - **`lifecycle`** — [`LifecycleGuard`] and [`MigrationCallback`], the fail-closed open policy
//! - **`open_helper`** — factory layer composing the guard and the proxy
//! - **`config`** — YAML-loadable [`DatabaseConfig`]
//!
//! The engine itself is abstracted by the [`Database`], [`Statement`], and
//! [`Query`] traits; `sqlguard-sqlite` implements them over SQLite.
//!
//! # Quick start
//!
//! ```ignore
//! use sqlguard_core::{CacheControlledDatabase, Database};
//!
//! let db = CacheControlledDatabase::new(raw_connection);
//! db.exec_sql("CREATE TABLE clouds (id INTEGER PRIMARY KEY, type TEXT)")?;
//!
//! // Every execution compiles fresh text: "UPDATE clouds ... -- <uuid>"
//! let mut statement = db.compile_statement("UPDATE clouds SET type = ? WHERE id = ?")?;
//! statement.bind_string(1, "DROPBOX")?;
//! statement.bind_long(2, 1)?;
//! statement.execute_update_delete()?;
//! ```

pub mod config;
pub mod cursor;
pub mod database;
pub mod deferred;
pub mod error;
pub mod lifecycle;
pub mod lowering;
pub mod migration;
pub mod open_helper;
pub mod proxy;
pub mod query;
pub mod rewrite;
pub mod statement;
pub mod value;

pub use config::DatabaseConfig;
pub use cursor::Cursor;
pub use database::{Database, run_in_transaction};
pub use deferred::{BindingOp, DeferredStatement};
pub use error::{EngineError, Error, Result};
pub use lifecycle::{InvalidationCallback, LifecycleGuard, MigrationCallback, OpenHelperCallback};
pub use migration::{MigrationChain, MigrationStep};
pub use open_helper::{
    CacheControlledOpenHelper, CacheControlledOpenHelperFactory, Configuration,
    GuardedOpenHelperFactory, OpenHelper, OpenHelperFactory, OpenHelperFactoryExt,
};
pub use proxy::CacheControlledDatabase;
pub use query::CacheControlledQuery;
pub use statement::{Program, Query, SimpleQuery, Statement};
pub use value::{ConflictAlgorithm, ContentValues, Value};
