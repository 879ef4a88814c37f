//! Error types for proxied database access and schema lifecycle operations.
//!
//! Engine failures are carried unchanged as the source of
//! [`Error::Engine`]; every other variant is raised by this layer itself.

use thiserror::Error;

/// Boxed engine error, kept as the `source` of [`Error::Engine`].
pub type EngineError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while proxying statements or running the
/// schema lifecycle.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure reported by the underlying engine (syntax, constraint, I/O).
    #[error("engine error: {0}")]
    Engine(#[source] EngineError),

    /// A where clause was supplied but contains only whitespace.
    #[error("where clause must not be blank; pass no clause to affect all rows")]
    BlankWhereClause,

    /// An update was requested without any column values.
    #[error("empty values for update of table '{0}'")]
    EmptyValues(String),

    /// The supplied migration steps do not form a valid chain.
    #[error("invalid migration chain: {0}")]
    InvalidMigrationChain(String),

    /// No sequence of migration steps leads from `from` to `to`.
    #[error("no migration path from version {from} to {to}")]
    NoMigrationPath { from: i32, to: i32 },

    /// The stored schema is newer than the version this build understands.
    #[error("can't downgrade database from version {from} to {to}")]
    Downgrade { from: i32, to: i32 },

    /// Dropping and recreating the schema was requested.
    #[error("destructive migration is not supported")]
    DestructiveMigration,

    /// The schema had to be created from scratch, meaning the persisted
    /// store was missing or unreadable.
    #[error("database was created from scratch; the persisted store is missing or unreadable")]
    UnexpectedCreate,

    /// A scalar query produced no rows.
    #[error("query returned no rows")]
    NoRows,

    /// A transaction operation was issued outside of a transaction.
    #[error("no transaction is in progress")]
    NoTransaction,

    /// The connection has been closed.
    #[error("database is closed")]
    Closed,

    /// A thread panicked while holding the connection lock.
    #[error("connection lock poisoned")]
    LockPoisoned,

    /// File I/O failure (configuration files, database templates).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wraps an engine failure without altering it.
    pub fn engine(err: impl Into<EngineError>) -> Self {
        Error::Engine(err.into())
    }

    /// Returns the engine failure carried by this error, if any.
    pub fn engine_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::Engine(source) => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Convenience alias for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
