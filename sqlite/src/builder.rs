//! One-call assembly of a guarded, cache-controlled SQLite database.

use std::sync::Arc;

use sqlguard_core::{
    CacheControlledDatabase, Configuration, DatabaseConfig, InvalidationCallback,
    MigrationCallback, MigrationChain, MigrationStep, OpenHelper, OpenHelperFactory,
    OpenHelperFactoryExt, Result,
};
use tracing::{info, info_span};

use crate::database::SqliteDatabase;
use crate::open_helper::SqliteOpenHelperFactory;

/// Builds a [`CacheControlledDatabase`] over SQLite.
///
/// The open helper is wrapped in the lifecycle guard and its databases in
/// the cache-controlled proxy. [`build`](Self::build) opens eagerly, so a
/// store that cannot be migrated is reported before first use.
///
/// # Examples
///
/// ```no_run
/// use sqlguard_core::{DatabaseConfig, MigrationStep};
/// use sqlguard_sqlite::DatabaseBuilder;
///
/// let db = DatabaseBuilder::new(DatabaseConfig::file("vaults.db"))
///     .version(2)
///     .min_supported_version(1)
///     .add_migrations([MigrationStep::sql(
///         1,
///         2,
///         ["ALTER TABLE vaults ADD COLUMN position INTEGER"],
///     )])
///     .invalidation_callback(|| eprintln!("vault database lost"))
///     .build()
///     .unwrap();
/// ```
pub struct DatabaseBuilder {
    config: DatabaseConfig,
    steps: Vec<MigrationStep>,
    min_supported: i32,
    version: i32,
    invalidation: InvalidationCallback,
    destructive_fallback: bool,
}

impl DatabaseBuilder {
    /// Starts a builder for the database described by `config`, at version 1
    /// with no migrations.
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            steps: Vec::new(),
            min_supported: 1,
            version: 1,
            invalidation: Arc::new(|| {}),
            destructive_fallback: false,
        }
    }

    /// Adds upgrade steps.
    pub fn add_migrations(mut self, steps: impl IntoIterator<Item = MigrationStep>) -> Self {
        self.steps.extend(steps);
        self
    }

    /// Oldest stored version that can still be upgraded.
    pub fn min_supported_version(mut self, version: i32) -> Self {
        self.min_supported = version;
        self
    }

    /// Schema version the application expects.
    pub fn version(mut self, version: i32) -> Self {
        self.version = version;
        self
    }

    /// Hook fired when the stored database is lost or unreadable.
    pub fn invalidation_callback(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.invalidation = Arc::new(callback);
        self
    }

    /// Routes a missing migration path to the destructive-migration hook,
    /// which refuses it.
    pub fn fallback_to_destructive_migration(mut self) -> Self {
        self.destructive_fallback = true;
        self
    }

    /// Validates the migrations and opens the database.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidMigrationChain`](sqlguard_core::Error::InvalidMigrationChain)
    /// for an inconsistent set of steps, and any error raised while opening:
    /// [`UnexpectedCreate`](sqlguard_core::Error::UnexpectedCreate) for a
    /// missing store, [`NoMigrationPath`](sqlguard_core::Error::NoMigrationPath)
    /// for a version that cannot be upgraded, or an engine error.
    pub fn build(self) -> Result<CacheControlledDatabase<SqliteDatabase>> {
        let span = info_span!("database", name = %self.config.name);
        info!(parent: &span, version = self.version, min_supported = self.min_supported, "Building database");

        let chain = MigrationChain::new(self.min_supported, self.version, self.steps)?
            .with_span(span.clone());
        let mut callback = MigrationCallback::new(chain).with_span(span.clone());
        if self.destructive_fallback {
            callback = callback.fallback_to_destructive_migration();
        }

        let helper = SqliteOpenHelperFactory::new()
            .with_lifecycle_guard(self.invalidation)
            .as_cache_controlled()
            .create(Configuration::new(self.config, Arc::new(callback)));
        let db = helper.writable_database()?;
        info!(parent: &span, "Database built successfully");
        Ok(db)
    }
}
