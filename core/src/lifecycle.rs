//! Open-time lifecycle callbacks and the fail-closed guard around them.
//!
//! The engine drives an [`OpenHelperCallback`] while opening a database:
//! `configure` first, then exactly one of `create`, `upgrade`, or
//! `downgrade` depending on the stored version, then `open`. `corruption`
//! is raised whenever the stored file cannot be read.
//!
//! [`LifecycleGuard`] wraps the application's callback and enforces the
//! policy around it:
//!
//! - foreign keys are always enforced;
//! - creating the schema from scratch means the persisted store was lost,
//!   so the invalidation callback fires before the delegate runs;
//! - corruption always fires the invalidation callback after the delegate's
//!   recovery, whether that recovery succeeded, failed, or panicked.
//!
//! [`MigrationCallback`] is the application-side callback: it upgrades
//! through a [`MigrationChain`] and refuses both schema creation and
//! destructive migration.

use std::fmt;
use std::sync::Arc;

use tracing::{Span, debug, debug_span, error, info, warn};

use crate::database::Database;
use crate::error::{Error, Result};
use crate::migration::MigrationChain;

/// Hook invoked when the persisted database can no longer be trusted.
pub type InvalidationCallback = Arc<dyn Fn() + Send + Sync>;

/// Callbacks the engine invokes while opening a database.
pub trait OpenHelperCallback: Send + Sync {
    /// Schema version the application expects.
    fn version(&self) -> i32;

    /// Configures the connection before the version is inspected.
    fn on_configure(&self, _db: &dyn Database) -> Result<()> {
        Ok(())
    }

    /// Creates the schema in an empty database.
    fn on_create(&self, db: &dyn Database) -> Result<()>;

    /// Upgrades the schema from `old_version` to `new_version`.
    fn on_upgrade(&self, db: &dyn Database, old_version: i32, new_version: i32) -> Result<()>;

    /// Handles a stored version newer than [`version`](Self::version).
    ///
    /// Downgrading is never supported, so the default fails.
    fn on_downgrade(&self, _db: &dyn Database, old_version: i32, new_version: i32) -> Result<()> {
        Err(Error::Downgrade {
            from: old_version,
            to: new_version,
        })
    }

    /// Attempts to recover a database whose file could not be read.
    fn on_corruption(&self, _db: &dyn Database) -> Result<()> {
        Ok(())
    }

    /// Called once the database is open and at the expected version.
    fn on_open(&self, _db: &dyn Database) -> Result<()> {
        Ok(())
    }
}

/// Fires the invalidation callback when dropped.
struct InvalidateOnDrop<'a>(&'a InvalidationCallback);

impl Drop for InvalidateOnDrop<'_> {
    fn drop(&mut self) {
        (self.0)();
    }
}

/// Callback wrapper enforcing foreign keys and firing the invalidation hook
/// on create and on corruption.
pub struct LifecycleGuard {
    invalidation: InvalidationCallback,
    delegate: Arc<dyn OpenHelperCallback>,
    span: Span,
}

impl LifecycleGuard {
    /// Wraps `delegate`, firing `invalidation` when the store is judged
    /// untrustworthy.
    pub fn new(invalidation: InvalidationCallback, delegate: Arc<dyn OpenHelperCallback>) -> Self {
        Self::with_span(invalidation, delegate, debug_span!("lifecycle"))
    }

    /// Like [`new`](Self::new), logging under `span`.
    pub fn with_span(
        invalidation: InvalidationCallback,
        delegate: Arc<dyn OpenHelperCallback>,
        span: Span,
    ) -> Self {
        Self {
            invalidation,
            delegate,
            span,
        }
    }
}

impl fmt::Debug for LifecycleGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleGuard")
            .field("version", &self.delegate.version())
            .finish_non_exhaustive()
    }
}

fn describe(db: &dyn Database) -> String {
    db.path()
        .map_or_else(|| ":memory:".to_string(), |p| p.display().to_string())
}

impl OpenHelperCallback for LifecycleGuard {
    fn version(&self) -> i32 {
        self.delegate.version()
    }

    fn on_configure(&self, db: &dyn Database) -> Result<()> {
        debug!(parent: &self.span, db = %describe(db), "Called on_configure");
        db.set_foreign_key_constraints_enabled(true)?;
        self.delegate.on_configure(db)
    }

    fn on_create(&self, db: &dyn Database) -> Result<()> {
        // Only reachable when the persisted store is missing or unreadable.
        error!(parent: &self.span, db = %describe(db), "Called on_create; invalidating database");
        (self.invalidation)();
        self.delegate.on_create(db)
    }

    fn on_upgrade(&self, db: &dyn Database, old_version: i32, new_version: i32) -> Result<()> {
        info!(parent: &self.span, db = %describe(db), old_version, new_version, "Called on_upgrade");
        self.delegate.on_upgrade(db, old_version, new_version)
    }

    fn on_downgrade(&self, db: &dyn Database, old_version: i32, new_version: i32) -> Result<()> {
        error!(parent: &self.span, db = %describe(db), old_version, new_version, "Called on_downgrade");
        self.delegate.on_downgrade(db, old_version, new_version)
    }

    fn on_corruption(&self, db: &dyn Database) -> Result<()> {
        warn!(parent: &self.span, db = %describe(db), "Called on_corruption");
        let _invalidate = InvalidateOnDrop(&self.invalidation);
        self.delegate.on_corruption(db)
    }

    fn on_open(&self, db: &dyn Database) -> Result<()> {
        self.delegate.on_open(db)
    }
}

/// Application callback that upgrades through a [`MigrationChain`].
///
/// Schema creation fails closed with [`Error::UnexpectedCreate`]: an empty
/// database at open time means the real one was lost, and recreating it
/// silently would hide that. When the chain has no path, the open fails
/// with [`Error::NoMigrationPath`], or, if destructive fallback was
/// requested, with [`Error::DestructiveMigration`].
#[derive(Debug)]
pub struct MigrationCallback {
    chain: MigrationChain,
    destructive_fallback: bool,
    span: Span,
}

impl MigrationCallback {
    /// Creates a callback upgrading through `chain` to its current version.
    pub fn new(chain: MigrationChain) -> Self {
        Self {
            chain,
            destructive_fallback: false,
            span: debug_span!("database"),
        }
    }

    /// Routes a missing migration path to
    /// [`on_destructive_migration`](Self::on_destructive_migration).
    pub fn fallback_to_destructive_migration(mut self) -> Self {
        self.destructive_fallback = true;
        self
    }

    /// Replaces the span the callback logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// The chain upgrades run through.
    pub fn chain(&self) -> &MigrationChain {
        &self.chain
    }

    /// Called instead of dropping and recreating the schema. Always fails.
    pub fn on_destructive_migration(&self, db: &dyn Database) -> Result<()> {
        error!(parent: &self.span, db = %describe(db), "Destructive migration requested");
        Err(Error::DestructiveMigration)
    }
}

impl OpenHelperCallback for MigrationCallback {
    fn version(&self) -> i32 {
        self.chain.current_version()
    }

    fn on_create(&self, db: &dyn Database) -> Result<()> {
        error!(parent: &self.span, db = %describe(db), "Refusing to create database from scratch");
        Err(Error::UnexpectedCreate)
    }

    fn on_upgrade(&self, db: &dyn Database, old_version: i32, new_version: i32) -> Result<()> {
        match self.chain.execute(db, old_version, new_version) {
            Err(Error::NoMigrationPath { .. }) if self.destructive_fallback => {
                self.on_destructive_migration(db)
            }
            other => other,
        }
    }

    fn on_open(&self, db: &dyn Database) -> Result<()> {
        let version = db.version()?;
        info!(parent: &self.span, version, "Opened database");
        Ok(())
    }
}
