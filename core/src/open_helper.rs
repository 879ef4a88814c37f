//! Open-helper layer: the factories that hand out database connections, and
//! the wrappers that put the lifecycle guard beneath them and the
//! cache-controlled proxy on top of them.
//!
//! A typical stack, from the outside in:
//!
//! ```text
//! CacheControlledOpenHelperFactory      -> every database handed out is proxied
//!   GuardedOpenHelperFactory            -> the callback is wrapped in a LifecycleGuard
//!     <engine factory>                  -> opens the file and drives the callback
//! ```
//!
//! built with [`OpenHelperFactoryExt`]:
//!
//! ```ignore
//! let factory = SqliteOpenHelperFactory::new()
//!     .with_lifecycle_guard(invalidation)
//!     .as_cache_controlled();
//! ```

use std::fmt;
use std::sync::Arc;

use tracing::{Span, debug, info_span};

use crate::config::DatabaseConfig;
use crate::database::Database;
use crate::error::Result;
use crate::lifecycle::{InvalidationCallback, LifecycleGuard, OpenHelperCallback};
use crate::proxy::CacheControlledDatabase;

/// Everything an engine factory needs to open one database.
#[derive(Clone)]
pub struct Configuration {
    /// File, naming, and tuning settings.
    pub config: DatabaseConfig,
    /// Callback driven while opening.
    pub callback: Arc<dyn OpenHelperCallback>,
}

impl Configuration {
    /// Pairs `config` with `callback`.
    pub fn new(config: DatabaseConfig, callback: Arc<dyn OpenHelperCallback>) -> Self {
        Self { config, callback }
    }
}

impl fmt::Debug for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Configuration")
            .field("config", &self.config)
            .field("version", &self.callback.version())
            .finish()
    }
}

/// Opens (and caches) one database.
pub trait OpenHelper: Send + Sync {
    /// Connection type handed out.
    type Database: Database;

    /// Logical database name.
    fn database_name(&self) -> &str;

    /// Opens the database for reading and writing, running the lifecycle
    /// callbacks on first use.
    fn writable_database(&self) -> Result<Self::Database>;

    /// Opens the database for reading.
    fn readable_database(&self) -> Result<Self::Database>;

    /// Closes the cached database, if open.
    fn close(&self) -> Result<()>;
}

/// Creates [`OpenHelper`]s from a [`Configuration`].
pub trait OpenHelperFactory {
    /// Helper type produced.
    type Helper: OpenHelper;

    /// Creates a helper for `configuration`.
    fn create(&self, configuration: Configuration) -> Self::Helper;
}

/// Helper whose databases are wrapped in [`CacheControlledDatabase`].
pub struct CacheControlledOpenHelper<H> {
    delegate: H,
}

impl<H: OpenHelper> CacheControlledOpenHelper<H> {
    /// Wraps `delegate`.
    pub fn new(delegate: H) -> Self {
        Self { delegate }
    }
}

impl<H: OpenHelper> OpenHelper for CacheControlledOpenHelper<H> {
    type Database = CacheControlledDatabase<H::Database>;

    fn database_name(&self) -> &str {
        self.delegate.database_name()
    }

    fn writable_database(&self) -> Result<Self::Database> {
        self.delegate.writable_database().map(CacheControlledDatabase::new)
    }

    fn readable_database(&self) -> Result<Self::Database> {
        self.delegate.readable_database().map(CacheControlledDatabase::new)
    }

    fn close(&self) -> Result<()> {
        self.delegate.close()
    }
}

/// Factory producing [`CacheControlledOpenHelper`]s.
pub struct CacheControlledOpenHelperFactory<F> {
    delegate: F,
}

impl<F: OpenHelperFactory> OpenHelperFactory for CacheControlledOpenHelperFactory<F> {
    type Helper = CacheControlledOpenHelper<F::Helper>;

    fn create(&self, configuration: Configuration) -> Self::Helper {
        CacheControlledOpenHelper::new(self.delegate.create(configuration))
    }
}

/// Factory that wraps every configuration's callback in a
/// [`LifecycleGuard`] before handing it to the engine factory.
pub struct GuardedOpenHelperFactory<F> {
    invalidation: InvalidationCallback,
    delegate: F,
}

impl<F: OpenHelperFactory> GuardedOpenHelperFactory<F> {
    /// Guards helpers created by `delegate`, firing `invalidation` when a
    /// database is judged untrustworthy.
    pub fn new(invalidation: InvalidationCallback, delegate: F) -> Self {
        Self {
            invalidation,
            delegate,
        }
    }
}

impl<F: OpenHelperFactory> OpenHelperFactory for GuardedOpenHelperFactory<F> {
    type Helper = F::Helper;

    fn create(&self, configuration: Configuration) -> Self::Helper {
        let span: Span = info_span!("database", name = %configuration.config.name);
        debug!(parent: &span, "Creating open helper");
        let guard = LifecycleGuard::with_span(
            Arc::clone(&self.invalidation),
            configuration.callback,
            span,
        );
        self.delegate.create(Configuration {
            config: configuration.config,
            callback: Arc::new(guard),
        })
    }
}

/// Composition helpers for [`OpenHelperFactory`].
pub trait OpenHelperFactoryExt: OpenHelperFactory + Sized {
    /// Proxies every database the produced helpers hand out.
    fn as_cache_controlled(self) -> CacheControlledOpenHelperFactory<Self> {
        CacheControlledOpenHelperFactory { delegate: self }
    }

    /// Wraps every configuration's callback in a [`LifecycleGuard`].
    fn with_lifecycle_guard(self, invalidation: InvalidationCallback) -> GuardedOpenHelperFactory<Self> {
        GuardedOpenHelperFactory::new(invalidation, self)
    }
}

impl<F: OpenHelperFactory> OpenHelperFactoryExt for F {}
