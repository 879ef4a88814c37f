//! Versioned schema migration chain.
//!
//! A [`MigrationChain`] is assembled from single-version [`MigrationStep`]s
//! and validated up front: the steps must cover every version from the
//! minimum supported one up to (but excluding) the current schema version,
//! each exactly once. Declaration order does not matter; steps are always
//! applied in ascending version order.
//!
//! # Examples
//!
//! ```
//! use sqlguard_core::{MigrationChain, MigrationStep};
//!
//! let chain = MigrationChain::new(0, 3, vec![
//!     MigrationStep::sql(1, 2, ["ALTER TABLE vaults ADD COLUMN position INTEGER"]),
//!     MigrationStep::sql(0, 1, ["CREATE TABLE vaults (id INTEGER PRIMARY KEY)"]),
//!     MigrationStep::sql(2, 3, ["CREATE INDEX vaults_position ON vaults(position)"]),
//! ])
//! .unwrap();
//!
//! let order: Vec<_> = chain.steps().iter().map(|s| (s.from(), s.to())).collect();
//! assert_eq!(order, vec![(0, 1), (1, 2), (2, 3)]);
//!
//! // A gap is rejected at assembly time.
//! assert!(MigrationChain::new(0, 3, vec![MigrationStep::sql(0, 1, ["SELECT 1"])]).is_err());
//! ```

use std::fmt;

use tracing::{Span, debug_span, info};

use crate::database::Database;
use crate::error::{Error, Result};

type StepBody = Box<dyn Fn(&dyn Database) -> Result<()> + Send + Sync>;

/// Upgrade from one schema version to the next.
pub struct MigrationStep {
    from: i32,
    to: i32,
    body: StepBody,
}

impl MigrationStep {
    /// Creates a step whose `body` migrates a database from `from` to `to`.
    pub fn new(
        from: i32,
        to: i32,
        body: impl Fn(&dyn Database) -> Result<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            from,
            to,
            body: Box::new(body),
        }
    }

    /// Creates a step that executes `statements` in order.
    pub fn sql<I, S>(from: i32, to: i32, statements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let statements: Vec<String> = statements.into_iter().map(Into::into).collect();
        Self::new(from, to, move |db| {
            for statement in &statements {
                db.exec_sql(statement)?;
            }
            Ok(())
        })
    }

    /// Version this step starts from.
    pub fn from(&self) -> i32 {
        self.from
    }

    /// Version this step ends at.
    pub fn to(&self) -> i32 {
        self.to
    }

    /// Runs the step's body against `db`.
    pub fn migrate(&self, db: &dyn Database) -> Result<()> {
        (self.body)(db)
    }
}

impl fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .finish_non_exhaustive()
    }
}

/// Validated, ordered sequence of migration steps.
#[derive(Debug)]
pub struct MigrationChain {
    min_supported: i32,
    current: i32,
    steps: Vec<MigrationStep>,
    span: Span,
}

impl MigrationChain {
    /// Assembles a chain covering `[min_supported, current)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidMigrationChain`] if `current` is below
    /// `min_supported`, a step spans more or less than one version, a
    /// version is covered twice, a step lies outside the range, or a
    /// version in the range has no step.
    pub fn new(
        min_supported: i32,
        current: i32,
        steps: impl IntoIterator<Item = MigrationStep>,
    ) -> Result<Self> {
        if current < min_supported {
            return Err(Error::InvalidMigrationChain(format!(
                "current version {current} is below minimum supported version {min_supported}"
            )));
        }

        let mut steps: Vec<MigrationStep> = steps.into_iter().collect();
        steps.sort_by_key(|s| s.from);

        for step in &steps {
            if step.from.checked_add(1) != Some(step.to) {
                return Err(Error::InvalidMigrationChain(format!(
                    "step {} -> {} must advance exactly one version",
                    step.from, step.to
                )));
            }
            if step.from < min_supported || step.to > current {
                return Err(Error::InvalidMigrationChain(format!(
                    "step {} -> {} lies outside supported range {min_supported}..{current}",
                    step.from, step.to
                )));
            }
        }
        if let Some(pair) = steps.windows(2).find(|w| w[0].from == w[1].from) {
            return Err(Error::InvalidMigrationChain(format!(
                "duplicate step from version {}",
                pair[0].from
            )));
        }
        // Sorted, in range, and free of duplicates: any shortfall is a gap.
        if let Some(missing) = (min_supported..current).find(|v| {
            steps
                .get(v.abs_diff(min_supported) as usize)
                .is_none_or(|s| s.from != *v)
        }) {
            return Err(Error::InvalidMigrationChain(format!(
                "missing step from version {missing}"
            )));
        }

        Ok(Self {
            min_supported,
            current,
            steps,
            span: debug_span!("migration", min_supported, current),
        })
    }

    /// Replaces the span the chain logs under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Oldest schema version the chain can upgrade from.
    pub fn min_supported(&self) -> i32 {
        self.min_supported
    }

    /// Schema version the chain upgrades to.
    pub fn current_version(&self) -> i32 {
        self.current
    }

    /// All steps in ascending version order.
    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// The steps leading from `from` to `to`, in application order.
    ///
    /// Returns `None` if the chain does not cover that range or `to` is
    /// below `from`.
    pub fn path(&self, from: i32, to: i32) -> Option<&[MigrationStep]> {
        if from < self.min_supported || to > self.current || to < from {
            return None;
        }
        let start = from.abs_diff(self.min_supported) as usize;
        let end = to.abs_diff(self.min_supported) as usize;
        self.steps.get(start..end)
    }

    /// Applies the steps leading from `from` to `to`, each exactly once and
    /// in ascending order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoMigrationPath`] if the chain does not cover the
    /// range, or the first error raised by a step body.
    pub fn execute(&self, db: &dyn Database, from: i32, to: i32) -> Result<()> {
        let path = self.path(from, to).ok_or(Error::NoMigrationPath { from, to })?;
        for step in path {
            info!(parent: &self.span, from = step.from, to = step.to, "Applying migration step");
            step.migrate(db)?;
        }
        Ok(())
    }
}
