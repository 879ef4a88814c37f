//! SQL text rewriting that defeats the engine's statement cache.
//!
//! The engine keys its compiled-plan cache on the exact statement text.
//! Appending a trailing line comment carrying a random marker gives every
//! rewrite a text the engine has never seen, while the comment itself is
//! ignored by the SQL grammar.
//!
//! # Examples
//!
//! ```
//! use sqlguard_core::rewrite::{RewriteMarker, rewrite, rewrite_with_marker};
//!
//! let a = rewrite("SELECT 1");
//! let b = rewrite("SELECT 1");
//! assert_ne!(a, b);
//! assert!(a.starts_with("SELECT 1 -- "));
//!
//! let marker = RewriteMarker::generate();
//! assert_eq!(
//!     rewrite_with_marker("SELECT 1", &marker),
//!     rewrite_with_marker("SELECT 1", &marker),
//! );
//! ```

use std::fmt;

use uuid::Uuid;

use crate::error::{Error, Result};

/// Clause substituted when no where clause is given, selecting every row.
pub const ALL_ROWS_CLAUSE: &str = "1 = 1";

/// Unique token appended to SQL text.
///
/// Backed by a version 4 UUID drawn from a thread-safe random source, so
/// markers generated concurrently on different threads do not collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RewriteMarker(Uuid);

impl RewriteMarker {
    /// Generates a fresh marker.
    pub fn generate() -> Self {
        RewriteMarker(Uuid::new_v4())
    }
}

impl fmt::Display for RewriteMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

/// Appends a freshly generated marker to `sql`.
pub fn rewrite(sql: &str) -> String {
    rewrite_with_marker(sql, &RewriteMarker::generate())
}

/// Appends `marker` to `sql`.
///
/// The marker goes into a trailing `--` comment, which runs to the end of
/// the text and therefore cannot alter the statement.
pub fn rewrite_with_marker(sql: &str, marker: &RewriteMarker) -> String {
    format!("{sql} -- {marker}")
}

/// Validates an optional where clause and canonicalizes a missing one.
///
/// A missing clause becomes [`ALL_ROWS_CLAUSE`], keeping the unconditional
/// meaning while still producing a clause that can carry a marker. A clause
/// that is present but blank is ambiguous and is rejected.
///
/// # Errors
///
/// Returns [`Error::BlankWhereClause`] if `clause` is `Some` and contains
/// only whitespace.
///
/// # Examples
///
/// ```
/// use sqlguard_core::rewrite::checked_where_clause;
///
/// assert_eq!(checked_where_clause(None).unwrap(), "1 = 1");
/// assert_eq!(checked_where_clause(Some("id = ?")).unwrap(), "id = ?");
/// assert!(checked_where_clause(Some("   ")).is_err());
/// ```
pub fn checked_where_clause(clause: Option<&str>) -> Result<&str> {
    match clause {
        Some(clause) if clause.trim().is_empty() => Err(Error::BlankWhereClause),
        Some(clause) => Ok(clause),
        None => Ok(ALL_ROWS_CLAUSE),
    }
}
