//! Query wrapper whose rewritten text is stable for the life of the wrapper.
//!
//! Some engine paths read a query's text several times for one logical
//! execution (once to plan, again to materialize the cursor) and need the
//! same bytes each time. [`CacheControlledQuery`] assigns one marker per
//! distinct source text and keeps it for as long as the wrapper lives,
//! while a new wrapper, and therefore each new logical execution, gets a
//! new marker.
//!
//! # Examples
//!
//! ```
//! use sqlguard_core::{CacheControlledQuery, Query, SimpleQuery};
//!
//! let query = CacheControlledQuery::new(SimpleQuery::new("SELECT * FROM vaults"));
//! assert_eq!(query.sql(), query.sql());
//!
//! let other = CacheControlledQuery::new(SimpleQuery::new("SELECT * FROM vaults"));
//! assert_ne!(query.sql(), other.sql());
//! ```

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::error::Result;
use crate::rewrite::{RewriteMarker, rewrite_with_marker};
use crate::statement::{Program, Query};

/// Wraps a [`Query`] and rewrites its text with a per-instance stable marker.
pub struct CacheControlledQuery<Q> {
    delegate: Q,
    markers: Mutex<HashMap<String, RewriteMarker>>,
}

impl<Q: Query> CacheControlledQuery<Q> {
    /// Wraps `delegate`.
    pub fn new(delegate: Q) -> Self {
        Self {
            delegate,
            markers: Mutex::new(HashMap::new()),
        }
    }

    /// The wrapped query.
    pub fn delegate(&self) -> &Q {
        &self.delegate
    }

    /// Returns the marker assigned to `sql`, assigning one on first use.
    ///
    /// The lookup and the insertion happen under one lock, so concurrent
    /// first readers all observe the marker of whichever got there first.
    fn marker_for(&self, sql: &str) -> RewriteMarker {
        // Entries are only ever inserted whole, so a poisoned map is still consistent.
        let mut markers = self.markers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(marker) = markers.get(sql) {
            return *marker;
        }
        let marker = RewriteMarker::generate();
        markers.insert(sql.to_string(), marker);
        marker
    }
}

impl<Q: Query> Query for CacheControlledQuery<Q> {
    fn sql(&self) -> String {
        let sql = self.delegate.sql();
        let marker = self.marker_for(&sql);
        rewrite_with_marker(&sql, &marker)
    }

    fn arg_count(&self) -> usize {
        self.delegate.arg_count()
    }

    fn bind_to(&self, program: &mut dyn Program) -> Result<()> {
        self.delegate.bind_to(program)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::statement::SimpleQuery;

    /// Query whose text alternates between two statements on each read.
    struct Alternating {
        reads: AtomicUsize,
    }

    impl Query for Alternating {
        fn sql(&self) -> String {
            if self.reads.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
                "SELECT 1".to_string()
            } else {
                "SELECT 2".to_string()
            }
        }

        fn arg_count(&self) -> usize {
            0
        }

        fn bind_to(&self, _program: &mut dyn Program) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_repeated_reads_are_identical() {
        let query = CacheControlledQuery::new(SimpleQuery::new("SELECT * FROM clouds"));
        let first = query.sql();
        for _ in 0..50 {
            assert_eq!(query.sql(), first);
        }
        assert!(first.starts_with("SELECT * FROM clouds -- "));
    }

    #[test]
    fn test_distinct_texts_get_distinct_markers() {
        let query = CacheControlledQuery::new(Alternating {
            reads: AtomicUsize::new(0),
        });
        let one_a = query.sql();
        let two_a = query.sql();
        let one_b = query.sql();
        let two_b = query.sql();

        assert_eq!(one_a, one_b);
        assert_eq!(two_a, two_b);
        assert_ne!(one_a, two_a);

        let marker = |s: &str| s.split_once(" -- ").unwrap().1.to_string();
        assert_ne!(marker(&one_a), marker(&two_a));
    }

    #[test]
    fn test_markers_are_per_instance() {
        let a = CacheControlledQuery::new(SimpleQuery::new("SELECT 1"));
        let b = CacheControlledQuery::new(SimpleQuery::new("SELECT 1"));
        assert_ne!(a.sql(), b.sql());
    }

    #[test]
    fn test_concurrent_first_readers_agree() {
        let query = CacheControlledQuery::new(SimpleQuery::new("SELECT * FROM vaults"));
        let seen: HashSet<String> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..16).map(|_| scope.spawn(|| query.sql())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_arguments_forwarded() {
        let query = CacheControlledQuery::new(SimpleQuery::with_args(
            "SELECT ?",
            vec![crate::Value::Integer(1)],
        ));
        assert_eq!(query.arg_count(), 1);
    }
}
