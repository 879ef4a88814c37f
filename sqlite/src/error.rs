//! Conversion and classification of SQLite errors.

use rusqlite::ErrorCode;
use sqlguard_core::Error;

/// Wraps a rusqlite error as an engine error without altering it.
pub(crate) fn engine(err: rusqlite::Error) -> Error {
    Error::engine(err)
}

/// Returns the rusqlite error carried by `err`, if any.
pub fn sqlite_error(err: &Error) -> Option<&rusqlite::Error> {
    err.engine_source()?.downcast_ref::<rusqlite::Error>()
}

/// Returns `true` if `err` reports an unreadable database file
/// (`SQLITE_CORRUPT` or `SQLITE_NOTADB`).
pub fn is_corruption(err: &Error) -> bool {
    sqlite_error(err)
        .and_then(rusqlite::Error::sqlite_error_code)
        .is_some_and(|code| matches!(code, ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase))
}
