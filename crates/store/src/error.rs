//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A stored value could not be converted to or from its model.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    #[display("not found: {_0}")]
    NotFound(#[error(not(source))] &'static str),
    /// `session.json` could not be read, written or removed.
    #[display("session file error")]
    SessionFile,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY surfaces as a database error after the busy timeout.
        matches!(self, Self::Database | Self::SessionFile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_display() {
        assert_eq!(ErrorKind::InvalidData("payload").to_string(), "invalid cache data: payload");
        assert_eq!(ErrorKind::NotFound("outbox event").to_string(), "not found: outbox event");
        assert!(ErrorKind::Database.is_retryable());
        assert!(!ErrorKind::Migration.is_retryable());
    }
}
