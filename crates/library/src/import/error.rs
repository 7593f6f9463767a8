//! Error types for the [`import`](super) module.

use derive_more::{Display, Error};

/// An import error with automatic location tracking via [`exn::Exn`].
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for import operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of an import failure.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is unusable (no title, unknown format, ...).
    #[display("{_0}")]
    Validation(#[error(not(source))] String),
    /// Reading the source or writing the copy failed.
    #[display("could not copy the book file")]
    Io,
    /// The server refused or could not be reached.
    #[display("{_0}")]
    Remote(#[error(not(source))] String),
    /// The local cache could not be updated.
    #[display("local cache error")]
    Cache,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io | Self::Remote(_))
    }
}
