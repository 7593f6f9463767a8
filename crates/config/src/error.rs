//! Config Error Types

use derive_more::{Display, Error};

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A source (file or environment) could not be read or has the wrong shape.
    #[display("could not load configuration")]
    Load,
    #[display("invalid api base url: {_0}")]
    InvalidBaseUrl(#[error(not(source))] String),
    /// Neither `data_dir` nor a home directory to derive it from.
    #[display("could not determine a data directory")]
    NoDataDir,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
