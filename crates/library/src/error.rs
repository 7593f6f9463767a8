//! Library Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Submodules with more involved
//! failure modes (see [`import`](crate::import)) keep their own kinds and are
//! raised into these.

use derive_more::{Display, Error};
use libra_api::error::ErrorKind as RemoteErrorKind;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

/// What the UI should do about a failure.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad local input; show it inline and let the user fix it.
    #[display("{_0}")]
    Validation(#[error(not(source))] String),
    /// The server rejected our tokens; the user has to sign in again.
    #[display("session expired; please sign in again")]
    Unauthorized,
    /// The server no longer has the resource.
    #[display("no longer available")]
    Gone,
    /// Any other server failure, with the client's message.
    #[display("{_0}")]
    Remote(#[error(not(source))] String),
    #[display("local cache error")]
    Store,
    #[display("could not import book")]
    Import,
}

impl ErrorKind {
    /// Classify a failed remote call.
    pub fn from_remote(kind: &RemoteErrorKind) -> Self {
        if kind.is_auth() {
            Self::Unauthorized
        } else if kind.is_gone() {
            Self::Gone
        } else if let RemoteErrorKind::Validation(message) = kind {
            Self::Validation(message.clone())
        } else {
            Self::Remote(kind.to_string())
        }
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(_) | Self::Store)
    }
}

/// Raise a remote failure as the matching [`ErrorKind`], keeping the remote
/// error as the cause.
#[track_caller]
pub(crate) fn raise_remote(err: libra_api::error::Error) -> Error {
    let kind = ErrorKind::from_remote(&err);
    err.raise(kind)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(RemoteErrorKind::status("me", 401, ""), ErrorKind::Unauthorized)]
    #[case(RemoteErrorKind::MissingToken("access"), ErrorKind::Unauthorized)]
    #[case(RemoteErrorKind::status("borrow", 410, "gone"), ErrorKind::Gone)]
    #[case(RemoteErrorKind::Validation("bad".into()), ErrorKind::Validation("bad".into()))]
    #[case(
        RemoteErrorKind::status("list ebooks", 503, "down"),
        ErrorKind::Remote("list ebooks failed (503): down".into())
    )]
    fn test_from_remote(#[case] remote: RemoteErrorKind, #[case] expected: ErrorKind) {
        assert_eq!(ErrorKind::from_remote(&remote), expected);
    }
}
