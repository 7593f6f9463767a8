//! API Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Callers branch on the helpers
//! ([`is_transient`](ErrorKind::is_transient), [`is_auth`](ErrorKind::is_auth),
//! [`is_gone`](ErrorKind::is_gone)) rather than on raw status codes.

use derive_more::{Display, Error};

/// An API error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for API operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Longest response body (in characters) kept in a [`Status`](ErrorKind::Status) error.
pub const BODY_PREVIEW_CHARS: usize = 280;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Local input problem; never sent to the server and never retried.
    #[display("{_0}")]
    Validation(#[error(not(source))] String),
    /// The server answered with a non-success status.
    #[display("{operation} failed ({status}): {body}")]
    Status {
        operation: &'static str,
        status: u16,
        body: String,
    },
    /// Connection refused, DNS failure, timeout, and friends.
    #[display("{_0} failed: server unreachable")]
    Transport(#[error(not(source))] &'static str),
    /// The call needs a token the client does not hold.
    #[display("missing {_0} token")]
    MissingToken(#[error(not(source))] &'static str),
    /// The server answered successfully but the body did not decode.
    #[display("{_0} failed: unexpected response body")]
    Decode(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Build a [`Status`](Self::Status) error, truncating the body preview.
    pub fn status(operation: &'static str, status: u16, body: &str) -> Self {
        Self::Status {
            operation,
            status,
            body: preview(body),
        }
    }

    /// HTTP 5xx, 408, 429, or no response at all.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status >= 500 || *status == 408 || *status == 429,
            Self::Transport(_) => true,
            _ => false,
        }
    }

    /// HTTP 401/403, or no token to send in the first place.
    pub fn is_auth(&self) -> bool {
        match self {
            Self::Status { status, .. } => *status == 401 || *status == 403,
            Self::MissingToken(_) => true,
            _ => false,
        }
    }

    /// HTTP 404/410.
    pub fn is_gone(&self) -> bool {
        matches!(self, Self::Status { status: 404 | 410, .. })
    }

    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        self.is_transient()
    }
}

fn preview(body: &str) -> String {
    body.trim().chars().take(BODY_PREVIEW_CHARS).collect()
}
