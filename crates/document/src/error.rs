//! Document Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. The display strings double as the
//! messages shown on the reader's status line, so keep them short.

use derive_more::{Display, Error};

/// A document loading error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for document operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The file extension does not map onto any adapter.
    #[display("unsupported document format")]
    UnsupportedFormat,
    /// The file could not be opened or read.
    #[display("I/O error")]
    Io,
    /// The PDF container itself could not be parsed.
    #[display("invalid pdf")]
    InvalidPdf,
    /// Every page came back without text; nothing to show.
    #[display("pdf has no extractable text (likely scanned/image-only)")]
    NoExtractableText,
    /// The EPUB zip archive is unreadable.
    #[display("invalid epub: unreadable archive")]
    Archive,
    #[display("invalid epub: missing META-INF/container.xml")]
    MissingContainer,
    #[display("invalid epub: missing rootfile path")]
    MissingRootfile,
    #[display("invalid epub: missing OPF {_0}")]
    MissingPackage(#[error(not(source))] String),
    #[display("invalid epub: empty manifest or spine")]
    EmptySpine,
    #[display("invalid epub: no readable chapters")]
    NoReadableChapters,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // A file is either readable or it is not; only raw I/O might be a
        // transient condition (network mounts and the like).
        matches!(self, Self::Io)
    }
}
