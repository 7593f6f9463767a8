//! Adding a book to the library.
//!
//! The source file is hashed, checked for duplicates (a local copy with the
//! same checksum, or a server ebook with the same checksum), copied into the
//! books directory as `<sha256><ext>` and registered with the server. If the
//! server refuses, the copy is removed again.

pub mod error;
mod file;

pub use self::file::{Duplicate, ImportOutcome, ImportRequest, REMOTE_DUPLICATE_SCAN, import_book};
