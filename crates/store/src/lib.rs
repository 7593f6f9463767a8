//! Local store for libra-link.
//!
//! A single SQLite database mirrors what the client has seen from the server
//! (session, library, shares, preferences, reader state) and holds the outbox
//! of mutations still waiting to be acknowledged.

mod db;
pub mod error;
pub mod models;
mod repo;
pub mod session_file;
pub mod timestamp;

pub use crate::db::Database;
pub use crate::repo::{DEFAULT_PENDING_LIMIT, Repository};
