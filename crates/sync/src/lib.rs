//! Background replay of the local outbox.
//!
//! Runs beside the UI and talks to it only through the store and a
//! [`SyncHandle`].

mod backoff;
pub mod error;
mod worker;

pub use crate::backoff::{backoff_delay, next_attempt_at};
pub use crate::worker::{DEFAULT_INTERVAL, DrainSummary, SyncHandle, SyncStatus, SyncWorker, to_sync_event};
