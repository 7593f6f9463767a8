//! The operations behind each libra-link screen.
//!
//! Each function takes the [`Remote`](libra_api::Remote) and
//! [`Repository`](libra_store::Repository) it needs, talks to the server when
//! it can and falls back to (or queues in) the local store when it cannot.

pub mod catalog;
pub mod community;
pub mod error;
mod fetched;
pub mod import;
pub mod optimistic;
pub mod session;

pub use crate::fetched::Fetched;
pub use crate::optimistic::{QUEUED_MESSAGE, WriteOutcome};
pub use crate::session::{Bootstrap, Credentials, DeviceOutcome, SessionStore};
