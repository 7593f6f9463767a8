//! Repository over the local cache.
//!
//! One struct, split by concern: the session singleton, the library and share
//! caches, reader preferences and state, the outbox, and the small singletons
//! (sync checkpoint, UI settings). Every query lives in `queries/`.

mod cache;
mod outbox;
mod reader;
mod session;
mod settings;

use crate::Database;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

pub use self::outbox::DEFAULT_PENDING_LIMIT;

/// Cheaply cloneable handle used by the UI, the library service and the sync worker.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    locks: Arc<WriteLocks>,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self {
            pool: db.pool().clone(),
            locks: Arc::clone(db.locks()),
        }
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            locks: Arc::default(),
        }
    }

    /// Held for a whole read-bump-write of the preferences row, so that
    /// concurrent patches each see the version the previous one wrote.
    pub async fn lock_preferences(&self) -> MutexGuard<'_, ()> {
        self.locks.preferences.lock().await
    }

    /// As [`Repository::lock_preferences`], for the reader state row.
    pub async fn lock_reader_state(&self) -> MutexGuard<'_, ()> {
        self.locks.reader_state.lock().await
    }
}

/// One lock per versioned singleton. Shared by every repository over the
/// same [`Database`].
#[derive(Debug, Default)]
pub(crate) struct WriteLocks {
    preferences: Mutex<()>,
    reader_state: Mutex<()>,
}

#[cfg(test)]
pub(crate) async fn test_repository() -> Repository {
    let db = Database::connect_in_memory().await.unwrap();
    Repository::from(&db)
}
