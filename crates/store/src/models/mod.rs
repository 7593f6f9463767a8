//! Cached entities and their row representations.
//!
//! Models use `Option<UtcDateTime>` for timestamps the caller may leave unset;
//! the repository fills in "now" when writing them.

mod checkpoint;
mod ebook;
mod outbox;
mod preferences;
mod reader_state;
mod session;
mod share;
mod ui;

pub use self::checkpoint::SyncCheckpoint;
pub use self::ebook::CachedEbook;
pub use self::outbox::OutboxEvent;
pub use self::preferences::PreferencesCache;
pub use self::reader_state::ReaderStateCache;
pub use self::session::SessionState;
pub use self::share::CachedShare;
pub use self::ui::{GutterPreset, UiSettings};

pub(crate) use self::checkpoint::CheckpointRow;
pub(crate) use self::ebook::EbookRow;
pub(crate) use self::outbox::OutboxRow;
pub(crate) use self::preferences::PreferencesRow;
pub(crate) use self::reader_state::ReaderStateRow;
pub(crate) use self::session::SessionRow;
pub(crate) use self::share::ShareRow;
pub(crate) use self::ui::UiSettingsRow;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use uuid::Uuid;

pub(crate) fn parse_uuid(value: &str, field: &'static str) -> Result<Uuid> {
    Uuid::parse_str(value).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn parse_uuid_opt(value: Option<&str>, field: &'static str) -> Result<Option<Uuid>> {
    value.map(|value| parse_uuid(value, field)).transpose()
}
