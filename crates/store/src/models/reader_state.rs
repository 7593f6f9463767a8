use crate::error::{Error, ErrorKind, Result};
use crate::models::{parse_uuid, parse_uuid_opt};
use crate::timestamp::{self, parse_opt};
use exn::ResultExt;
use libra_api::models::{ReaderState, ReaderStatePatch, ReadingMode};
use time::UtcDateTime;
use uuid::Uuid;

/// Which book the user had open, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderStateCache {
    pub user_id: Uuid,
    pub current_ebook_id: Option<Uuid>,
    /// A location token as produced by `libra_document::encode`.
    pub current_location: Option<String>,
    pub reading_mode: ReadingMode,
    pub row_version: i64,
    pub last_opened_at: Option<UtcDateTime>,
    pub updated_at: Option<UtcDateTime>,
}
impl ReaderStateCache {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            current_ebook_id: None,
            current_location: None,
            reading_mode: ReadingMode::default(),
            row_version: 1,
            last_opened_at: None,
            updated_at: None,
        }
    }

    /// The saved location, if it belongs to `ebook_id`.
    pub fn location_for(&self, ebook_id: Uuid) -> Option<&str> {
        if self.current_ebook_id == Some(ebook_id) {
            self.current_location.as_deref()
        } else {
            None
        }
    }

    pub fn apply(&mut self, patch: &ReaderStatePatch) -> Result<()> {
        if let Some(id) = patch.current_ebook_id {
            self.current_ebook_id = Some(id);
        }
        if let Some(location) = &patch.current_location {
            self.current_location = Some(location.clone());
        }
        if let Some(mode) = patch.reading_mode {
            self.reading_mode = mode;
        }
        if let Some(opened) = &patch.last_opened_at {
            self.last_opened_at = Some(timestamp::parse(opened)?);
        }
        if let Some(version) = patch.row_version {
            self.row_version = version;
        }
        self.updated_at = None;
        Ok(())
    }
}
impl TryFrom<&ReaderState> for ReaderStateCache {
    type Error = Error;
    fn try_from(state: &ReaderState) -> Result<Self> {
        Ok(Self {
            user_id: state.user_id,
            current_ebook_id: state.current_ebook_id,
            current_location: state.current_location.clone(),
            reading_mode: state.reading_mode,
            row_version: state.row_version.max(1),
            last_opened_at: parse_opt(state.last_opened_at.as_deref())
                .or_raise(|| ErrorKind::InvalidData("reader state last_opened_at"))?,
            updated_at: parse_opt(state.updated_at.as_deref())
                .or_raise(|| ErrorKind::InvalidData("reader state updated_at"))?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ReaderStateRow {
    pub(crate) user_id: String,
    pub(crate) current_ebook_id: Option<String>,
    pub(crate) current_location: Option<String>,
    pub(crate) reading_mode: String,
    pub(crate) row_version: i64,
    pub(crate) last_opened_at: Option<String>,
    pub(crate) updated_at: String,
}
impl From<&ReaderStateCache> for ReaderStateRow {
    fn from(state: &ReaderStateCache) -> Self {
        Self {
            user_id: state.user_id.to_string(),
            current_ebook_id: state.current_ebook_id.map(|id| id.to_string()),
            current_location: state.current_location.clone(),
            reading_mode: state.reading_mode.to_string(),
            row_version: state.row_version,
            last_opened_at: state.last_opened_at.map(timestamp::format),
            updated_at: timestamp::format(state.updated_at.unwrap_or_else(timestamp::now)),
        }
    }
}
impl TryFrom<ReaderStateRow> for ReaderStateCache {
    type Error = Error;
    fn try_from(row: ReaderStateRow) -> Result<Self> {
        Ok(Self {
            user_id: parse_uuid(&row.user_id, "reader state user id")?,
            current_ebook_id: parse_uuid_opt(row.current_ebook_id.as_deref(), "reader state ebook id")?,
            current_location: row.current_location,
            reading_mode: row.reading_mode.parse::<ReadingMode>().or_raise(|| ErrorKind::InvalidData("reading mode"))?,
            row_version: row.row_version,
            last_opened_at: parse_opt(row.last_opened_at.as_deref())?,
            updated_at: Some(timestamp::parse(&row.updated_at)?),
        })
    }
}
