use crate::error::Error;
use crate::models::parse_uuid_opt;
use crate::timestamp::{self, parse_opt};
use time::UtcDateTime;
use uuid::Uuid;

/// How far the sync worker has got. Only ever moves forward.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncCheckpoint {
    pub last_server_timestamp: Option<UtcDateTime>,
    pub last_event_id: Option<Uuid>,
    pub updated_at: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct CheckpointRow {
    pub(crate) last_server_timestamp: Option<String>,
    pub(crate) last_event_id: Option<String>,
    pub(crate) updated_at: String,
}
impl TryFrom<CheckpointRow> for SyncCheckpoint {
    type Error = Error;
    fn try_from(row: CheckpointRow) -> Result<Self, Self::Error> {
        Ok(Self {
            last_server_timestamp: parse_opt(row.last_server_timestamp.as_deref())?,
            last_event_id: parse_uuid_opt(row.last_event_id.as_deref(), "checkpoint event id")?,
            updated_at: Some(timestamp::parse(&row.updated_at)?),
        })
    }
}
