use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{CheckpointRow, SyncCheckpoint, UiSettings, UiSettingsRow};
use crate::timestamp;
use exn::ResultExt;
use time::UtcDateTime;
use tracing::instrument;
use uuid::Uuid;

impl Repository {
    // =========================================================================
    // Sync Checkpoint
    // =========================================================================

    /// The checkpoint, or an empty one if the worker never advanced it.
    pub async fn checkpoint(&self) -> Result<SyncCheckpoint> {
        let row: Option<CheckpointRow> = sqlx::query_as(include_str!("../../queries/get_sync_checkpoint.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(SyncCheckpoint::try_from).transpose()?.unwrap_or_default())
    }

    /// Move the checkpoint forward. An older server timestamp is ignored and a
    /// missing value never erases a known one.
    #[instrument(skip(self))]
    pub async fn advance_checkpoint(
        &self,
        last_server_timestamp: Option<UtcDateTime>,
        last_event_id: Option<Uuid>,
    ) -> Result<SyncCheckpoint> {
        sqlx::query(include_str!("../../queries/advance_sync_checkpoint.sql"))
            .bind(last_server_timestamp.map(timestamp::format))
            .bind(last_event_id.map(|id| id.to_string()))
            .bind(timestamp::format(timestamp::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        self.checkpoint().await
    }

    // =========================================================================
    // UI Settings
    // =========================================================================

    pub async fn ui_settings(&self) -> Result<UiSettings> {
        let row: Option<UiSettingsRow> = sqlx::query_as(include_str!("../../queries/get_ui_settings.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(UiSettings::try_from).transpose()?.unwrap_or_default())
    }

    #[instrument(skip_all, fields(gutter = %settings.gutter_preset))]
    pub async fn save_ui_settings(&self, settings: &UiSettings) -> Result<()> {
        let row = UiSettingsRow::from(settings);
        sqlx::query(include_str!("../../queries/upsert_ui_settings.sql"))
            .bind(row.gutter_preset)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}
