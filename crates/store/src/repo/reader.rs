use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{PreferencesCache, PreferencesRow, ReaderStateCache, ReaderStateRow};
use exn::ResultExt;
use tracing::instrument;
use uuid::Uuid;

impl Repository {
    // =========================================================================
    // Preferences
    // =========================================================================

    pub async fn preferences(&self, user_id: Uuid) -> Result<Option<PreferencesCache>> {
        let row: Option<PreferencesRow> = sqlx::query_as(include_str!("../../queries/get_preferences.sql"))
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(PreferencesCache::try_from).transpose()
    }

    #[instrument(skip_all, fields(user_id = %prefs.user_id, row_version = prefs.row_version))]
    pub async fn upsert_preferences(&self, prefs: &PreferencesCache) -> Result<()> {
        let row = PreferencesRow::try_from(prefs)?;
        sqlx::query(include_str!("../../queries/upsert_preferences.sql"))
            .bind(row.user_id)
            .bind(row.reading_mode)
            .bind(row.zen_restore_on_open)
            .bind(row.theme_mode)
            .bind(row.theme_overrides)
            .bind(row.typography_profile)
            .bind(row.row_version)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    // =========================================================================
    // Reader State
    // =========================================================================

    pub async fn reader_state(&self, user_id: Uuid) -> Result<Option<ReaderStateCache>> {
        let row: Option<ReaderStateRow> = sqlx::query_as(include_str!("../../queries/get_reader_state.sql"))
            .bind(user_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(ReaderStateCache::try_from).transpose()
    }

    #[instrument(skip_all, fields(user_id = %state.user_id, row_version = state.row_version))]
    pub async fn upsert_reader_state(&self, state: &ReaderStateCache) -> Result<()> {
        let row = ReaderStateRow::from(state);
        sqlx::query(include_str!("../../queries/upsert_reader_state.sql"))
            .bind(row.user_id)
            .bind(row.current_ebook_id)
            .bind(row.current_location)
            .bind(row.reading_mode)
            .bind(row.row_version)
            .bind(row.last_opened_at)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::models::{PreferencesCache, ReaderStateCache};
    use crate::repo::test_repository;
    use libra_api::models::{ReadingMode, ThemeMode, ThemeToken};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_preferences_round_trip() {
        let repo = test_repository().await;
        let user = Uuid::from_u128(1);
        assert!(repo.preferences(user).await.unwrap().is_none());

        let mut prefs = PreferencesCache::new(user);
        prefs.theme_mode = ThemeMode::HighContrast;
        prefs.theme_overrides.insert(ThemeToken::Progress, "#00FF00".into());
        repo.upsert_preferences(&prefs).await.unwrap();

        prefs.row_version = 2;
        prefs.reading_mode = ReadingMode::Zen;
        repo.upsert_preferences(&prefs).await.unwrap();

        let stored = repo.preferences(user).await.unwrap().unwrap();
        assert_eq!(stored.theme_mode, ThemeMode::HighContrast);
        assert_eq!(stored.reading_mode, ReadingMode::Zen);
        assert_eq!(stored.row_version, 2);
        assert_eq!(stored.theme_overrides, prefs.theme_overrides);
        assert!(stored.updated_at.is_some());
        assert!(repo.preferences(Uuid::from_u128(2)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_row_version_must_be_positive() {
        let repo = test_repository().await;
        let mut prefs = PreferencesCache::new(Uuid::from_u128(1));
        prefs.row_version = 0;
        let err = repo.upsert_preferences(&prefs).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_reader_state_round_trip() {
        let repo = test_repository().await;
        let user = Uuid::from_u128(1);
        let mut state = ReaderStateCache::new(user);
        state.current_ebook_id = Some(Uuid::from_u128(77));
        state.current_location = Some("fmt=pdf;page=2;line=3".into());
        repo.upsert_reader_state(&state).await.unwrap();

        let stored = repo.reader_state(user).await.unwrap().unwrap();
        assert_eq!(stored.location_for(Uuid::from_u128(77)), Some("fmt=pdf;page=2;line=3"));
        assert_eq!(stored.reading_mode, ReadingMode::Normal);
        assert_eq!(stored.last_opened_at, None);
    }
}
