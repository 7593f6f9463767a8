use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{SessionRow, SessionState};
use exn::ResultExt;
use tracing::instrument;

impl Repository {
    pub async fn session(&self) -> Result<Option<SessionState>> {
        let row: Option<SessionRow> = sqlx::query_as(include_str!("../../queries/get_session.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(SessionState::try_from).transpose()
    }

    #[instrument(skip_all, fields(user_id = ?session.user_id))]
    pub async fn save_session(&self, session: &SessionState) -> Result<()> {
        let row = SessionRow::from(session);
        sqlx::query(include_str!("../../queries/upsert_session.sql"))
            .bind(row.access_token)
            .bind(row.refresh_token)
            .bind(row.user_id)
            .bind(row.updated_at)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn clear_session(&self) -> Result<()> {
        sqlx::query(include_str!("../../queries/clear_session.sql"))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::models::SessionState;
    use crate::repo::test_repository;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_session_singleton() {
        let repo = test_repository().await;
        assert!(repo.session().await.unwrap().is_none());

        repo.save_session(&SessionState::new("a1", "r1", None)).await.unwrap();
        let user = Uuid::from_u128(42);
        repo.save_session(&SessionState::new("a2", "r2", Some(user))).await.unwrap();
        let session = repo.session().await.unwrap().unwrap();
        assert_eq!(session.access_token, "a2");
        assert_eq!(session.refresh_token, "r2");
        assert_eq!(session.user_id, Some(user));
        assert!(session.updated_at.is_some());

        repo.clear_session().await.unwrap();
        assert!(repo.session().await.unwrap().is_none());
    }
}
