//! The outbox: local mutations waiting for the server.
//!
//! Events are only ever appended, retried and acknowledged. Once acknowledged
//! an event is final (a trigger rejects further updates) and is never listed
//! again.

use super::Repository;
use crate::error::{ErrorKind, Result};
use crate::models::{OutboxEvent, OutboxRow};
use crate::timestamp;
use exn::ResultExt;
use time::UtcDateTime;
use tracing::instrument;
use uuid::Uuid;

/// Batch size used when the caller asks for zero.
pub const DEFAULT_PENDING_LIMIT: u32 = 25;

impl Repository {
    /// Store a new event, assigning its id, idempotency key and timestamps if
    /// unset. Returns the event as stored.
    #[instrument(skip_all, fields(entity_type = %event.entity_type, entity_id = %event.entity_id))]
    pub async fn enqueue(&self, mut event: OutboxEvent) -> Result<OutboxEvent> {
        event.prepare(timestamp::now());
        let row = OutboxRow::try_from(&event)?;
        sqlx::query(include_str!("../../queries/enqueue_outbox_event.sql"))
            .bind(row.id)
            .bind(row.entity_type)
            .bind(row.entity_id)
            .bind(row.operation)
            .bind(row.payload)
            .bind(row.base_version)
            .bind(row.idempotency_key)
            .bind(row.attempt_count)
            .bind(row.next_attempt_at)
            .bind(row.created_at)
            .bind(row.updated_at)
            .bind(row.last_error)
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::debug!(event_id = %event.id, "queued outbox event");
        Ok(event)
    }

    pub async fn outbox_event(&self, id: Uuid) -> Result<Option<OutboxEvent>> {
        let row: Option<OutboxRow> = sqlx::query_as(include_str!("../../queries/get_outbox_event.sql"))
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(OutboxEvent::try_from).transpose()
    }

    /// Events due now, oldest schedule first. A `limit` of zero means
    /// [`DEFAULT_PENDING_LIMIT`].
    pub async fn list_pending(&self, limit: u32) -> Result<Vec<OutboxEvent>> {
        self.list_pending_at(timestamp::now(), limit).await
    }

    pub async fn list_pending_at(&self, at: UtcDateTime, limit: u32) -> Result<Vec<OutboxEvent>> {
        let limit = if limit == 0 { DEFAULT_PENDING_LIMIT } else { limit };
        let rows: Vec<OutboxRow> = sqlx::query_as(include_str!("../../queries/list_pending_outbox_events.sql"))
            .bind(timestamp::format(at))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(OutboxEvent::try_from).collect()
    }

    /// Events not yet acknowledged, due or not.
    pub async fn pending_count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../../queries/count_pending_outbox_events.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("pending count"))
    }

    /// Record the server's acknowledgement.
    ///
    /// Returns `true` only for the call that actually acknowledged the event;
    /// repeating it (or naming an unknown event) is a no-op.
    #[instrument(skip(self))]
    pub async fn mark_done(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/mark_outbox_done.sql"))
            .bind(id.to_string())
            .bind(timestamp::format(timestamp::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Push the event back to `next_attempt_at`, counting the failed attempt.
    #[instrument(skip(self, last_error))]
    pub async fn mark_retry(&self, id: Uuid, next_attempt_at: UtcDateTime, last_error: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../../queries/mark_outbox_retry.sql"))
            .bind(id.to_string())
            .bind(timestamp::format(next_attempt_at))
            .bind(last_error)
            .bind(timestamp::format(timestamp::now()))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Delete acknowledged events older than `before`.
    #[instrument(skip(self))]
    pub async fn purge_succeeded(&self, before: UtcDateTime) -> Result<u64> {
        let result = sqlx::query(include_str!("../../queries/purge_succeeded_outbox_events.sql"))
            .bind(timestamp::format(before))
            .execute(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repo::test_repository;
    use libra_api::models::{EntityType, Operation};
    use serde_json::json;
    use time::Duration;

    fn event(payload: serde_json::Value) -> OutboxEvent {
        OutboxEvent::new(EntityType::Preference, Uuid::from_u128(5), Operation::Upsert, payload)
    }

    #[tokio::test]
    async fn test_enqueue_assigns_identity() {
        let repo = test_repository().await;
        let stored = repo.enqueue(event(json!({"themeMode": "sepia"}))).await.unwrap();
        assert!(!stored.id.is_nil());
        assert!(!stored.idempotency_key.is_empty());
        assert_eq!(stored.attempt_count, 0);

        let loaded = repo.outbox_event(stored.id).await.unwrap().unwrap();
        assert_eq!(loaded.payload["themeMode"], "sepia");
        assert_eq!(loaded.idempotency_key, stored.idempotency_key);
        assert_eq!(loaded.next_attempt_at, stored.next_attempt_at);
        assert!(!loaded.is_done());
    }

    #[tokio::test]
    async fn test_duplicate_idempotency_key_is_rejected() {
        let repo = test_repository().await;
        let mut first = event(json!({}));
        first.idempotency_key = "same".into();
        repo.enqueue(first.clone()).await.unwrap();
        let err = repo.enqueue(first).await.unwrap_err();
        assert_eq!(*err, ErrorKind::Database);
    }

    #[tokio::test]
    async fn test_list_pending_orders_by_schedule_and_limits() {
        let repo = test_repository().await;
        let now = timestamp::now();
        let mut ids = Vec::new();
        for offset in [30, 10, 20] {
            let mut e = event(json!({"n": offset}));
            e.next_attempt_at = Some(now - Duration::seconds(offset));
            ids.push(repo.enqueue(e).await.unwrap().id);
        }
        let mut future = event(json!({}));
        future.next_attempt_at = Some(now + Duration::hours(1));
        repo.enqueue(future).await.unwrap();

        let pending = repo.list_pending_at(now, 0).await.unwrap();
        let order: Vec<_> = pending.iter().map(|e| e.id).collect();
        assert_eq!(order, [ids[0], ids[2], ids[1]]);

        let limited = repo.list_pending_at(now, 2).await.unwrap();
        assert_eq!(limited.len(), 2);
        assert_eq!(repo.pending_count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_mark_done_once() {
        let repo = test_repository().await;
        let stored = repo.enqueue(event(json!({}))).await.unwrap();
        assert!(repo.mark_done(stored.id).await.unwrap());
        assert!(!repo.mark_done(stored.id).await.unwrap());
        assert!(!repo.mark_done(Uuid::new_v4()).await.unwrap());

        assert!(repo.list_pending(10).await.unwrap().is_empty());
        assert_eq!(repo.pending_count().await.unwrap(), 0);
        let done = repo.outbox_event(stored.id).await.unwrap().unwrap();
        assert!(done.is_done());
        assert_eq!(done.last_error, None);
    }

    #[tokio::test]
    async fn test_succeeded_events_are_immutable() {
        let repo = test_repository().await;
        let stored = repo.enqueue(event(json!({}))).await.unwrap();
        repo.mark_done(stored.id).await.unwrap();
        // The guarded query skips it...
        assert!(!repo.mark_retry(stored.id, timestamp::now(), "late").await.unwrap());
        // ...and the trigger refuses anything else.
        let result = sqlx::query("UPDATE outbox_events SET attempt_count = 9 WHERE id = ?1")
            .bind(stored.id.to_string())
            .execute(&repo.pool)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_mark_retry_reschedules() {
        let repo = test_repository().await;
        let stored = repo.enqueue(event(json!({}))).await.unwrap();
        let later = timestamp::now() + Duration::seconds(4);
        assert!(repo.mark_retry(stored.id, later, "store sync event failed (503): busy").await.unwrap());

        assert!(repo.list_pending(10).await.unwrap().is_empty());
        let retried = repo.outbox_event(stored.id).await.unwrap().unwrap();
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(retried.next_attempt_at, Some(later));
        assert_eq!(retried.last_error.as_deref(), Some("store sync event failed (503): busy"));
        assert_eq!(repo.list_pending_at(later, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_succeeded() {
        let repo = test_repository().await;
        let done = repo.enqueue(event(json!({}))).await.unwrap();
        let pending = repo.enqueue(event(json!({}))).await.unwrap();
        repo.mark_done(done.id).await.unwrap();
        let purged = repo.purge_succeeded(timestamp::now() + Duration::seconds(1)).await.unwrap();
        assert_eq!(purged, 1);
        assert!(repo.outbox_event(done.id).await.unwrap().is_none());
        assert!(repo.outbox_event(pending.id).await.unwrap().is_some());
    }
}
