use crate::backoff::{backoff_delay, next_attempt_at};
use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use libra_api::RemoteHandle;
use libra_api::models::SyncEvent;
use libra_store::models::OutboxEvent;
use libra_store::{DEFAULT_PENDING_LIMIT, Repository, timestamp};
use serde_json::Value;
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;
use time::UtcDateTime;
use tokio::sync::{Notify, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::instrument;
use uuid::Uuid;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

/// Outcome of one pass over the due events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// What the status bar shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStatus {
    /// Unacknowledged events after the last drain.
    pub pending: u64,
    pub last: Option<DrainSummary>,
}
impl Display for SyncStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "sync: {} pending", self.pending)
    }
}

/// The UI's side of a running worker.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    wake: Arc<Notify>,
    status: watch::Receiver<SyncStatus>,
}
impl SyncHandle {
    /// Drain now instead of waiting for the next tick.
    pub fn sync_now(&self) {
        self.wake.notify_one();
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }
}

/// Drains the outbox to the server.
///
/// Each due event is sent with its stored idempotency key; an acknowledged
/// event is marked done, anything else is rescheduled with exponential
/// backoff. Events are never dropped, so a cancelled drain is safe to repeat.
pub struct SyncWorker {
    repo: Repository,
    remote: RemoteHandle,
    interval: Duration,
    batch_size: u32,
    wake: Arc<Notify>,
    status: watch::Sender<SyncStatus>,
}

impl SyncWorker {
    pub fn new(repo: Repository, remote: RemoteHandle) -> Self {
        let (status, _) = watch::channel(SyncStatus::default());
        Self {
            repo,
            remote,
            interval: DEFAULT_INTERVAL,
            batch_size: DEFAULT_PENDING_LIMIT,
            wake: Arc::new(Notify::new()),
            status,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(Duration::from_secs(1));
        self
    }

    /// Clamped to at least one event per drain.
    pub fn with_batch_size(mut self, batch_size: u32) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            wake: Arc::clone(&self.wake),
            status: self.status.subscribe(),
        }
    }

    /// Drain on start, on every tick and whenever woken, until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval = ?self.interval, batch_size = self.batch_size, "sync worker started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {},
                () = self.wake.notified() => {},
            }
            if let Err(e) = self.drain_once(&cancel).await {
                tracing::warn!(error = ?e, "outbox drain failed");
            }
        }
        tracing::info!("sync worker stopped");
    }

    /// Send every due event once, in schedule order.
    ///
    /// Remote failures reschedule the event and move on to the next one, and so
    /// does a failure to record the outcome locally. On cancellation the
    /// in-flight event is left untouched.
    #[instrument(skip_all)]
    pub async fn drain_once(&self, cancel: &CancellationToken) -> Result<DrainSummary> {
        let events = self.repo.list_pending(self.batch_size).await.or_raise(|| ErrorKind::Store)?;
        let mut summary = DrainSummary::default();
        let mut last_event_id: Option<Uuid> = None;
        let mut last_server_timestamp: Option<UtcDateTime> = None;

        for event in events {
            if cancel.is_cancelled() {
                break;
            }
            let request = to_sync_event(&event);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                result = self.remote.store_sync_event(&request) => result,
            };
            summary.attempted += 1;
            match result {
                Ok(ack) => {
                    if let Err(e) = self.repo.mark_done(event.id).await {
                        // Sent again next drain; the idempotency key makes that harmless.
                        summary.failed += 1;
                        tracing::warn!(event_id = %event.id, error = ?e, "could not mark sync event done");
                        continue;
                    }
                    summary.succeeded += 1;
                    last_event_id = Some(event.id);
                    let acked_at = ack.created_at.as_deref().and_then(|at| timestamp::parse(at).ok());
                    last_server_timestamp = last_server_timestamp.max(acked_at);
                    tracing::debug!(event_id = %event.id, "sync event acknowledged");
                },
                Err(e) => {
                    let delay = backoff_delay(event.attempt_count);
                    let next = next_attempt_at(event.attempt_count, timestamp::now());
                    let message = (*e).to_string();
                    summary.failed += 1;
                    if let Err(e) = self.repo.mark_retry(event.id, next, &message).await {
                        tracing::warn!(event_id = %event.id, error = ?e, "could not reschedule sync event");
                        continue;
                    }
                    tracing::warn!(
                        event_id = %event.id,
                        attempt = event.attempt_count + 1,
                        delay = ?delay,
                        error = %message,
                        "sync event failed; rescheduled",
                    );
                },
            }
        }

        if last_event_id.is_some() {
            self.repo
                .advance_checkpoint(last_server_timestamp, last_event_id)
                .await
                .or_raise(|| ErrorKind::Store)?;
        }
        let pending = self.repo.pending_count().await.or_raise(|| ErrorKind::Store)?;
        if summary.attempted > 0 {
            tracing::info!(
                attempted = summary.attempted,
                succeeded = summary.succeeded,
                failed = summary.failed,
                pending,
                "outbox drained",
            );
        }
        self.status.send_replace(SyncStatus {
            pending,
            last: Some(summary),
        });
        Ok(summary)
    }
}

/// The wire form of a stored event. The client timestamp is when the event
/// was created, not when it was sent.
pub fn to_sync_event(event: &OutboxEvent) -> SyncEvent {
    let payload = match &event.payload {
        Value::Null => Value::Object(Default::default()),
        payload => payload.clone(),
    };
    SyncEvent {
        entity_type: event.entity_type,
        entity_id: event.entity_id,
        operation: event.operation,
        payload,
        base_version: event.base_version,
        idempotency_key: event.idempotency_key.clone(),
        client_timestamp: timestamp::format(event.created_at.unwrap_or_else(timestamp::now)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libra_api::models::{EntityType, Operation};
    use libra_api::{MockRemote, Tokens};
    use libra_store::Database;
    use serde_json::json;

    async fn setup() -> (Repository, Arc<MockRemote>) {
        let db = Database::connect_in_memory().await.unwrap();
        let remote = Arc::new(MockRemote::default().with_tokens(Tokens::new("a", "r")));
        (Repository::from(&db), remote)
    }

    fn worker(repo: &Repository, remote: &Arc<MockRemote>) -> SyncWorker {
        SyncWorker::new(repo.clone(), Arc::clone(remote) as RemoteHandle)
    }

    fn event(payload: Value) -> OutboxEvent {
        OutboxEvent::new(EntityType::Preference, Uuid::from_u128(1), Operation::Upsert, payload)
    }

    #[tokio::test]
    async fn test_drain_acknowledges_and_forwards_fields() {
        let (repo, remote) = setup().await;
        let stored = repo.enqueue(event(json!({"themeMode": "sepia"})).with_base_version(3)).await.unwrap();
        let worker = worker(&repo, &remote);

        let summary = worker.drain_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(
            summary,
            DrainSummary {
                attempted: 1,
                succeeded: 1,
                failed: 0
            }
        );
        let sent = remote.sync_events();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].idempotency_key, stored.idempotency_key);
        assert_eq!(sent[0].base_version, Some(3));
        assert_eq!(sent[0].payload["themeMode"], "sepia");
        assert_eq!(Some(timestamp::parse(&sent[0].client_timestamp).unwrap()), stored.created_at);

        assert!(repo.outbox_event(stored.id).await.unwrap().unwrap().is_done());
        assert_eq!(repo.checkpoint().await.unwrap().last_event_id, Some(stored.id));
        assert_eq!(worker.handle().status().pending, 0);
        assert_eq!(worker.handle().status().to_string(), "sync: 0 pending");
    }

    #[tokio::test]
    async fn test_store_error_on_one_event_does_not_abort_batch() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let remote = Arc::new(MockRemote::default().with_tokens(Tokens::new("a", "r")));
        let stuck = repo.enqueue(event(json!({"n": 1}))).await.unwrap();
        let other = repo.enqueue(event(json!({"n": 2}))).await.unwrap();
        sqlx::query(&format!(
            "CREATE TRIGGER refuse_update BEFORE UPDATE ON outbox_events WHEN OLD.id = '{}' \
             BEGIN SELECT RAISE(ABORT, 'refused'); END",
            stuck.id
        ))
        .execute(db.pool())
        .await
        .unwrap();

        let summary = worker(&repo, &remote).drain_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.attempted, 2);
        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        assert!(repo.outbox_event(other.id).await.unwrap().unwrap().is_done());
        assert!(!repo.outbox_event(stuck.id).await.unwrap().unwrap().is_done());
        assert_eq!(repo.checkpoint().await.unwrap().last_event_id, Some(other.id));
    }

    #[tokio::test]
    async fn test_null_payload_is_sent_as_empty_object() {
        let (repo, remote) = setup().await;
        repo.enqueue(event(Value::Null)).await.unwrap();
        worker(&repo, &remote).drain_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(remote.sync_events()[0].payload, json!({}));
    }

    #[tokio::test]
    async fn test_failures_back_off_and_do_not_abort_batch() {
        let (repo, remote) = setup().await;
        let first = repo.enqueue(event(json!({"n": 1}))).await.unwrap();
        remote.fail_transient("store sync event");
        let worker = worker(&repo, &remote);

        let before = timestamp::now();
        let summary = worker.drain_once(&CancellationToken::new()).await.unwrap();
        assert_eq!(summary.failed, 1);
        let retried = repo.outbox_event(first.id).await.unwrap().unwrap();
        assert_eq!(retried.attempt_count, 1);
        assert_eq!(
            retried.last_error.as_deref(),
            Some("store sync event failed (503): service unavailable")
        );
        let delay = retried.next_attempt_at.unwrap() - before;
        assert!(delay >= time::Duration::seconds(2) && delay <= time::Duration::seconds(3));

        // Not due yet: nothing to do.
        assert_eq!(worker.drain_once(&CancellationToken::new()).await.unwrap().attempted, 0);
        assert_eq!(worker.handle().status().pending, 1);
    }

    #[tokio::test]
    async fn test_consecutive_retries_back_off() {
        let (repo, _) = setup().await;
        let stored = repo.enqueue(event(json!({}))).await.unwrap();

        let mut delays = Vec::new();
        for _ in 0..6 {
            let current = repo.outbox_event(stored.id).await.unwrap().unwrap();
            let before = timestamp::now();
            let next = next_attempt_at(current.attempt_count, before);
            repo.mark_retry(stored.id, next, "store sync event failed (503): busy").await.unwrap();
            let retried = repo.outbox_event(stored.id).await.unwrap().unwrap();
            assert_eq!(retried.attempt_count, current.attempt_count + 1);
            delays.push(retried.next_attempt_at.unwrap() - before);
        }
        assert!(delays[1] >= time::Duration::seconds(4) && delays[1] <= time::Duration::seconds(8));
        assert!(delays.iter().all(|delay| *delay <= time::Duration::seconds(64)));
        assert_eq!(delays[5], time::Duration::seconds(64));
    }

    #[tokio::test]
    async fn test_batch_size_caps_a_drain() {
        let (repo, remote) = setup().await;
        for n in 0..3 {
            repo.enqueue(event(json!({ "n": n }))).await.unwrap();
        }
        let worker = worker(&repo, &remote).with_batch_size(0);
        assert_eq!(worker.batch_size, 1);
        assert_eq!(worker.drain_once(&CancellationToken::new()).await.unwrap().succeeded, 1);
        assert_eq!(repo.pending_count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_drain_leaves_events_untouched() {
        let (repo, remote) = setup().await;
        let stored = repo.enqueue(event(json!({}))).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = worker(&repo, &remote).drain_once(&cancel).await.unwrap();
        assert_eq!(summary.attempted, 0);
        let untouched = repo.outbox_event(stored.id).await.unwrap().unwrap();
        assert_eq!(untouched.attempt_count, 0);
        assert!(remote.sync_events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_run_drains_on_start_and_stops_on_cancel() {
        let (repo, remote) = setup().await;
        repo.enqueue(event(json!({}))).await.unwrap();
        let worker = worker(&repo, &remote).with_interval(Duration::from_secs(3600));
        let mut status = worker.handle().subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(worker.run(cancel.clone()));

        status.changed().await.unwrap();
        assert_eq!(status.borrow().pending, 0);
        assert_eq!(remote.sync_events().len(), 1);

        cancel.cancel();
        task.await.unwrap();
    }
}
