use crate::error::{Error, ErrorKind};
use crate::models::parse_uuid;
use crate::timestamp::{self, parse_opt};
use exn::ResultExt;
use libra_api::models::{EntityType, Operation};
use serde_json::Value;
use time::UtcDateTime;
use uuid::Uuid;

/// A local mutation waiting to be acknowledged by the server.
///
/// Built with [`OutboxEvent::new`] and handed to `Repository::enqueue`, which
/// assigns the id, idempotency key and timestamps left unset here.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: Operation,
    /// `Value::Null` and `{}` are stored as SQL `NULL`.
    pub payload: Value,
    pub base_version: Option<i64>,
    pub idempotency_key: String,
    pub attempt_count: i64,
    pub next_attempt_at: Option<UtcDateTime>,
    pub created_at: Option<UtcDateTime>,
    pub updated_at: Option<UtcDateTime>,
    pub last_error: Option<String>,
    pub succeeded_at: Option<UtcDateTime>,
}
impl OutboxEvent {
    pub fn new(entity_type: EntityType, entity_id: Uuid, operation: Operation, payload: Value) -> Self {
        Self {
            id: Uuid::nil(),
            entity_type,
            entity_id,
            operation,
            payload,
            base_version: None,
            idempotency_key: String::new(),
            attempt_count: 0,
            next_attempt_at: None,
            created_at: None,
            updated_at: None,
            last_error: None,
            succeeded_at: None,
        }
    }

    pub fn with_base_version(mut self, version: i64) -> Self {
        self.base_version = Some(version);
        self
    }

    pub fn is_done(&self) -> bool {
        self.succeeded_at.is_some()
    }

    /// Fill in everything a caller may leave unset before the event is stored.
    pub(crate) fn prepare(&mut self, now: UtcDateTime) {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        if self.idempotency_key.trim().is_empty() {
            self.idempotency_key = Uuid::new_v4().to_string();
        }
        let created = *self.created_at.get_or_insert(now);
        self.next_attempt_at.get_or_insert(created);
        self.updated_at = Some(now);
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OutboxRow {
    pub(crate) id: String,
    pub(crate) entity_type: String,
    pub(crate) entity_id: String,
    pub(crate) operation: String,
    pub(crate) payload: Option<String>,
    pub(crate) base_version: Option<i64>,
    pub(crate) idempotency_key: String,
    pub(crate) attempt_count: i64,
    pub(crate) next_attempt_at: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    pub(crate) last_error: Option<String>,
    pub(crate) succeeded_at: Option<String>,
}
impl TryFrom<&OutboxEvent> for OutboxRow {
    type Error = Error;
    fn try_from(event: &OutboxEvent) -> Result<Self, Self::Error> {
        let now = timestamp::now();
        let payload = match &event.payload {
            Value::Null => None,
            Value::Object(map) if map.is_empty() => None,
            value => Some(serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("outbox payload"))?),
        };
        Ok(Self {
            id: event.id.to_string(),
            entity_type: event.entity_type.to_string(),
            entity_id: event.entity_id.to_string(),
            operation: event.operation.to_string(),
            payload,
            base_version: event.base_version,
            idempotency_key: event.idempotency_key.clone(),
            attempt_count: event.attempt_count,
            next_attempt_at: timestamp::format(event.next_attempt_at.unwrap_or(now)),
            created_at: timestamp::format(event.created_at.unwrap_or(now)),
            updated_at: timestamp::format(event.updated_at.unwrap_or(now)),
            last_error: event.last_error.clone(),
            succeeded_at: event.succeeded_at.map(timestamp::format),
        })
    }
}
impl TryFrom<OutboxRow> for OutboxEvent {
    type Error = Error;
    fn try_from(row: OutboxRow) -> Result<Self, Self::Error> {
        let payload = match row.payload.as_deref() {
            None => Value::Null,
            Some(json) => serde_json::from_str(json).or_raise(|| ErrorKind::InvalidData("outbox payload"))?,
        };
        Ok(Self {
            id: parse_uuid(&row.id, "outbox event id")?,
            entity_type: row
                .entity_type
                .parse::<EntityType>()
                .or_raise(|| ErrorKind::InvalidData("entity type"))?,
            entity_id: parse_uuid(&row.entity_id, "outbox entity id")?,
            operation: row.operation.parse::<Operation>().or_raise(|| ErrorKind::InvalidData("operation"))?,
            payload,
            base_version: row.base_version,
            idempotency_key: row.idempotency_key,
            attempt_count: row.attempt_count,
            next_attempt_at: Some(timestamp::parse(&row.next_attempt_at)?),
            created_at: Some(timestamp::parse(&row.created_at)?),
            updated_at: Some(timestamp::parse(&row.updated_at)?),
            last_error: row.last_error,
            succeeded_at: parse_opt(row.succeeded_at.as_deref())?,
        })
    }
}
