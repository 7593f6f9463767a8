use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::wire_enum;

wire_enum! {
    EntityType {
        Progress => "progress",
        Annotation => "annotation",
        Bookmark => "bookmark",
        Preference => "preference",
        ReaderState => "reader_state",
    }
}

wire_enum! {
    Operation {
        Upsert => "upsert",
        Delete => "delete",
    }
}

/// Body of `POST /sync/events`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub operation: Operation,
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_version: Option<i64>,
    pub idempotency_key: String,
    /// When the client recorded the mutation (RFC3339).
    pub client_timestamp: String,
}

/// Server acknowledgement of a stored sync event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEventAck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}
