//! Event and message models for WebSocket and HTTP API.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::models::presence::{PresenceRecord, Status};

/// Inbound client event, tagged by `event`. A payload that fails to
/// deserialize is dropped with a warning; it never closes the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event")]
pub enum ClientEvent {
    #[serde(rename = "presence:status")]
    PresenceStatus { data: StatusPayload },
    #[serde(rename = "presence:location")]
    PresenceLocation { data: LocationPayload },
    #[serde(rename = "project:join")]
    ProjectJoin { data: ProjectPayload },
    #[serde(rename = "project:leave")]
    ProjectLeave { data: ProjectPayload },
    #[serde(rename = "update")]
    Update { data: UpdatePayload },
    #[serde(rename = "cursor:move")]
    CursorMove { data: CursorPayload },
    #[serde(rename = "typing:start")]
    TypingStart { data: TypingPayload },
    #[serde(rename = "typing:stop")]
    TypingStop { data: TypingPayload },
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusPayload {
    pub status: Status,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LocationPayload {
    pub location: String,
    #[serde(default)]
    pub page: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectPayload {
    pub project_id: String,
}

/// Business change notice: arbitrary fields, optionally scoped to a project.
/// Client-supplied `userId`/`timestamp` are ignored and re-stamped server-side.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl UpdatePayload {
    /// Build the relayed `update` data with the sender's verified user id and
    /// a server timestamp. Any client-supplied `userId`/`timestamp` fields
    /// are overwritten so they cannot be spoofed.
    pub fn stamped(self, user_id: &str) -> Value {
        let mut data = self.extra;
        if let Some(project_id) = self.project_id {
            data.insert("projectId".to_string(), Value::String(project_id));
        }
        data.insert("userId".to_string(), Value::String(user_id.to_string()));
        data.insert(
            "timestamp".to_string(),
            serde_json::json!(chrono::Utc::now()),
        );
        Value::Object(data)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CursorPayload {
    pub x: f64,
    pub y: f64,
    pub context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypingPayload {
    pub context: String,
}

/// Outbound server event, tagged by `event`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum ServerEvent {
    /// Full roster snapshot, sent once right after a successful handshake.
    #[serde(rename = "presence:list")]
    PresenceList { data: Vec<PresenceRecord> },
    #[serde(rename = "presence:user_joined")]
    UserJoined { data: PresenceRecord },
    #[serde(rename = "presence:user_left")]
    UserLeft { data: PresenceRecord },
    #[serde(rename = "presence:update")]
    PresenceUpdate { data: PresenceRecord },
    /// Relayed business change notice, server-stamped.
    #[serde(rename = "update")]
    Update { data: Value },
    #[serde(rename = "cursor:move")]
    CursorMove { data: Value },
    #[serde(rename = "typing:start")]
    TypingStart { data: Value },
    #[serde(rename = "typing:stop")]
    TypingStop { data: Value },
    /// Direct single-recipient delivery triggered over REST.
    #[serde(rename = "notification")]
    Notification { data: Value },
}

impl ServerEvent {
    /// Serialize once for fan-out. Infallible for the payloads we build.
    pub fn to_payload(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}

/// Payload for `POST /api/notify` — deliver a notification to one user.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyRequest {
    pub user_id: String,
    pub data: Value,
}

/// Payload for `POST /api/broadcast` — business change notice from a REST
/// collaborator, relayed like a client `update` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(flatten)]
    pub update: UpdatePayload,
}
