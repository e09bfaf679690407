//! HTTP handlers: the REST surface business collaborators use to reach
//! connected clients, plus health.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenVerifier;
use crate::config::Config;
use crate::error::AppError;
use crate::models::event::{BroadcastRequest, NotifyRequest, ServerEvent};
use crate::models::presence::PresenceRecord;
use crate::services::rooms::project_room;
use crate::services::{ConnectionRegistry, PresenceStore, RoomManager};

/// Shared application state for HTTP and WebSocket handlers.
#[derive(Clone)]
pub struct AppState {
    pub app_key: String,
    pub verifier: TokenVerifier,
    pub presence: PresenceStore,
    pub registry: Arc<ConnectionRegistry>,
    pub rooms: RoomManager,
    pub grace_period: Duration,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new(config.outbound_queue));
        Self {
            app_key: config.app_key.clone(),
            verifier: TokenVerifier::new(config.jwt_secret.clone()),
            presence: PresenceStore::new(),
            registry: registry.clone(),
            rooms: RoomManager::new(registry),
            grace_period: config.grace_period,
        }
    }
}

const HEADER_APP_KEY: &str = "x-app-key";

fn require_app_key(headers: &HeaderMap, app_key: &str) -> Result<(), AppError> {
    let key = headers
        .get(HEADER_APP_KEY)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    if key.is_empty() || key != app_key {
        return Err(AppError::Auth("invalid or missing x-app-key".to_string()));
    }
    Ok(())
}

/// POST /api/notify — deliver a `notification` event to one user's
/// connections. An unknown or offline user is a no-op, not an error.
pub async fn notify(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<NotifyRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_app_key(&headers, &state.app_key)?;

    let payload = ServerEvent::Notification { data: body.data }.to_payload();
    let delivered = state.registry.send_to_user(&body.user_id, &payload).await;

    Ok(Json(json!({
        "ok": true,
        "userId": body.user_id,
        "delivered": delivered
    })))
}

/// POST /api/broadcast — relay a business change notice after a successful
/// write. Room-scoped when a project id is present, global otherwise.
pub async fn broadcast(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BroadcastRequest>,
) -> Result<Json<serde_json::Value>, AppError> {
    require_app_key(&headers, &state.app_key)?;

    let sender = body.user_id.unwrap_or_else(|| "system".to_string());
    let room = body.update.project_id.as_deref().map(project_room);
    let payload = ServerEvent::Update {
        data: body.update.stamped(&sender),
    }
    .to_payload();
    let delivered = match &room {
        Some(room) => state.rooms.broadcast(room, &payload).await,
        None => state.registry.broadcast_all(&payload).await,
    };

    Ok(Json(json!({
        "ok": true,
        "room": room,
        "delivered": delivered
    })))
}

/// GET /api/presence — current roster snapshot for REST collaborators.
pub async fn presence_list(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<PresenceRecord>>, AppError> {
    require_app_key(&headers, &state.app_key)?;
    Ok(Json(state.presence.snapshot().await))
}

/// GET /health — liveness probe.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "presenced" })),
    )
}
