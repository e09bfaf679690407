//! WebSocket handler: authenticated handshake, read loop, and the event
//! router that fans inbound events out to the right scope.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde_json::json;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::auth::Claims;
use crate::error::AppError;
use crate::handlers::http::AppState;
use crate::models::event::{ClientEvent, ServerEvent};
use crate::models::presence::generate_connection_id;
use crate::services::reconciler;
use crate::services::rooms::project_room;

const BEARER_PREFIX: &str = "Bearer ";

/// Upgrade HTTP to WebSocket. The bearer token (query `token` or
/// `Authorization` header) is verified before the upgrade; a failed
/// handshake is rejected with 401 and creates no presence state.
pub async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    let token = params.get("token").cloned().or_else(|| {
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix(BEARER_PREFIX))
            .map(String::from)
    });
    let claims = state.verifier.verify(token.as_deref().unwrap_or(""))?;
    let display_name = params.get("name").cloned().filter(|s| !s.is_empty());

    Ok(ws.on_upgrade(move |socket| handle_socket(state, socket, claims, display_name)))
}

async fn handle_socket(
    state: AppState,
    socket: WebSocket,
    claims: Claims,
    display_name: Option<String>,
) {
    let connection_id = generate_connection_id();
    info!(user_id = %claims.sub, connection_id = %connection_id, "ws connected");

    let (mut rx, kick) = state.registry.register(&connection_id, &claims.sub).await;
    let (record, came_online) = state
        .presence
        .upsert(&claims, display_name, &connection_id)
        .await;

    let (mut sender, mut receiver) = socket.split();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    if came_online {
        let joined = ServerEvent::UserJoined { data: record }.to_payload();
        state.registry.broadcast_except(&connection_id, &joined).await;
    }

    // Seed the new client with the full roster.
    let snapshot = state.presence.snapshot().await;
    let list = ServerEvent::PresenceList { data: snapshot }.to_payload();
    state.registry.send_to(&connection_id, &list).await;

    loop {
        tokio::select! {
            _ = kick.notified() => {
                warn!(connection_id = %connection_id, "closing backpressured connection");
                break;
            }
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => {
                    route_event(&state, &claims, &connection_id, &text).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    reconciler::handle_disconnect(
        state.presence.clone(),
        state.registry.clone(),
        state.rooms.clone(),
        &claims.sub,
        &connection_id,
        state.grace_period,
    )
    .await;
    send_task.abort();
    info!(user_id = %claims.sub, connection_id = %connection_id, "ws disconnected");
}

/// Dispatch one inbound event: mutate the presence store / rooms as needed
/// and fan out to the right scope. A malformed payload is dropped with a
/// warning; it never closes the connection.
pub(crate) async fn route_event(
    state: &AppState,
    claims: &Claims,
    connection_id: &str,
    text: &str,
) {
    let event = match serde_json::from_str::<ClientEvent>(text) {
        Ok(event) => event,
        Err(e) => {
            let err = AppError::MalformedEvent(e.to_string());
            warn!(user_id = %claims.sub, connection_id, error = %err, "dropping event");
            return;
        }
    };

    match event {
        ClientEvent::PresenceStatus { data } => {
            if let Some(rec) = state.presence.update_status(&claims.sub, data.status).await {
                let payload = ServerEvent::PresenceUpdate { data: rec }.to_payload();
                state.registry.broadcast_all(&payload).await;
            }
        }
        ClientEvent::PresenceLocation { data } => {
            if let Some(rec) = state
                .presence
                .update_location(&claims.sub, data.location, data.page)
                .await
            {
                let payload = ServerEvent::PresenceUpdate { data: rec }.to_payload();
                state.registry.broadcast_all(&payload).await;
            }
        }
        ClientEvent::ProjectJoin { data } => {
            let room = project_room(&data.project_id);
            state.rooms.join(&room, connection_id).await;
            if let Some(rec) = state
                .presence
                .set_project(&claims.sub, Some(data.project_id))
                .await
            {
                let payload = ServerEvent::PresenceUpdate { data: rec }.to_payload();
                state.registry.broadcast_all(&payload).await;
            }
        }
        ClientEvent::ProjectLeave { data } => {
            let room = project_room(&data.project_id);
            state.rooms.leave(&room, connection_id).await;
            if let Some(rec) = state.presence.set_project(&claims.sub, None).await {
                let payload = ServerEvent::PresenceUpdate { data: rec }.to_payload();
                state.registry.broadcast_all(&payload).await;
            }
        }
        ClientEvent::Update { data } => {
            // Room-scoped whenever a project id is available; global fan-out
            // is reserved for presence lifecycle events.
            let room = data.project_id.as_deref().map(project_room);
            let payload = ServerEvent::Update {
                data: data.stamped(&claims.sub),
            }
            .to_payload();
            let delivered = match &room {
                Some(room) => state.rooms.broadcast(room, &payload).await,
                None => state.registry.broadcast_all(&payload).await,
            };
            debug!(user_id = %claims.sub, room = room.as_deref(), delivered, "update relayed");
        }
        ClientEvent::CursorMove { data } => {
            let (scope, name) = sender_scope(state, claims).await;
            let event = ServerEvent::CursorMove {
                data: json!({
                    "x": data.x,
                    "y": data.y,
                    "context": data.context,
                    "userId": claims.sub,
                    "name": name,
                }),
            };
            relay_to_others(state, connection_id, scope, &event).await;
        }
        ClientEvent::TypingStart { data } => {
            let (scope, name) = sender_scope(state, claims).await;
            let event = ServerEvent::TypingStart {
                data: json!({ "context": data.context, "userId": claims.sub, "name": name }),
            };
            relay_to_others(state, connection_id, scope, &event).await;
        }
        ClientEvent::TypingStop { data } => {
            let (scope, name) = sender_scope(state, claims).await;
            let event = ServerEvent::TypingStop {
                data: json!({ "context": data.context, "userId": claims.sub, "name": name }),
            };
            relay_to_others(state, connection_id, scope, &event).await;
        }
    }
}

/// Ephemeral events relay within the sender's current project room when one
/// is joined, otherwise to every other connection. Never stored.
async fn sender_scope(state: &AppState, claims: &Claims) -> (Option<String>, String) {
    match state.presence.get(&claims.sub).await {
        Some(rec) => (
            rec.current_project.as_deref().map(project_room),
            rec.display_name,
        ),
        None => (None, claims.default_display_name()),
    }
}

async fn relay_to_others(
    state: &AppState,
    connection_id: &str,
    scope: Option<String>,
    event: &ServerEvent,
) {
    let payload = event.to_payload();
    match scope {
        Some(room) => {
            state
                .rooms
                .broadcast_except(&room, connection_id, &payload)
                .await;
        }
        None => {
            state.registry.broadcast_except(connection_id, &payload).await;
        }
    }
}
