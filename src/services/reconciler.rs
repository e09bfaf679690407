//! Disconnect reconciliation: immediate cleanup plus grace-delayed eviction.

use crate::models::event::ServerEvent;
use crate::services::{ConnectionRegistry, PresenceStore, RoomManager};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Run when a connection closes for any reason.
///
/// Room membership and the registry entry go away immediately. If that was
/// the user's last live connection, everyone gets a provisional
/// `presence:user_left` right away and a timer task evicts the record after
/// the grace period. A reconnect inside the window changes the record's
/// stored connection id, so the delayed `remove_if_current` fails its
/// identity check and becomes a no-op; no timer cancellation needed.
pub async fn handle_disconnect(
    presence: PresenceStore,
    registry: Arc<ConnectionRegistry>,
    rooms: RoomManager,
    user_id: &str,
    connection_id: &str,
    grace_period: Duration,
) {
    rooms.leave_all(connection_id).await;
    // No-op if the registry already dropped the handle (backpressure kick).
    registry.forget(connection_id).await;

    let Some((record, now_empty)) = presence.drop_connection(user_id, connection_id).await
    else {
        return;
    };
    if !now_empty {
        debug!(user_id = %user_id, connection_id, "disconnect with other connections live");
        return;
    }

    info!(user_id = %user_id, connection_id, "user went offline, grace period starts");
    let payload = ServerEvent::UserLeft { data: record }.to_payload();
    registry.broadcast_all(&payload).await;

    let user_id = user_id.to_string();
    let connection_id = connection_id.to_string();
    tokio::spawn(async move {
        tokio::time::sleep(grace_period).await;
        if presence.remove_if_current(&user_id, &connection_id).await {
            debug!(user_id = %user_id, connection_id = %connection_id, "grace period elapsed, presence evicted");
        }
    });
}
