//! Room manager: project-scoped broadcast membership.

use crate::services::registry::ConnectionRegistry;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Room id for a project (`project:<id>`).
pub fn project_room(project_id: &str) -> String {
    format!("project:{}", project_id)
}

/// Tracks which connections joined which rooms and fans events out through
/// the registry. Broadcast cost is proportional to current membership only.
#[derive(Clone)]
pub struct RoomManager {
    registry: Arc<ConnectionRegistry>,
    /// room id -> member connection ids.
    rooms: Arc<RwLock<HashMap<String, HashSet<String>>>>,
}

impl RoomManager {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self {
            registry,
            rooms: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Idempotent.
    pub async fn join(&self, room_id: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
        debug!(room_id, connection_id, "room join");
    }

    /// Idempotent; leaving a room you never joined is a no-op.
    pub async fn leave(&self, room_id: &str, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(connection_id);
        }
        debug!(room_id, connection_id, "room leave");
    }

    /// Remove the connection from every room it belonged to. Called on
    /// disconnect so membership never leaks.
    pub async fn leave_all(&self, connection_id: &str) {
        let mut rooms = self.rooms.write().await;
        rooms.retain(|_, members| {
            members.remove(connection_id);
            !members.is_empty()
        });
    }

    pub async fn members(&self, room_id: &str) -> Vec<String> {
        self.rooms
            .read()
            .await
            .get(room_id)
            .map(|m| m.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Deliver to every current member. An empty or unknown room is a no-op.
    pub async fn broadcast(&self, room_id: &str, payload: &str) -> usize {
        let members = self.members(room_id).await;
        if members.is_empty() {
            return 0;
        }
        self.registry.send_to_many(&members, payload).await
    }

    /// Room delivery with the sender's connection excluded.
    pub async fn broadcast_except(&self, room_id: &str, sender: &str, payload: &str) -> usize {
        let members: Vec<String> = self
            .members(room_id)
            .await
            .into_iter()
            .filter(|c| c.as_str() != sender)
            .collect();
        if members.is_empty() {
            return 0;
        }
        self.registry.send_to_many(&members, payload).await
    }
}
