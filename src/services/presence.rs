//! Presence store: the single source of truth for who is online.

use crate::auth::Claims;
use crate::models::presence::{PresenceRecord, Status};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Concurrent map of user id -> presence record. All mutations take the write
/// lock, so readers never observe a record mid-mutation; `snapshot` clones
/// under the read lock for a consistent point-in-time copy.
#[derive(Clone, Default)]
pub struct PresenceStore {
    records: Arc<RwLock<HashMap<String, PresenceRecord>>>,
}

impl PresenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or refresh the user's record for a newly authenticated
    /// connection. An existing record is overwritten (status back to online,
    /// `connection_id` pointing at the new connection, no stale context
    /// fields); only the set of other live connection ids carries over.
    ///
    /// Returns the stored record and whether the user just came online
    /// (no record, or no live connections left on the old one).
    pub async fn upsert(
        &self,
        claims: &Claims,
        display_name: Option<String>,
        connection_id: &str,
    ) -> (PresenceRecord, bool) {
        let mut fresh = PresenceRecord::new(claims, display_name, connection_id);
        let mut records = self.records.write().await;
        let came_online = match records.get(&claims.sub) {
            None => true,
            Some(prev) => {
                for conn in &prev.connections {
                    fresh.connections.insert(conn.clone());
                }
                prev.connections.is_empty()
            }
        };
        records.insert(claims.sub.clone(), fresh.clone());
        info!(user_id = %claims.sub, connection_id, came_online, "presence upsert");
        (fresh, came_online)
    }

    /// No-op when the record is already gone (race with eviction).
    pub async fn update_status(&self, user_id: &str, status: Status) -> Option<PresenceRecord> {
        let mut records = self.records.write().await;
        let rec = records.get_mut(user_id)?;
        rec.status = status;
        rec.last_seen = Utc::now();
        Some(rec.clone())
    }

    /// No-op when the record is already gone.
    pub async fn update_location(
        &self,
        user_id: &str,
        location: String,
        page: Option<String>,
    ) -> Option<PresenceRecord> {
        let mut records = self.records.write().await;
        let rec = records.get_mut(user_id)?;
        rec.location = Some(location);
        rec.current_page = page;
        rec.last_seen = Utc::now();
        Some(rec.clone())
    }

    /// Set or clear the user's current project. No-op when the record is gone.
    pub async fn set_project(
        &self,
        user_id: &str,
        project: Option<String>,
    ) -> Option<PresenceRecord> {
        let mut records = self.records.write().await;
        let rec = records.get_mut(user_id)?;
        rec.current_project = project;
        rec.last_seen = Utc::now();
        Some(rec.clone())
    }

    pub async fn get(&self, user_id: &str) -> Option<PresenceRecord> {
        self.records.read().await.get(user_id).cloned()
    }

    /// Consistent point-in-time copy of every record.
    pub async fn snapshot(&self) -> Vec<PresenceRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// Remove one connection id from the user's record. When that was the
    /// user's last live connection the record flips to offline for the grace
    /// window and the updated record is returned with `true`.
    pub async fn drop_connection(
        &self,
        user_id: &str,
        connection_id: &str,
    ) -> Option<(PresenceRecord, bool)> {
        let mut records = self.records.write().await;
        let rec = records.get_mut(user_id)?;
        rec.connections.remove(connection_id);
        let now_empty = rec.connections.is_empty();
        if now_empty {
            rec.status = Status::Offline;
            rec.last_seen = Utc::now();
        }
        Some((rec.clone(), now_empty))
    }

    /// Delete the record only if it is still owned by `expected_connection_id`
    /// and no live connection remains. A fresher `upsert` changed the stored
    /// connection id, so a stale grace-period eviction becomes a no-op here
    /// without any timer bookkeeping.
    pub async fn remove_if_current(&self, user_id: &str, expected_connection_id: &str) -> bool {
        let mut records = self.records.write().await;
        let evict = records
            .get(user_id)
            .map(|rec| rec.connection_id == expected_connection_id && rec.connections.is_empty())
            .unwrap_or(false);
        if evict {
            records.remove(user_id);
            debug!(user_id, connection_id = expected_connection_id, "presence evicted");
        }
        evict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(user_id: &str) -> Claims {
        Claims {
            sub: user_id.to_string(),
            email: format!("{}@example.com", user_id),
            role: None,
            exp: 0,
            iat: 0,
        }
    }

    #[tokio::test]
    async fn snapshot_contains_every_connected_user() {
        let store = PresenceStore::new();
        for i in 0..5 {
            let user = format!("u{}", i);
            store.upsert(&claims(&user), None, &format!("c{}", i)).await;
        }
        let snap = store.snapshot().await;
        assert_eq!(snap.len(), 5);
        assert!(snap.iter().all(|r| r.status == Status::Online));
    }

    #[tokio::test]
    async fn upsert_refreshes_connection_and_resets_status() {
        let store = PresenceStore::new();
        store.upsert(&claims("u1"), None, "c1").await;
        store.update_status("u1", Status::Away).await;
        store.drop_connection("u1", "c1").await;

        let (rec, came_online) = store.upsert(&claims("u1"), None, "c2").await;
        assert!(came_online, "reconnect after last connection dropped");
        assert_eq!(rec.connection_id, "c2");
        assert_eq!(rec.status, Status::Online);
    }

    #[tokio::test]
    async fn second_tab_is_not_a_join() {
        let store = PresenceStore::new();
        let (_, first) = store.upsert(&claims("u1"), None, "c1").await;
        let (rec, second) = store.upsert(&claims("u1"), None, "c2").await;
        assert!(first);
        assert!(!second);
        assert!(rec.connections.contains("c1") && rec.connections.contains("c2"));
        assert_eq!(store.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn mutations_on_missing_user_are_silent() {
        let store = PresenceStore::new();
        assert!(store.update_status("ghost", Status::Busy).await.is_none());
        assert!(store
            .update_location("ghost", "office".into(), None)
            .await
            .is_none());
        assert!(store.set_project("ghost", None).await.is_none());
        assert!(store.drop_connection("ghost", "c1").await.is_none());
    }

    #[tokio::test]
    async fn drop_last_connection_flips_offline() {
        let store = PresenceStore::new();
        store.upsert(&claims("u1"), None, "c1").await;
        store.upsert(&claims("u1"), None, "c2").await;

        let (_, empty) = store.drop_connection("u1", "c1").await.unwrap();
        assert!(!empty);
        let (rec, empty) = store.drop_connection("u1", "c2").await.unwrap();
        assert!(empty);
        assert_eq!(rec.status, Status::Offline);
    }

    #[tokio::test]
    async fn remove_requires_matching_connection() {
        let store = PresenceStore::new();
        store.upsert(&claims("u1"), None, "c1").await;
        store.drop_connection("u1", "c1").await;

        // A newer connection supersedes the pending eviction.
        store.upsert(&claims("u1"), None, "c2").await;
        assert!(!store.remove_if_current("u1", "c1").await);
        assert!(store.get("u1").await.is_some());

        store.drop_connection("u1", "c2").await;
        assert!(store.remove_if_current("u1", "c2").await);
        assert!(store.get("u1").await.is_none());
    }

    #[tokio::test]
    async fn remove_keeps_record_while_connections_remain() {
        let store = PresenceStore::new();
        store.upsert(&claims("u1"), None, "c1").await;
        store.upsert(&claims("u1"), None, "c2").await;
        store.drop_connection("u1", "c2").await;
        // c2 is the most recent connection id but c1 is still live.
        assert!(!store.remove_if_current("u1", "c2").await);
        assert!(store.get("u1").await.is_some());
    }

    #[tokio::test]
    async fn location_update_stamps_fields() {
        let store = PresenceStore::new();
        store.upsert(&claims("u1"), None, "c1").await;
        let rec = store
            .update_location("u1", "office".into(), Some("dashboard".into()))
            .await
            .unwrap();
        assert_eq!(rec.location.as_deref(), Some("office"));
        assert_eq!(rec.current_page.as_deref(), Some("dashboard"));
    }
}
