//! Presence records: who is online and where.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

use crate::auth::Claims;

/// A user's activity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Online,
    Away,
    Busy,
    /// Only ever observed during the grace window before eviction.
    Offline,
}

/// Presence record for one user. Exactly one per user id while any of their
/// connections is open.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceRecord {
    pub user_id: String,
    /// Most-recently-associated live connection id.
    pub connection_id: String,
    /// All live connection ids for this user (multi-tab). The user is only
    /// considered gone once this set empties.
    #[serde(skip)]
    pub connections: HashSet<String>,
    pub display_name: String,
    pub email: String,
    pub status: Status,
    /// Stamped on every status/location/project mutation.
    pub last_seen: DateTime<Utc>,
    /// Free-text location context (e.g. "office").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Project room the user has joined, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_project: Option<String>,
    /// Free-text page context (e.g. "dashboard").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_page: Option<String>,
}

impl PresenceRecord {
    /// Fresh record for a newly authenticated connection. Status starts
    /// online; no context fields carry over from any prior session.
    pub fn new(claims: &Claims, display_name: Option<String>, connection_id: &str) -> Self {
        Self {
            user_id: claims.sub.clone(),
            connection_id: connection_id.to_string(),
            connections: HashSet::from([connection_id.to_string()]),
            display_name: display_name.unwrap_or_else(|| claims.default_display_name()),
            email: claims.email.clone(),
            status: Status::Online,
            last_seen: Utc::now(),
            location: None,
            current_project: None,
            current_page: None,
        }
    }
}

/// Generate a unique connection id.
pub fn generate_connection_id() -> String {
    format!("{}.{}", std::process::id(), Uuid::new_v4().as_simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims() -> Claims {
        Claims {
            sub: "u1".to_string(),
            email: "ana@example.com".to_string(),
            role: None,
            exp: 0,
            iat: 0,
        }
    }

    #[test]
    fn new_record_starts_online() {
        let rec = PresenceRecord::new(&claims(), None, "c1");
        assert_eq!(rec.status, Status::Online);
        assert_eq!(rec.display_name, "ana");
        assert!(rec.connections.contains("c1"));
        assert!(rec.current_project.is_none());
    }

    #[test]
    fn explicit_display_name_wins() {
        let rec = PresenceRecord::new(&claims(), Some("Ana P.".to_string()), "c1");
        assert_eq!(rec.display_name, "Ana P.");
    }

    #[test]
    fn record_serializes_camel_case_without_connection_set() {
        let rec = PresenceRecord::new(&claims(), None, "c1");
        let v = serde_json::to_value(&rec).unwrap();
        assert_eq!(v.get("userId").and_then(|v| v.as_str()), Some("u1"));
        assert_eq!(v.get("status").and_then(|v| v.as_str()), Some("online"));
        assert!(v.get("connections").is_none());
        assert!(v.get("location").is_none());
    }

    #[test]
    fn connection_ids_are_unique() {
        assert_ne!(generate_connection_id(), generate_connection_id());
    }
}
