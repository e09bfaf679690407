//! Connection registry: resolves connection ids to users and owns the
//! per-connection outbound queues.

use crate::error::AppError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify, RwLock};
use tracing::{debug, warn};

/// Live connection: owning user, bounded outbound queue, and a kick signal
/// the read loop selects on so a backpressured connection can be closed.
struct ConnectionHandle {
    user_id: String,
    tx: mpsc::Sender<String>,
    kick: Arc<Notify>,
}

/// Map of connection id -> handle. Entries are registered at handshake and
/// forgotten immediately at disconnect (never grace-delayed).
///
/// All delivery is non-blocking `try_send`; a full queue gets the connection
/// kicked so one slow reader never stalls fan-out to anyone else.
/// Per-connection delivery order is FIFO.
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, ConnectionHandle>>,
    queue_capacity: usize,
}

impl ConnectionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            queue_capacity,
        }
    }

    /// Register a connection; returns the queue receiver for the writer task
    /// and the kick signal for the read loop.
    pub async fn register(
        &self,
        connection_id: &str,
        user_id: &str,
    ) -> (mpsc::Receiver<String>, Arc<Notify>) {
        let (tx, rx) = mpsc::channel(self.queue_capacity);
        let kick = Arc::new(Notify::new());
        let handle = ConnectionHandle {
            user_id: user_id.to_string(),
            tx,
            kick: kick.clone(),
        };
        self.connections
            .write()
            .await
            .insert(connection_id.to_string(), handle);
        (rx, kick)
    }

    /// Which user does this connection belong to?
    pub async fn resolve(&self, connection_id: &str) -> Option<String> {
        self.connections
            .read()
            .await
            .get(connection_id)
            .map(|h| h.user_id.clone())
    }

    pub async fn forget(&self, connection_id: &str) {
        self.connections.write().await.remove(connection_id);
    }

    /// Deliver to a single connection. Unknown ids are a silent no-op.
    pub async fn send_to(&self, connection_id: &str, payload: &str) {
        self.fanout(|id, _| id == connection_id, payload).await;
    }

    /// Deliver to every connection of one user. Returns how many queues
    /// accepted the payload.
    pub async fn send_to_user(&self, user_id: &str, payload: &str) -> usize {
        self.fanout(|_, uid| uid == user_id, payload).await
    }

    /// Deliver to every open connection.
    pub async fn broadcast_all(&self, payload: &str) -> usize {
        self.fanout(|_, _| true, payload).await
    }

    /// Deliver to every open connection except the sender's.
    pub async fn broadcast_except(&self, sender: &str, payload: &str) -> usize {
        self.fanout(|id, _| id != sender, payload).await
    }

    /// Deliver to a specific set of connections (room fan-out).
    pub async fn send_to_many(&self, connection_ids: &[String], payload: &str) -> usize {
        self.fanout(|id, _| connection_ids.iter().any(|c| c.as_str() == id), payload)
            .await
    }

    async fn fanout<F>(&self, include: F, payload: &str) -> usize
    where
        F: Fn(&str, &str) -> bool,
    {
        let mut delivered = 0;
        let mut kicked = Vec::new();
        {
            let connections = self.connections.read().await;
            for (id, handle) in connections.iter() {
                if !include(id, &handle.user_id) {
                    continue;
                }
                match handle.tx.try_send(payload.to_string()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        let err = AppError::Backpressure(id.clone());
                        warn!(user_id = %handle.user_id, error = %err, "closing connection");
                        kicked.push(id.clone());
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        debug!(connection_id = %id, "outbound queue closed");
                        kicked.push(id.clone());
                    }
                }
            }
        }
        if !kicked.is_empty() {
            let mut connections = self.connections.write().await;
            for id in kicked {
                if let Some(handle) = connections.remove(&id) {
                    handle.kick.notify_one();
                }
            }
        }
        delivered
    }
}
