use super::protocol::ServerMessage;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, error, info};
use uuid::Uuid;

/// Per-connection outbound buffer depth
pub const CONNECTION_BUFFER: usize = 32;

/// Registry of live push connections.
///
/// Each connection is an mpsc sender drained by its socket task; broadcasting
/// never awaits a slow client.
pub struct Notifier {
    connections: DashMap<Uuid, mpsc::Sender<String>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection; the receiver yields serialized messages for it.
    pub fn register(&self) -> (Uuid, mpsc::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(CONNECTION_BUFFER);
        self.connections.insert(id, tx);
        info!(connection_id = %id, total = self.connections.len(), "Push connection registered");
        (id, rx)
    }

    pub fn unregister(&self, id: &Uuid) {
        if self.connections.remove(id).is_some() {
            info!(connection_id = %id, total = self.connections.len(), "Push connection removed");
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Send a message to every connection. Returns how many accepted it.
    ///
    /// Closed connections are dropped from the registry; a full buffer skips
    /// that client for this message only.
    pub fn broadcast(&self, message: &ServerMessage) -> usize {
        if self.connections.is_empty() {
            debug!("No push connections to broadcast to");
            return 0;
        }

        let json = match serde_json::to_string(message) {
            Ok(j) => j,
            Err(e) => {
                error!(error = %e, "Failed to serialize push message");
                return 0;
            }
        };

        let mut delivered = 0;
        let mut closed = Vec::new();

        for entry in self.connections.iter() {
            match entry.value().try_send(json.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!(connection_id = %entry.key(), "Push buffer full, skipping client");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(*entry.key()),
            }
        }

        // Removal happens after iteration; DashMap shards stay locked while iterating
        for id in &closed {
            self.connections.remove(id);
        }
        if !closed.is_empty() {
            info!(removed = closed.len(), "Cleaned up closed push connections");
        }

        debug!(delivered = delivered, failed = closed.len(), "Broadcast complete");
        delivered
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
