use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Transport seam: the game core addresses clients only through this trait.
/// Connections are keyed by their volatile connection id; the durable
/// identity (display name) lives in the room state.
#[async_trait]
pub trait ConnectionManager: Send + Sync {
    async fn add_connection(&self, conn_id: Uuid, sender: mpsc::UnboundedSender<String>);

    async fn remove_connection(&self, conn_id: Uuid);

    async fn send_to_connection(&self, conn_id: Uuid, message: &str);

    async fn send_to_connections(&self, conn_ids: &[Uuid], message: &str);
}

pub struct InMemoryConnectionManager {
    connections: Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<String>>>>,
}

impl InMemoryConnectionManager {
    pub fn new() -> Self {
        Self {
            connections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for InMemoryConnectionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionManager for InMemoryConnectionManager {
    async fn add_connection(&self, conn_id: Uuid, sender: mpsc::UnboundedSender<String>) {
        let mut connections = self.connections.write().await;
        connections.insert(conn_id, sender);
    }

    async fn remove_connection(&self, conn_id: Uuid) {
        let mut connections = self.connections.write().await;
        connections.remove(&conn_id);
    }

    async fn send_to_connection(&self, conn_id: Uuid, message: &str) {
        let connections = self.connections.read().await;
        if let Some(sender) = connections.get(&conn_id) {
            // A closed channel just means the client is already gone.
            let _ = sender.send(message.to_string());
        }
    }

    async fn send_to_connections(&self, conn_ids: &[Uuid], message: &str) {
        let connections = self.connections.read().await;
        for conn_id in conn_ids {
            if let Some(sender) = connections.get(conn_id) {
                let _ = sender.send(message.to_string());
            }
        }
    }
}
