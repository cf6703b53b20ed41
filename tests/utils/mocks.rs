use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use cappotto::websockets::ConnectionManager;

// ============================================================================
// Mock Infrastructure
// ============================================================================

#[derive(Clone, Default)]
pub struct MockConnectionManager {
    sent_messages: Arc<RwLock<HashMap<Uuid, Vec<String>>>>,
    connected: Arc<RwLock<Vec<Uuid>>>,
}

impl MockConnectionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_messages_for(&self, conn_id: Uuid) -> Vec<String> {
        self.sent_messages
            .read()
            .await
            .get(&conn_id)
            .cloned()
            .unwrap_or_default()
    }

    pub async fn clear_messages(&self) {
        self.sent_messages.write().await.clear();
    }

    pub async fn is_connected(&self, conn_id: Uuid) -> bool {
        self.connected.read().await.contains(&conn_id)
    }
}

#[async_trait]
impl ConnectionManager for MockConnectionManager {
    async fn add_connection(&self, conn_id: Uuid, _sender: mpsc::UnboundedSender<String>) {
        self.connected.write().await.push(conn_id);
    }

    async fn remove_connection(&self, conn_id: Uuid) {
        self.connected.write().await.retain(|c| *c != conn_id);
    }

    async fn send_to_connection(&self, conn_id: Uuid, message: &str) {
        self.sent_messages
            .write()
            .await
            .entry(conn_id)
            .or_default()
            .push(message.to_string());
    }

    async fn send_to_connections(&self, conn_ids: &[Uuid], message: &str) {
        for conn_id in conn_ids {
            self.send_to_connection(*conn_id, message).await;
        }
    }
}
