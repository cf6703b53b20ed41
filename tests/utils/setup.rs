use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use cappotto::game::{Card, GameSettings, Phase};
use cappotto::room::{RoomRegistry, RoomService, SharedRoom, Timings};
use cappotto::websockets::{MessageType, WebSocketMessage};

use super::mocks::MockConnectionManager;

pub const ROOM: &str = "ABCD";

/// A room service wired to a mock transport, with every sleep shrunk to
/// milliseconds.
pub struct TestSetup {
    pub service: Arc<RoomService>,
    pub registry: Arc<RoomRegistry>,
    pub connections: Arc<MockConnectionManager>,
    conn_ids: HashMap<String, Uuid>,
}

pub struct TestSetupBuilder {
    names: Vec<String>,
}

impl TestSetupBuilder {
    pub fn new() -> Self {
        Self { names: Vec::new() }
    }

    pub fn with_players(mut self, names: &[&str]) -> Self {
        self.names = names.iter().map(|n| n.to_string()).collect();
        self
    }

    pub async fn build(self) -> TestSetup {
        let registry = Arc::new(RoomRegistry::new());
        let connections = Arc::new(MockConnectionManager::new());
        let service = Arc::new(RoomService::new(
            Arc::clone(&registry),
            connections.clone(),
            Timings::fast(),
        ));
        let mut setup = TestSetup {
            service,
            registry,
            connections,
            conn_ids: HashMap::new(),
        };
        for name in &self.names {
            assert!(setup.join(name).await, "seeded player was rejected");
        }
        setup
    }
}

impl Default for TestSetupBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSetup {
    /// Joins (or rejoins) the test room with a fresh connection id.
    pub async fn join(&mut self, name: &str) -> bool {
        let conn_id = Uuid::new_v4();
        let seated = self.service.join(conn_id, ROOM, name).await;
        if seated {
            self.conn_ids.insert(name.to_string(), conn_id);
        }
        seated
    }

    pub fn conn(&self, name: &str) -> Uuid {
        *self
            .conn_ids
            .get(name)
            .unwrap_or_else(|| panic!("no connection for {}", name))
    }

    pub fn room(&self) -> SharedRoom {
        self.registry.get(ROOM).expect("test room should exist")
    }

    // ---- actions -----------------------------------------------------------

    pub async fn start_game(&self, host: &str) {
        self.service
            .start_game(self.conn(host), ROOM, GameSettings::default())
            .await;
    }

    pub async fn bid(&self, name: &str, amount: u8) {
        self.service.place_bid(self.conn(name), ROOM, amount).await;
    }

    pub async fn play(&self, name: &str, hand_index: usize) {
        self.service
            .play_card(self.conn(name), ROOM, hand_index, None)
            .await;
    }

    /// Overwrites the randomly dealt round with a deterministic single-card
    /// layout and restarts the bidding cycle.
    pub fn rig_single_card_round(&self, cards: &[(&str, Card)]) {
        let room = self.room();
        let mut room = room.lock().unwrap();
        room.round_cards = 1;
        for (name, card) in cards {
            let seat = room.seat_by_name(name).expect("rigged player not seated");
            room.players[seat].hand = vec![*card];
            room.players[seat].bid = None;
            room.players[seat].tricks_won = 0;
        }
        room.table_cards.clear();
        room.resolving = false;
        room.phase = Phase::Bidding;
        room.first_bidder_seat = room.next_alive_seat(room.dealer_seat);
        room.current_seat = room.first_bidder_seat;
    }

    // ---- state queries -----------------------------------------------------

    pub fn current_player(&self) -> String {
        let room = self.room();
        let room = room.lock().unwrap();
        room.players[room.current_seat].name.clone()
    }

    pub fn dealer(&self) -> String {
        let room = self.room();
        let room = room.lock().unwrap();
        room.players[room.dealer_seat].name.clone()
    }

    pub fn lives(&self, name: &str) -> i32 {
        let room = self.room();
        let room = room.lock().unwrap();
        let seat = room.seat_by_name(name).expect("player not seated");
        room.players[seat].lives
    }

    pub fn phase(&self) -> Phase {
        self.room().lock().unwrap().phase
    }

    pub fn player_count(&self) -> usize {
        self.room().lock().unwrap().players.len()
    }

    // ---- message assertions ------------------------------------------------

    pub async fn messages_for(&self, name: &str) -> Vec<String> {
        self.connections.get_messages_for(self.conn(name)).await
    }

    pub async fn message_types_for(&self, name: &str) -> Vec<MessageType> {
        self.messages_for(name)
            .await
            .iter()
            .filter_map(|m| serde_json::from_str::<WebSocketMessage>(m).ok())
            .map(|m| m.message_type)
            .collect()
    }

    pub async fn received(&self, name: &str, message_type: MessageType) -> bool {
        self.message_types_for(name).await.contains(&message_type)
    }

    pub async fn clear_messages(&self) {
        self.connections.clear_messages().await;
    }
}
