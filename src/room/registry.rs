use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use crate::game::RoomState;

/// A room behind its own lock. All mutations of one room are serialized by
/// this mutex; rooms never touch each other.
pub type SharedRoom = Arc<Mutex<RoomState>>;

/// Owns the mapping from room code to room. Rooms are created on first join
/// and destroyed when their last seat empties; nothing else may hold a room
/// beyond a single reaction, so timer continuations must re-resolve their
/// room here before acting.
pub struct RoomRegistry {
    rooms: Mutex<HashMap<String, SharedRoom>>,
}

/// Room codes are case-insensitive and whitespace-tolerant.
pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            rooms: Mutex::new(HashMap::new()),
        }
    }

    /// Fetches the room for `code`, creating it when unseen.
    pub fn get_or_create(&self, code: &str) -> SharedRoom {
        let mut rooms = self.rooms.lock().unwrap();
        if let Some(room) = rooms.get(code) {
            return Arc::clone(room);
        }
        info!(room_code = %code, "Creating room");
        let room = Arc::new(Mutex::new(RoomState::new(code)));
        rooms.insert(code.to_string(), Arc::clone(&room));
        room
    }

    pub fn get(&self, code: &str) -> Option<SharedRoom> {
        let rooms = self.rooms.lock().unwrap();
        rooms.get(code).cloned()
    }

    pub fn remove(&self, code: &str) {
        let mut rooms = self.rooms.lock().unwrap();
        if rooms.remove(code).is_some() {
            info!(room_code = %code, "Room destroyed");
        } else {
            debug!(room_code = %code, "Remove requested for unknown room");
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.lock().unwrap().len()
    }
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}
