// Library crate for the cappotto game server
// This file exposes the public API for integration tests

pub mod game;
pub mod room;
pub mod shared;
pub mod websockets;

// Re-export commonly used types for easier access in tests
pub use game::{Card, GameSettings, Phase, Player, RoomState, RuleError, Suit};
pub use room::{RoomRegistry, RoomService, Timings};
pub use shared::AppError;
pub use websockets::{
    ConnectionManager, GameReceiveHandler, MessageHandler, MessageType, WebSocketMessage,
};
