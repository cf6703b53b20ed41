use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::game::{AceChoice, Card, GameSettings, Phase, PlayedCard, SettlementReport};

/// Message types for WebSocket communication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    // Client -> Server
    StartGame,
    PlaceBid,
    PlayCard,
    TogglePause,
    SwitchRole,
    LeaveGame,
    LeaveRoom,
    VoteRestart,

    // Server -> Client
    StateSnapshot,
    PlayersUpdate,
    TableUpdate,
    HandUpdate,
    TurnUpdate,
    TrickResult,
    RoundReport,
    BonusUpdate,
    PauseState,
    GameOver,
    BackToLobby,
    BlindRound,
    ClearBlind,
    ForceKick,
    Warning,
    ErrorMsg,
}

/// Metadata for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessageMeta {
    pub timestamp: DateTime<Utc>,
}

/// Base structure for WebSocket messages
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebSocketMessage {
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub payload: serde_json::Value,
    pub meta: Option<WebSocketMessageMeta>,
}

/// Client-to-Server message payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartGamePayload {
    pub starting_lives: i32,
    #[serde(default)]
    pub blind_final_round: bool,
}

impl From<StartGamePayload> for GameSettings {
    fn from(p: StartGamePayload) -> Self {
        GameSettings {
            starting_lives: if p.starting_lives > 0 { p.starting_lives } else { 5 },
            blind_final_round: p.blind_final_round,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceBidPayload {
    pub amount: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayCardPayload {
    pub hand_index: usize,
    #[serde(default)]
    pub ace_choice: Option<AceChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwitchRolePayload {
    pub wants_active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveGamePayload {
    #[serde(default = "default_keep_spectating")]
    pub keep_spectating: bool,
}

fn default_keep_spectating() -> bool {
    true
}

/// Server-to-Client message payloads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSummary {
    pub name: String,
    pub lives: i32,
    pub bid: Option<u8>,
    pub tricks_won: u8,
    pub is_spectator: bool,
    pub is_dealer: bool,
    pub hand_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayersUpdatePayload {
    pub players: Vec<PlayerSummary>,
    pub is_host: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateSnapshotPayload {
    pub hand: Vec<Card>,
    pub phase: Phase,
    pub table: Vec<PlayedCard>,
    pub players: Vec<PlayerSummary>,
    pub round_cards: u8,
    pub bonus: BonusUpdatePayload,
    pub is_host: bool,
    pub is_my_turn: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnUpdatePayload {
    pub active_player: String,
    pub phase: Phase,
    pub round_cards: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrickResultPayload {
    pub winner: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BonusUpdatePayload {
    pub used: bool,
    pub beneficiaries: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PauseStatePayload {
    pub paused: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameOverPayload {
    pub winner: String,
}

/// One seat's face-up card on the blind final round. `card` is `None` for
/// seats that are not dealt in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlindCard {
    pub name: String,
    pub card: Option<Card>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarningPayload {
    pub message: String,
}

/// Helper functions for creating messages
impl WebSocketMessage {
    pub fn new(message_type: MessageType, payload: serde_json::Value) -> Self {
        Self {
            message_type,
            payload,
            meta: Some(WebSocketMessageMeta {
                timestamp: Utc::now(),
            }),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }

    /// Create a STATE_SNAPSHOT message (full reconnect payload)
    pub fn state_snapshot(payload: StateSnapshotPayload) -> Self {
        Self::new(
            MessageType::StateSnapshot,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a PLAYERS_UPDATE message
    pub fn players_update(players: Vec<PlayerSummary>, is_host: bool) -> Self {
        let payload = PlayersUpdatePayload { players, is_host };
        Self::new(
            MessageType::PlayersUpdate,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a TABLE_UPDATE message
    pub fn table_update(table: &[PlayedCard]) -> Self {
        Self::new(
            MessageType::TableUpdate,
            serde_json::to_value(table).unwrap(),
        )
    }

    /// Create a HAND_UPDATE message (private, per player)
    pub fn hand_update(hand: &[Card]) -> Self {
        Self::new(MessageType::HandUpdate, serde_json::to_value(hand).unwrap())
    }

    /// Create a TURN_UPDATE message
    pub fn turn_update(active_player: String, phase: Phase, round_cards: u8) -> Self {
        let payload = TurnUpdatePayload {
            active_player,
            phase,
            round_cards,
        };
        Self::new(
            MessageType::TurnUpdate,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a TRICK_RESULT message
    pub fn trick_result(winner: String) -> Self {
        let payload = TrickResultPayload { winner };
        Self::new(
            MessageType::TrickResult,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a ROUND_REPORT message
    pub fn round_report(report: &SettlementReport) -> Self {
        Self::new(
            MessageType::RoundReport,
            serde_json::to_value(report).unwrap(),
        )
    }

    /// Create a BONUS_UPDATE message
    pub fn bonus_update(used: bool, beneficiaries: Vec<String>) -> Self {
        let payload = BonusUpdatePayload {
            used,
            beneficiaries,
        };
        Self::new(
            MessageType::BonusUpdate,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a PAUSE_STATE message
    pub fn pause_state(paused: bool) -> Self {
        let payload = PauseStatePayload { paused };
        Self::new(
            MessageType::PauseState,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a GAME_OVER message
    pub fn game_over(winner: String) -> Self {
        let payload = GameOverPayload { winner };
        Self::new(
            MessageType::GameOver,
            serde_json::to_value(payload).unwrap(),
        )
    }

    /// Create a BACK_TO_LOBBY message
    pub fn back_to_lobby() -> Self {
        Self::new(MessageType::BackToLobby, serde_json::Value::Null)
    }

    /// Create a BLIND_ROUND message exposing every seat's single card
    pub fn blind_round(cards: Vec<BlindCard>) -> Self {
        Self::new(
            MessageType::BlindRound,
            serde_json::to_value(cards).unwrap(),
        )
    }

    /// Create a CLEAR_BLIND message
    pub fn clear_blind() -> Self {
        Self::new(MessageType::ClearBlind, serde_json::Value::Null)
    }

    /// Create a FORCE_KICK message telling a purged client to disconnect
    pub fn force_kick() -> Self {
        Self::new(MessageType::ForceKick, serde_json::Value::Null)
    }

    /// Create a WARNING message (advisory, state unchanged)
    pub fn warning(message: String) -> Self {
        let payload = WarningPayload { message };
        Self::new(MessageType::Warning, serde_json::to_value(payload).unwrap())
    }

    /// Create an ERROR_MSG message
    pub fn error_msg(message: String) -> Self {
        let payload = WarningPayload { message };
        Self::new(
            MessageType::ErrorMsg,
            serde_json::to_value(payload).unwrap(),
        )
    }
}
