// Core game logic: cards, per-room state machine, round settlement.
// Everything here is transport-free; the room service owns scheduling and
// message delivery.

pub mod cards;
pub mod settlement;
pub mod state;

pub use cards::{Card, Suit};
pub use settlement::{Progression, RoundReportEntry, SettlementReport};
pub use state::{
    AceChoice, BidOutcome, GameSettings, Phase, PlayOutcome, PlayedCard, Player, RoomState,
    RuleError, TrickAftermath, MAX_ACTIVE_SEATS,
};
