use std::collections::{HashMap, HashSet};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::cards::{shuffled_deck, Card};

/// Phase of a single room. `Paused` is an overlay: the phase it replaced is
/// kept in `RoomState::previous_phase` and restored on resume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Lobby,
    Bidding,
    Playing,
    Paused,
}

/// Host-chosen settings, fixed for the duration of one game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GameSettings {
    pub starting_lives: i32,
    pub blind_final_round: bool,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            starting_lives: 5,
            blind_final_round: false,
        }
    }
}

/// The one-time, game-wide rescue bonus.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RescueBonus {
    pub used: bool,
    pub beneficiaries: Vec<String>,
}

/// How the player wants an ace of coins to count when playing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AceChoice {
    High,
    Low,
}

/// A card sitting on the table, tagged with who played it and how an ace of
/// coins was declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayedCard {
    pub player_name: String,
    pub card: Card,
    pub is_ace_high: bool,
}

/// One seat in a room. `name` is the durable identity used as the
/// reconnection key; `conn_id` is volatile and rebound on every reconnect.
#[derive(Debug)]
pub struct Player {
    pub conn_id: Option<Uuid>,
    pub name: String,
    pub lives: i32,
    pub hand: Vec<Card>,
    pub bid: Option<u8>,
    pub tricks_won: u8,
    pub is_spectator: bool,
    /// Set when the player lost their last life this game. Distinguishes
    /// eliminated players (reactivated by a lobby reset) from voluntary
    /// spectators (who stay spectating).
    pub eliminated: bool,
    /// Requested to leave permanently; purged at the next settlement.
    pub pending_removal: bool,
}

impl Player {
    pub fn new(name: &str, conn_id: Uuid, lives: i32, is_spectator: bool) -> Self {
        Self {
            conn_id: Some(conn_id),
            name: name.to_string(),
            lives,
            hand: Vec::new(),
            bid: None,
            tricks_won: 0,
            is_spectator,
            eliminated: false,
            pending_removal: false,
        }
    }

    /// Eligible to hold a turn: seated, alive, not spectating.
    pub fn is_eligible(&self) -> bool {
        !self.is_spectator && self.lives > 0
    }
}

/// Rule violations for inbound actions. None of these crosses the transport
/// as a hard failure; the service turns them into advisory warnings or
/// drops them silently.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("room is paused")]
    RoomPaused,
    #[error("action not valid in the current phase")]
    WrongPhase,
    #[error("not this player's turn")]
    NotYourTurn,
    #[error("a trick or round is being resolved")]
    ResolutionInProgress,
    #[error("the dealer cannot bid the exact remaining count")]
    DealerForbiddenBid,
    #[error("no card at that position")]
    NoSuchCard,
    #[error("only the host can do this")]
    NotHost,
    #[error("at least 2 active players are required")]
    NotEnoughPlayers,
    #[error("table is full")]
    TableFull,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BidOutcome {
    /// The bid cycle moves to the next eligible seat.
    NextBidder,
    /// The cycle returned to the first bidder; the room is now PLAYING.
    BiddingComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayOutcome {
    /// Turn advances to the next eligible seat.
    NextTurn,
    /// Every eligible seat has played; resolution has been locked in
    /// (`resolving` is set) and the trick must now be resolved.
    TrickComplete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickAftermath {
    RoundContinues,
    RoundOver,
    /// The winning seat was vacated during the reveal while other eligible
    /// hands still hold cards, so the round cannot be finished.
    RoundAbandoned,
}

/// Maximum number of active (non-spectator) seats per room.
pub const MAX_ACTIVE_SEATS: usize = 8;

/// One independent game table. All mutation happens as run-to-completion
/// reactions under the owning room lock; this struct itself is transport-free.
#[derive(Debug)]
pub struct RoomState {
    pub code: String,
    /// Seating order. Seat 0 is the host. Append-only except for removals,
    /// which compact indices (see `remove_seat`).
    pub players: Vec<Player>,
    pub deck: Vec<Card>,
    pub table_cards: Vec<PlayedCard>,
    pub phase: Phase,
    pub previous_phase: Phase,
    pub round_cards: u8,
    pub current_seat: usize,
    pub dealer_seat: usize,
    pub first_bidder_seat: usize,
    /// Advisory lock held across trick/round resolution delays. Must be set
    /// before any pacing delay and cleared on every exit path.
    pub resolving: bool,
    pub settings: GameSettings,
    pub rescue: RescueBonus,
    /// Restart votes, keyed by display name so reconnects keep the vote.
    pub restart_votes: HashSet<String>,
    /// Number of live players the last time the round size wrapped back to 5.
    pub last_wrap_player_count: usize,
    pub vote_timer: Option<JoinHandle<()>>,
    pub disconnect_timers: HashMap<String, JoinHandle<()>>,
}

impl RoomState {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            players: Vec::new(),
            deck: Vec::new(),
            table_cards: Vec::new(),
            phase: Phase::Lobby,
            previous_phase: Phase::Lobby,
            round_cards: 5,
            current_seat: 0,
            dealer_seat: 0,
            first_bidder_seat: 0,
            resolving: false,
            settings: GameSettings::default(),
            rescue: RescueBonus::default(),
            restart_votes: HashSet::new(),
            last_wrap_player_count: 0,
            vote_timer: None,
            disconnect_timers: HashMap::new(),
        }
    }

    // ---- seat queries -----------------------------------------------------

    pub fn seat_by_conn(&self, conn_id: Uuid) -> Option<usize> {
        self.players.iter().position(|p| p.conn_id == Some(conn_id))
    }

    pub fn seat_by_name(&self, name: &str) -> Option<usize> {
        self.players.iter().position(|p| p.name == name)
    }

    pub fn is_host(&self, conn_id: Uuid) -> bool {
        self.players
            .first()
            .map(|p| p.conn_id == Some(conn_id))
            .unwrap_or(false)
    }

    /// Seats currently eligible to hold a turn.
    pub fn eligible_count(&self) -> usize {
        self.players.iter().filter(|p| p.is_eligible()).count()
    }

    /// Non-spectator seats, regardless of lives.
    pub fn active_count(&self) -> usize {
        self.players.iter().filter(|p| !p.is_spectator).count()
    }

    pub fn live_count(&self) -> usize {
        self.players.iter().filter(|p| p.lives > 0).count()
    }

    /// Next eligible seat after `from`, walking cyclically and skipping
    /// spectators and dead seats. Bounded by one full lap; if no eligible
    /// seat exists the input is returned unchanged and the caller must treat
    /// the room as being in an error state.
    pub fn next_alive_seat(&self, from: usize) -> usize {
        if self.players.is_empty() {
            return 0;
        }
        let mut next = (from + 1) % self.players.len();
        let mut lap = 0;
        while lap < self.players.len() {
            if self.players[next].is_eligible() {
                return next;
            }
            next = (next + 1) % self.players.len();
            lap += 1;
        }
        from
    }

    /// Removes a seat, compacting indices. Any tracked seat index positioned
    /// after the removed seat shifts down by one.
    pub fn remove_seat(&mut self, index: usize) -> Player {
        let removed = self.players.remove(index);
        if index < self.dealer_seat {
            self.dealer_seat -= 1;
        }
        if index < self.current_seat {
            self.current_seat -= 1;
        }
        if index < self.first_bidder_seat {
            self.first_bidder_seat -= 1;
        }
        self.restart_votes.remove(&removed.name);
        removed
    }

    // ---- game lifecycle ---------------------------------------------------

    /// LOBBY → game start. Host-only; needs at least two active seats.
    /// Resets lives and per-round counters, picks a random dealer among the
    /// active seats and clears the rescue bonus. The first round is dealt
    /// separately via `deal_round`.
    pub fn begin_game<R: Rng + ?Sized>(
        &mut self,
        conn_id: Uuid,
        settings: GameSettings,
        rng: &mut R,
    ) -> Result<(), RuleError> {
        if self.phase != Phase::Lobby {
            return Err(RuleError::WrongPhase);
        }
        if !self.is_host(conn_id) {
            return Err(RuleError::NotHost);
        }
        if self.active_count() < 2 {
            return Err(RuleError::NotEnoughPlayers);
        }

        self.settings = settings;
        self.rescue = RescueBonus::default();
        self.restart_votes.clear();

        let mut active_seats = Vec::new();
        for (i, p) in self.players.iter_mut().enumerate() {
            p.hand.clear();
            p.bid = None;
            p.tricks_won = 0;
            p.eliminated = false;
            if p.is_spectator {
                p.lives = 0;
            } else {
                p.lives = settings.starting_lives;
                active_seats.push(i);
            }
        }
        self.last_wrap_player_count = active_seats.len();
        self.dealer_seat = active_seats[rng.random_range(0..active_seats.len())];
        self.round_cards = 5;
        Ok(())
    }

    /// Deals a fresh round: new shuffled deck, `round_cards` cards to every
    /// live seat, bidding starts at the seat after the dealer.
    pub fn deal_round<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.deck = shuffled_deck(rng);
        self.table_cards.clear();
        self.resolving = false;
        let count = usize::from(self.round_cards);
        for p in &mut self.players {
            p.bid = None;
            p.tricks_won = 0;
            if p.lives > 0 {
                p.hand = self.deck.drain(0..count).collect();
            } else {
                p.hand.clear();
            }
        }
        self.first_bidder_seat = self.next_alive_seat(self.dealer_seat);
        self.current_seat = self.first_bidder_seat;
        self.phase = Phase::Bidding;
    }

    /// Whether this is the face-up single-card round.
    pub fn is_blind_round(&self) -> bool {
        self.round_cards == 1 && self.settings.blind_final_round
    }

    // ---- bidding ----------------------------------------------------------

    /// Sum of bids already placed by live seats.
    fn placed_bid_sum(&self) -> u32 {
        self.players
            .iter()
            .filter(|p| p.lives > 0)
            .map(|p| u32::from(p.bid.unwrap_or(0)))
            .sum()
    }

    pub fn place_bid(&mut self, conn_id: Uuid, amount: u8) -> Result<BidOutcome, RuleError> {
        if self.phase == Phase::Paused {
            return Err(RuleError::RoomPaused);
        }
        if self.phase != Phase::Bidding {
            return Err(RuleError::WrongPhase);
        }
        if self.resolving {
            return Err(RuleError::ResolutionInProgress);
        }
        let seat = self.current_seat;
        let acting = self.players.get(seat).ok_or(RuleError::NotYourTurn)?;
        if acting.conn_id != Some(conn_id) {
            return Err(RuleError::NotYourTurn);
        }

        // The dealer bids last and may not complete the exact sum: this
        // guarantees at least one player misses their bid.
        if seat == self.dealer_seat
            && self.placed_bid_sum() + u32::from(amount) == u32::from(self.round_cards)
        {
            return Err(RuleError::DealerForbiddenBid);
        }

        self.players[seat].bid = Some(amount);
        self.current_seat = self.next_alive_seat(self.current_seat);
        if self.current_seat == self.first_bidder_seat {
            self.phase = Phase::Playing;
            Ok(BidOutcome::BiddingComplete)
        } else {
            Ok(BidOutcome::NextBidder)
        }
    }

    // ---- playing ----------------------------------------------------------

    pub fn play_card(
        &mut self,
        conn_id: Uuid,
        hand_index: usize,
        ace_choice: Option<AceChoice>,
    ) -> Result<PlayOutcome, RuleError> {
        if self.phase == Phase::Paused {
            return Err(RuleError::RoomPaused);
        }
        if self.phase != Phase::Playing {
            return Err(RuleError::WrongPhase);
        }
        if self.resolving {
            return Err(RuleError::ResolutionInProgress);
        }
        let seat = self.current_seat;
        let acting = self.players.get(seat).ok_or(RuleError::NotYourTurn)?;
        if acting.conn_id != Some(conn_id) {
            return Err(RuleError::NotYourTurn);
        }
        if hand_index >= acting.hand.len() {
            return Err(RuleError::NoSuchCard);
        }

        let player = &mut self.players[seat];
        let card = player.hand.remove(hand_index);
        let is_ace_high = if card.is_ace_of_coins() {
            match ace_choice {
                Some(AceChoice::High) => true,
                Some(AceChoice::Low) => false,
                // The server decides when the client leaves it open: an ace
                // played by someone chasing tricks counts high.
                None => player.bid.unwrap_or(0) > 0,
            }
        } else {
            false
        };
        let player_name = player.name.clone();
        self.table_cards.push(PlayedCard {
            player_name,
            card,
            is_ace_high,
        });

        if self.table_cards.len() == self.eligible_count() {
            // Lock out further plays for the whole resolution window.
            self.resolving = true;
            Ok(PlayOutcome::TrickComplete)
        } else {
            self.current_seat = self.next_alive_seat(self.current_seat);
            Ok(PlayOutcome::NextTurn)
        }
    }

    /// Winner of the completed trick: the unique highest-power card. Ties
    /// are impossible by construction; first maximum wins the linear scan.
    pub fn trick_winner(&self) -> Option<&PlayedCard> {
        let mut winner = self.table_cards.first()?;
        let mut best = winner.card.power(winner.is_ace_high);
        for played in &self.table_cards[1..] {
            let power = played.card.power(played.is_ace_high);
            if power > best {
                winner = played;
                best = power;
            }
        }
        Some(winner)
    }

    /// Credits the trick to `winner_name`, clears the table and hands the
    /// turn to the winning seat. A winner who left mid-resolution cannot
    /// lead the next trick; their emptied hand must not be mistaken for a
    /// finished round while other eligible hands still hold cards.
    pub fn apply_trick_win(&mut self, winner_name: &str) -> TrickAftermath {
        self.table_cards.clear();
        let winner_seat = self
            .seat_by_name(winner_name)
            .filter(|&seat| self.players[seat].is_eligible());
        if let Some(seat) = winner_seat {
            self.players[seat].tricks_won += 1;
            self.current_seat = seat;
            return if self.players[seat].hand.is_empty() {
                TrickAftermath::RoundOver
            } else {
                TrickAftermath::RoundContinues
            };
        }
        self.current_seat = self.next_alive_seat(self.current_seat);
        if self
            .players
            .iter()
            .any(|p| p.is_eligible() && !p.hand.is_empty())
        {
            TrickAftermath::RoundAbandoned
        } else {
            TrickAftermath::RoundOver
        }
    }

    // ---- pause overlay ----------------------------------------------------

    /// Toggles the pause overlay. Returns the new paused flag, or `None`
    /// when the room is in the lobby and there is nothing to pause.
    pub fn toggle_pause(&mut self) -> Option<bool> {
        match self.phase {
            Phase::Paused => {
                self.phase = self.previous_phase;
                Some(false)
            }
            Phase::Bidding | Phase::Playing => {
                self.previous_phase = self.phase;
                self.phase = Phase::Paused;
                Some(true)
            }
            Phase::Lobby => None,
        }
    }

    // ---- restart votes ----------------------------------------------------

    /// Drops a player's restart vote; an emptied ballot cancels the window.
    pub fn retract_vote(&mut self, name: &str) {
        self.restart_votes.remove(name);
        if self.restart_votes.is_empty() {
            if let Some(timer) = self.vote_timer.take() {
                timer.abort();
            }
        }
    }

    // ---- reset ------------------------------------------------------------

    /// Returns the room to the lobby: lives restored, hands cleared, rescue
    /// bonus re-armed. Eliminated players become active again; voluntary
    /// spectators stay spectating.
    pub fn reset_to_lobby(&mut self) {
        self.phase = Phase::Lobby;
        self.previous_phase = Phase::Lobby;
        self.table_cards.clear();
        self.deck.clear();
        self.rescue = RescueBonus::default();
        self.resolving = false;
        self.restart_votes.clear();
        self.round_cards = 5;
        for p in &mut self.players {
            p.hand.clear();
            p.bid = None;
            p.tricks_won = 0;
            if p.eliminated {
                p.eliminated = false;
                p.is_spectator = false;
            }
            p.lives = if p.is_spectator {
                0
            } else {
                self.settings.starting_lives
            };
        }
    }
}
