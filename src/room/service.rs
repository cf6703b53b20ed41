use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::game::{
    AceChoice, BidOutcome, GameSettings, MAX_ACTIVE_SEATS, Phase, PlayOutcome, Player,
    Progression, RoomState, RuleError, TrickAftermath,
};
use crate::room::registry::{normalize_code, RoomRegistry};
use crate::websockets::connection_manager::ConnectionManager;
use crate::websockets::messages::{
    BlindCard, BonusUpdatePayload, PlayerSummary, StateSnapshotPayload, WebSocketMessage,
};

/// Pacing and timeout knobs. Production values match the feel the game was
/// tuned for; tests swap in `Timings::fast()` so nothing sleeps for real.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    /// How long a completed trick stays face-up on the table.
    pub trick_reveal: Duration,
    /// Same, on the blind single-card round (players need longer to take
    /// in cards they never saw).
    pub blind_trick_reveal: Duration,
    /// How long the round report is displayed before the next deal.
    pub round_report: Duration,
    pub game_over_banner: Duration,
    pub lobby_reset: Duration,
    /// Small delay between marking a round abandoned and settling it.
    pub abandon_kickoff: Duration,
    pub vote_approval: Duration,
    pub dealer_skip_note: Duration,
    /// Window a disconnected active player has to reconnect.
    pub disconnect_grace: Duration,
    /// Window a restart vote stays open.
    pub vote_window: Duration,
    pub pause_poll: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            trick_reveal: Duration::from_secs(4),
            blind_trick_reveal: Duration::from_secs(8),
            round_report: Duration::from_secs(6),
            game_over_banner: Duration::from_secs(4),
            lobby_reset: Duration::from_secs(5),
            abandon_kickoff: Duration::from_secs(1),
            vote_approval: Duration::from_millis(1500),
            dealer_skip_note: Duration::from_secs(2),
            disconnect_grace: Duration::from_secs(30),
            vote_window: Duration::from_secs(30),
            pause_poll: Duration::from_millis(500),
        }
    }
}

impl Timings {
    /// Millisecond-scale timings for tests.
    pub fn fast() -> Self {
        Self {
            trick_reveal: Duration::from_millis(5),
            blind_trick_reveal: Duration::from_millis(5),
            round_report: Duration::from_millis(5),
            game_over_banner: Duration::from_millis(5),
            lobby_reset: Duration::from_millis(5),
            abandon_kickoff: Duration::from_millis(5),
            vote_approval: Duration::from_millis(5),
            dealer_skip_note: Duration::from_millis(5),
            disconnect_grace: Duration::from_millis(30),
            vote_window: Duration::from_millis(50),
            pause_poll: Duration::from_millis(2),
        }
    }
}

/// Messages queued under the room lock and flushed after it is released.
/// Room locks are plain std mutexes and must never be held across an await.
#[derive(Default)]
struct Outbox {
    messages: Vec<(Uuid, String)>,
}

impl Outbox {
    fn to(&mut self, conn_id: Uuid, message: &WebSocketMessage) {
        self.messages.push((conn_id, message.to_json()));
    }

    /// Queues `message` for every connected seat, spectators included.
    fn broadcast(&mut self, room: &RoomState, message: &WebSocketMessage) {
        let json = message.to_json();
        for p in &room.players {
            if let Some(conn_id) = p.conn_id {
                self.messages.push((conn_id, json.clone()));
            }
        }
    }

    async fn flush(self, connections: &dyn ConnectionManager) {
        for (conn_id, message) in self.messages {
            connections.send_to_connection(conn_id, &message).await;
        }
    }
}

/// Orchestrates rooms: applies inbound actions to the game state, schedules
/// pacing delays and timeouts, and pushes updates out through the connection
/// manager. Every public method is a run-to-completion reaction; anything
/// that needs to happen later is a spawned continuation that re-resolves its
/// room and re-validates the state it expects before acting.
pub struct RoomService {
    registry: Arc<RoomRegistry>,
    connections: Arc<dyn ConnectionManager>,
    timings: Timings,
}

impl RoomService {
    pub fn new(
        registry: Arc<RoomRegistry>,
        connections: Arc<dyn ConnectionManager>,
        timings: Timings,
    ) -> Self {
        Self {
            registry,
            connections,
            timings,
        }
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    // ---- join / leave / disconnect ----------------------------------------

    /// Seats (or re-seats) `name` in the room for `raw_code`. Returns false
    /// when the join was rejected and the caller should close the socket.
    pub async fn join(self: &Arc<Self>, conn_id: Uuid, raw_code: &str, name: &str) -> bool {
        let code = normalize_code(raw_code);
        let name = name.trim();
        if name.is_empty() {
            return false;
        }

        let room = self.registry.get_or_create(&code);
        let mut outbox = Outbox::default();
        let seated = {
            let mut room = room.lock().unwrap();
            if let Some(seat) = room.seat_by_name(name) {
                // Reconnect: rebind the volatile connection id and cancel
                // any pending grace timer.
                if let Some(timer) = room.disconnect_timers.remove(name) {
                    timer.abort();
                }
                room.players[seat].conn_id = Some(conn_id);
                room.players[seat].pending_removal = false;
                info!(room_code = %code, player = %name, "Player reconnected");
                self.push_snapshot(&room, seat, &mut outbox);
                self.push_players_update(&room, &mut outbox);
                true
            } else if room.phase == Phase::Lobby {
                if room.active_count() >= MAX_ACTIVE_SEATS {
                    outbox.to(
                        conn_id,
                        &WebSocketMessage::error_msg("Room is full".to_string()),
                    );
                    false
                } else {
                    let lives = room.settings.starting_lives;
                    room.players.push(Player::new(name, conn_id, lives, false));
                    info!(room_code = %code, player = %name, "Player joined");
                    let seat = room.players.len() - 1;
                    self.push_snapshot(&room, seat, &mut outbox);
                    self.push_players_update(&room, &mut outbox);
                    true
                }
            } else {
                // Mid-game joins watch from the sidelines.
                room.players.push(Player::new(name, conn_id, 0, true));
                info!(room_code = %code, player = %name, "Spectator joined mid-game");
                let seat = room.players.len() - 1;
                self.push_snapshot(&room, seat, &mut outbox);
                self.push_players_update(&room, &mut outbox);
                true
            }
        };
        if !seated {
            // A rejected join must not leave behind an empty shell room.
            let destroy = room.lock().unwrap().players.is_empty();
            if destroy {
                self.registry.remove(&code);
            }
        }
        outbox.flush(self.connections.as_ref()).await;
        seated
    }

    /// Transport-level disconnect. In the lobby the seat is freed at once;
    /// mid-game an active player gets a grace window to reconnect.
    pub async fn disconnect(self: &Arc<Self>, conn_id: Uuid, raw_code: &str) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut destroy = false;
        {
            let mut room = room.lock().unwrap();
            let Some(seat) = room.seat_by_conn(conn_id) else {
                return;
            };
            room.players[seat].conn_id = None;
            let name = room.players[seat].name.clone();

            if room.phase == Phase::Lobby || !room.players[seat].is_eligible() {
                room.remove_seat(seat);
                info!(room_code = %code, player = %name, "Player left");
                if room.players.is_empty() {
                    abort_timers(&mut room);
                    destroy = true;
                } else {
                    self.push_players_update(&room, &mut outbox);
                }
            } else {
                // Active player dropped mid-game: hold the seat open, but
                // their restart vote must not linger toward unanimity.
                room.retract_vote(&name);
                info!(room_code = %code, player = %name, "Player disconnected, grace timer started");
                outbox.broadcast(
                    &room,
                    &WebSocketMessage::warning(format!(
                        "{} disconnected, waiting for them to come back",
                        name
                    )),
                );
                let service = Arc::clone(self);
                let timer_code = code.clone();
                let timer_name = name.clone();
                let grace = self.timings.disconnect_grace;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(grace).await;
                    service.expire_disconnect(&timer_code, &timer_name).await;
                });
                if let Some(old) = room.disconnect_timers.insert(name, handle) {
                    old.abort();
                }
            }
        }
        if destroy {
            self.registry.remove(&code);
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    /// Grace timer continuation: the player never came back.
    async fn expire_disconnect(self: &Arc<Self>, code: &str, name: &str) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut destroy = false;
        let abandon = {
            let mut room = room.lock().unwrap();
            room.disconnect_timers.remove(name);
            let Some(seat) = room.seat_by_name(name) else {
                return;
            };
            if room.players[seat].conn_id.is_some() {
                // Reconnected while the timer was firing.
                return;
            }
            warn!(room_code = %code, player = %name, "Grace window expired, removing player");
            let abandon = self.drop_player(&mut room, seat, false, &mut outbox);
            if room.players.is_empty() {
                abort_timers(&mut room);
                destroy = true;
            }
            abandon
        };
        if destroy {
            self.registry.remove(code);
        }
        outbox.flush(self.connections.as_ref()).await;
        if abandon {
            self.schedule_abandon(code);
        }
    }

    /// LEAVE_ROOM: the player wants out of the room entirely, right now.
    pub async fn leave_room(self: &Arc<Self>, conn_id: Uuid, raw_code: &str) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut destroy = false;
        let abandon = {
            let mut room = room.lock().unwrap();
            let Some(seat) = room.seat_by_conn(conn_id) else {
                return;
            };
            let abandon = self.drop_player(&mut room, seat, false, &mut outbox);
            outbox.to(conn_id, &WebSocketMessage::force_kick());
            if room.players.is_empty() {
                abort_timers(&mut room);
                destroy = true;
            }
            abandon
        };
        if destroy {
            self.registry.remove(&code);
        }
        outbox.flush(self.connections.as_ref()).await;
        if abandon {
            self.schedule_abandon(&code);
        }
    }

    /// LEAVE_GAME: the player stops playing. With `keep_spectating` they
    /// stay seated as a spectator, otherwise they are purged at the next
    /// settlement.
    pub async fn leave_game(self: &Arc<Self>, conn_id: Uuid, raw_code: &str, keep_spectating: bool) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut destroy = false;
        let abandon = {
            let mut room = room.lock().unwrap();
            let Some(seat) = room.seat_by_conn(conn_id) else {
                return;
            };
            let abandon = self.drop_player(&mut room, seat, keep_spectating, &mut outbox);
            if room.players.is_empty() {
                abort_timers(&mut room);
                destroy = true;
            }
            abandon
        };
        if destroy {
            self.registry.remove(&code);
        }
        outbox.flush(self.connections.as_ref()).await;
        if abandon {
            self.schedule_abandon(&code);
        }
    }

    /// Shared removal path. Returns true when the caller must schedule an
    /// abandoned-round settlement (an eligible player left mid-round).
    fn drop_player(
        &self,
        room: &mut RoomState,
        seat: usize,
        keep_spectating: bool,
        outbox: &mut Outbox,
    ) -> bool {
        let was_eligible = room.players[seat].is_eligible();
        let name = room.players[seat].name.clone();

        if room.phase == Phase::Lobby {
            if keep_spectating {
                room.players[seat].is_spectator = true;
                room.players[seat].lives = 0;
            } else {
                room.remove_seat(seat);
            }
            self.push_players_update(room, outbox);
            return false;
        }

        // Mid-game: the seat is out of the running either way.
        room.players[seat].lives = 0;
        room.players[seat].is_spectator = true;
        room.players[seat].hand.clear();
        room.retract_vote(&name);
        if keep_spectating {
            self.push_players_update(room, outbox);
        } else if was_eligible {
            // Seat indices stay stable until settlement so in-flight trick
            // resolution keeps making sense.
            room.players[seat].pending_removal = true;
        } else {
            room.remove_seat(seat);
            self.push_players_update(room, outbox);
        }

        if was_eligible && !room.resolving && room.phase != Phase::Lobby {
            room.resolving = true;
            outbox.broadcast(
                room,
                &WebSocketMessage::warning(format!(
                    "{} left the game, round abandoned",
                    name
                )),
            );
            return true;
        }
        false
    }

    fn schedule_abandon(self: &Arc<Self>, code: &str) {
        let service = Arc::clone(self);
        let code = code.to_string();
        let delay = self.timings.abandon_kickoff;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The room stays frozen under the pause overlay; the forced
            // settlement runs once the host resumes.
            service.wait_while_paused(&code).await;
            service.settle_and_progress(&code, true).await;
        });
    }

    // ---- game actions ------------------------------------------------------

    pub async fn start_game(self: &Arc<Self>, conn_id: Uuid, raw_code: &str, settings: GameSettings) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            let mut rng = rand::rng();
            match room.begin_game(conn_id, settings, &mut rng) {
                Ok(()) => {
                    info!(room_code = %code, players = room.active_count(), "Game started");
                    room.deal_round(&mut rng);
                    outbox.broadcast(&room, &WebSocketMessage::bonus_update(false, Vec::new()));
                    self.push_round_start(&room, &mut outbox);
                }
                Err(err) => {
                    debug!(room_code = %code, error = %err, "Start rejected");
                    outbox.to(conn_id, &WebSocketMessage::warning(err.to_string()));
                }
            }
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    pub async fn place_bid(self: &Arc<Self>, conn_id: Uuid, raw_code: &str, amount: u8) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            match room.place_bid(conn_id, amount) {
                Ok(outcome) => {
                    self.push_players_update(&room, &mut outbox);
                    self.push_turn_update(&room, &mut outbox);
                    if outcome == BidOutcome::BiddingComplete {
                        debug!(room_code = %code, "Bidding complete");
                    }
                }
                Err(RuleError::DealerForbiddenBid) => {
                    outbox.to(
                        conn_id,
                        &WebSocketMessage::warning(
                            RuleError::DealerForbiddenBid.to_string(),
                        ),
                    );
                }
                Err(err) => {
                    debug!(room_code = %code, error = %err, "Bid rejected");
                }
            }
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    pub async fn play_card(
        self: &Arc<Self>,
        conn_id: Uuid,
        raw_code: &str,
        hand_index: usize,
        ace_choice: Option<AceChoice>,
    ) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut completed: Option<(String, Duration)> = None;
        {
            let mut room = room.lock().unwrap();
            match room.play_card(conn_id, hand_index, ace_choice) {
                Ok(outcome) => {
                    outbox.broadcast(&room, &WebSocketMessage::table_update(&room.table_cards));
                    if let Some(seat) = room.seat_by_conn(conn_id) {
                        outbox.to(
                            conn_id,
                            &WebSocketMessage::hand_update(&room.players[seat].hand),
                        );
                    }
                    match outcome {
                        PlayOutcome::NextTurn => self.push_turn_update(&room, &mut outbox),
                        PlayOutcome::TrickComplete => {
                            if let Some(winner) = room.trick_winner() {
                                let winner = winner.player_name.clone();
                                outbox.broadcast(
                                    &room,
                                    &WebSocketMessage::trick_result(winner.clone()),
                                );
                                let delay = if room.is_blind_round() {
                                    self.timings.blind_trick_reveal
                                } else {
                                    self.timings.trick_reveal
                                };
                                completed = Some((winner, delay));
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!(room_code = %code, error = %err, "Play rejected");
                }
            }
        }
        outbox.flush(self.connections.as_ref()).await;

        if let Some((winner, delay)) = completed {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                service.resolve_trick(&code, &winner).await;
            });
        }
    }

    /// Trick resolution continuation, running after the reveal delay.
    async fn resolve_trick(self: &Arc<Self>, code: &str, winner: &str) {
        self.wait_while_paused(code).await;
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut settle: Option<bool> = None;
        {
            let mut room = room.lock().unwrap();
            // A restart vote, full reset or abandoned-round settlement may
            // have beaten us here.
            if room.phase == Phase::Lobby || !room.resolving || room.table_cards.is_empty() {
                return;
            }
            // `resolving` stays held through settlement on both ending arms.
            match room.apply_trick_win(winner) {
                TrickAftermath::RoundContinues => {
                    room.resolving = false;
                    outbox.broadcast(&room, &WebSocketMessage::table_update(&room.table_cards));
                    self.push_players_update(&room, &mut outbox);
                    self.push_turn_update(&room, &mut outbox);
                }
                TrickAftermath::RoundOver => {
                    settle = Some(false);
                }
                TrickAftermath::RoundAbandoned => {
                    outbox.broadcast(
                        &room,
                        &WebSocketMessage::warning(format!(
                            "{} left the game, round abandoned",
                            winner
                        )),
                    );
                    settle = Some(true);
                }
            }
        }
        outbox.flush(self.connections.as_ref()).await;
        if let Some(aborted) = settle {
            self.settle_and_progress(code, aborted).await;
        }
    }

    /// Settlement chain: life accounting, purges, the round report and the
    /// transition to either the next round or game over.
    async fn settle_and_progress(self: &Arc<Self>, code: &str, aborted: bool) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut destroy = false;
        let progression = {
            let mut room = room.lock().unwrap();
            if room.phase == Phase::Lobby {
                return;
            }
            if room.is_blind_round() {
                outbox.broadcast(&room, &WebSocketMessage::clear_blind());
            }
            let report = room.settle_round(aborted);
            info!(
                room_code = %code,
                aborted,
                eliminated = report.eliminated.len(),
                "Round settled"
            );

            for (name, conn_id) in room.purge_pending() {
                info!(room_code = %code, player = %name, "Player purged");
                if let Some(conn_id) = conn_id {
                    outbox.to(conn_id, &WebSocketMessage::force_kick());
                }
            }
            if room.players.is_empty() {
                abort_timers(&mut room);
                destroy = true;
                None
            } else {
                outbox.broadcast(&room, &WebSocketMessage::round_report(&report));
                if !report.rescued.is_empty() {
                    outbox.broadcast(
                        &room,
                        &WebSocketMessage::bonus_update(true, report.rescued.clone()),
                    );
                }
                self.push_players_update(&room, &mut outbox);
                Some(room.advance_round())
            }
        };
        if destroy {
            self.registry.remove(code);
            return;
        }
        outbox.flush(self.connections.as_ref()).await;

        match progression {
            Some(Progression::Victory { winner }) => {
                info!(room_code = %code, winner = %winner, "Game over");
                let service = Arc::clone(self);
                let code = code.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(service.timings.game_over_banner).await;
                    let Some(room) = service.registry.get(&code) else {
                        return;
                    };
                    let mut outbox = Outbox::default();
                    {
                        let room = room.lock().unwrap();
                        outbox.broadcast(&room, &WebSocketMessage::game_over(winner.clone()));
                    }
                    outbox.flush(service.connections.as_ref()).await;
                    tokio::time::sleep(service.timings.lobby_reset).await;
                    service.reset_room(&code).await;
                });
            }
            Some(Progression::NextRound {
                round_cards,
                dealer_skipped,
            }) => {
                debug!(room_code = %code, round_cards, "Next round scheduled");
                let service = Arc::clone(self);
                let code = code.to_string();
                tokio::spawn(async move {
                    tokio::time::sleep(service.timings.round_report).await;
                    service.wait_while_paused(&code).await;
                    if dealer_skipped {
                        let note_service = Arc::clone(&service);
                        let note_code = code.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(note_service.timings.dealer_skip_note).await;
                            note_service
                                .broadcast_warning(
                                    &note_code,
                                    "Dealer rotation skipped one seat".to_string(),
                                )
                                .await;
                        });
                    }
                    service.deal_next_round(&code).await;
                });
            }
            None => {}
        }
    }

    /// Deals the next round if the room is still mid-game.
    async fn deal_next_round(self: &Arc<Self>, code: &str) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            // A restart vote during the round report sent everyone back.
            if room.phase == Phase::Lobby {
                return;
            }
            let mut rng = rand::rng();
            room.deal_round(&mut rng);
            self.push_round_start(&room, &mut outbox);
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    // ---- pause / roles / votes ---------------------------------------------

    pub async fn toggle_pause(self: &Arc<Self>, conn_id: Uuid, raw_code: &str) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            if !room.is_host(conn_id) {
                outbox.to(
                    conn_id,
                    &WebSocketMessage::warning(RuleError::NotHost.to_string()),
                );
            } else if let Some(paused) = room.toggle_pause() {
                info!(room_code = %code, paused, "Pause toggled");
                outbox.broadcast(&room, &WebSocketMessage::pause_state(paused));
            }
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    /// Switch between playing and spectating. Only allowed in the lobby.
    pub async fn switch_role(self: &Arc<Self>, conn_id: Uuid, raw_code: &str, wants_active: bool) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            let Some(seat) = room.seat_by_conn(conn_id) else {
                return;
            };
            if room.phase != Phase::Lobby {
                outbox.to(
                    conn_id,
                    &WebSocketMessage::warning("Roles can only change in the lobby".to_string()),
                );
            } else if wants_active && room.active_count() >= MAX_ACTIVE_SEATS {
                outbox.to(
                    conn_id,
                    &WebSocketMessage::error_msg("All seats are taken".to_string()),
                );
            } else {
                room.players[seat].is_spectator = !wants_active;
                room.players[seat].lives = if wants_active {
                    room.settings.starting_lives
                } else {
                    0
                };
                self.push_players_update(&room, &mut outbox);
            }
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    /// Registers a restart vote. The first vote opens a timed window; a
    /// unanimous vote among the live active players sends everyone back to
    /// the lobby.
    pub async fn vote_restart(self: &Arc<Self>, conn_id: Uuid, raw_code: &str) {
        let code = normalize_code(raw_code);
        let Some(room) = self.registry.get(&code) else {
            return;
        };
        let mut outbox = Outbox::default();
        let mut approved = false;
        {
            let mut room = room.lock().unwrap();
            if room.phase == Phase::Lobby {
                return;
            }
            let Some(seat) = room.seat_by_conn(conn_id) else {
                return;
            };
            if !room.players[seat].is_eligible() {
                return;
            }
            let name = room.players[seat].name.clone();
            let first_vote = room.restart_votes.is_empty();
            room.restart_votes.insert(name.clone());

            let needed: Vec<String> = room
                .players
                .iter()
                .filter(|p| p.is_eligible())
                .map(|p| p.name.clone())
                .collect();
            outbox.broadcast(
                &room,
                &WebSocketMessage::warning(format!(
                    "{} voted to restart ({}/{})",
                    name,
                    room.restart_votes.len(),
                    needed.len()
                )),
            );

            if needed.iter().all(|n| room.restart_votes.contains(n)) {
                if let Some(timer) = room.vote_timer.take() {
                    timer.abort();
                }
                room.restart_votes.clear();
                info!(room_code = %code, "Restart vote approved");
                outbox.broadcast(
                    &room,
                    &WebSocketMessage::warning("Restart approved, returning to lobby".to_string()),
                );
                approved = true;
            } else if first_vote {
                let service = Arc::clone(self);
                let timer_code = code.clone();
                let window = self.timings.vote_window;
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(window).await;
                    service.expire_vote(&timer_code).await;
                });
                if let Some(old) = room.vote_timer.replace(handle) {
                    old.abort();
                }
            }
        }
        outbox.flush(self.connections.as_ref()).await;

        if approved {
            let service = Arc::clone(self);
            tokio::spawn(async move {
                tokio::time::sleep(service.timings.vote_approval).await;
                service.reset_room(&code).await;
            });
        }
    }

    /// Vote window continuation: the vote never reached unanimity.
    async fn expire_vote(self: &Arc<Self>, code: &str) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            room.vote_timer = None;
            if room.restart_votes.is_empty() {
                return;
            }
            room.restart_votes.clear();
            debug!(room_code = %code, "Restart vote expired");
            outbox.broadcast(
                &room,
                &WebSocketMessage::warning("Restart vote expired".to_string()),
            );
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    /// Sends the room back to the lobby with lives restored.
    async fn reset_room(self: &Arc<Self>, code: &str) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let mut room = room.lock().unwrap();
            if let Some(timer) = room.vote_timer.take() {
                timer.abort();
            }
            room.reset_to_lobby();
            info!(room_code = %code, "Back to lobby");
            outbox.broadcast(&room, &WebSocketMessage::back_to_lobby());
            outbox.broadcast(&room, &WebSocketMessage::bonus_update(false, Vec::new()));
            self.push_players_update(&room, &mut outbox);
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    // ---- helpers -----------------------------------------------------------

    /// Blocks a continuation while the room sits in the pause overlay.
    async fn wait_while_paused(&self, code: &str) {
        loop {
            let Some(room) = self.registry.get(code) else {
                return;
            };
            let paused = room.lock().unwrap().phase == Phase::Paused;
            if !paused {
                return;
            }
            tokio::time::sleep(self.timings.pause_poll).await;
        }
    }

    async fn broadcast_warning(&self, code: &str, text: String) {
        let Some(room) = self.registry.get(code) else {
            return;
        };
        let mut outbox = Outbox::default();
        {
            let room = room.lock().unwrap();
            outbox.broadcast(&room, &WebSocketMessage::warning(text));
        }
        outbox.flush(self.connections.as_ref()).await;
    }

    fn player_summaries(&self, room: &RoomState) -> Vec<PlayerSummary> {
        room.players
            .iter()
            .enumerate()
            .map(|(i, p)| PlayerSummary {
                name: p.name.clone(),
                lives: p.lives,
                bid: p.bid,
                tricks_won: p.tricks_won,
                is_spectator: p.is_spectator,
                is_dealer: i == room.dealer_seat && room.phase != Phase::Lobby,
                hand_count: p.hand.len(),
            })
            .collect()
    }

    /// PLAYERS_UPDATE goes out per-recipient so the host flag is personal.
    fn push_players_update(&self, room: &RoomState, outbox: &mut Outbox) {
        let summaries = self.player_summaries(room);
        for (i, p) in room.players.iter().enumerate() {
            if let Some(conn_id) = p.conn_id {
                outbox.to(
                    conn_id,
                    &WebSocketMessage::players_update(summaries.clone(), i == 0),
                );
            }
        }
    }

    fn push_turn_update(&self, room: &RoomState, outbox: &mut Outbox) {
        if let Some(active) = room.players.get(room.current_seat) {
            outbox.broadcast(
                room,
                &WebSocketMessage::turn_update(active.name.clone(), room.phase, room.round_cards),
            );
        }
    }

    /// Start-of-round fanout: the blind table when applicable, private
    /// hands, the seat roster and the first turn.
    fn push_round_start(&self, room: &RoomState, outbox: &mut Outbox) {
        if room.is_blind_round() {
            // Every seat's card goes out face-up; clients hide the viewer's
            // own card.
            outbox.broadcast(room, &WebSocketMessage::blind_round(self.blind_table(room)));
        }
        for p in &room.players {
            let Some(conn_id) = p.conn_id else { continue };
            if p.lives > 0 {
                outbox.to(conn_id, &WebSocketMessage::hand_update(&p.hand));
            }
        }
        self.push_players_update(room, outbox);
        self.push_turn_update(room, outbox);
    }

    fn blind_table(&self, room: &RoomState) -> Vec<BlindCard> {
        room.players
            .iter()
            .map(|p| BlindCard {
                name: p.name.clone(),
                card: if p.lives > 0 {
                    p.hand.first().copied()
                } else {
                    None
                },
            })
            .collect()
    }

    /// Full per-seat state, used on join and reconnect.
    fn push_snapshot(&self, room: &RoomState, seat: usize, outbox: &mut Outbox) {
        let p = &room.players[seat];
        let Some(conn_id) = p.conn_id else { return };
        let blind = room.is_blind_round() && room.phase != Phase::Lobby;
        let payload = StateSnapshotPayload {
            hand: p.hand.clone(),
            phase: room.phase,
            table: room.table_cards.clone(),
            players: self.player_summaries(room),
            round_cards: room.round_cards,
            bonus: BonusUpdatePayload {
                used: room.rescue.used,
                beneficiaries: room.rescue.beneficiaries.clone(),
            },
            is_host: seat == 0,
            is_my_turn: seat == room.current_seat
                && matches!(room.phase, Phase::Bidding | Phase::Playing),
        };
        outbox.to(conn_id, &WebSocketMessage::state_snapshot(payload));
        if blind {
            outbox.to(conn_id, &WebSocketMessage::blind_round(self.blind_table(room)));
        }
    }
}

/// Cancels every pending timer on a room about to be destroyed.
fn abort_timers(room: &mut RoomState) {
    if let Some(timer) = room.vote_timer.take() {
        timer.abort();
    }
    for (_, timer) in room.disconnect_timers.drain() {
        timer.abort();
    }
}
