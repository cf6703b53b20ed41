use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::state::RoomState;

/// What comes after a settlement: either the game is over or the next round
/// is configured and ready to be dealt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progression {
    Victory { winner: String },
    NextRound { round_cards: u8, dealer_skipped: bool },
}

/// Per-player line of a round report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundReportEntry {
    pub name: String,
    pub bid: u8,
    pub tricks_won: u8,
    pub lives_lost: i32,
    pub lives_left: i32,
}

/// Structured summary of one round settlement, broadcast to the room.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettlementReport {
    /// The round was abandoned (disconnect timeout or voluntary leave);
    /// nobody lost lives.
    pub aborted: bool,
    pub entries: Vec<RoundReportEntry>,
    /// Name of the player who bid and won the whole hand, when the shutout
    /// rule applied.
    pub shutout: Option<String>,
    /// Players saved by the one-time rescue bonus this settlement.
    pub rescued: Vec<String>,
    /// Players revived to 1 life by the universal-elimination fallback.
    pub revived: Vec<String>,
    /// Players eliminated this settlement.
    pub eliminated: Vec<String>,
}

impl RoomState {
    /// Settles the round that just ended: life accounting, the one-time
    /// rescue bonus, the universal-elimination fallback and elimination
    /// marking. Progression (dealer, round size, victory) is a separate
    /// step, see `advance_round`.
    ///
    /// `aborted` is the safe path taken when a disconnect timeout or a
    /// voluntary leave cut the round short: no lives are lost.
    pub fn settle_round(&mut self, aborted: bool) -> SettlementReport {
        let mut report = SettlementReport {
            aborted,
            ..Default::default()
        };

        // Turn participants: everyone still alive when settlement starts.
        let participants: Vec<usize> = (0..self.players.len())
            .filter(|&i| self.players[i].lives > 0)
            .collect();
        let mut lost = vec![0i32; self.players.len()];

        if aborted {
            for &i in &participants {
                self.players[i].hand.clear();
            }
        } else {
            let shutout = participants.iter().copied().find(|&i| {
                let p = &self.players[i];
                p.bid == Some(self.round_cards) && p.tricks_won == self.round_cards
            });
            match shutout {
                // A shutout on a multi-card round overrides individual
                // accounting: everyone else loses exactly one life.
                Some(winner) if self.round_cards > 1 => {
                    for &i in &participants {
                        if i != winner {
                            self.players[i].lives -= 1;
                            lost[i] = 1;
                        }
                    }
                    report.shutout = Some(self.players[winner].name.clone());
                }
                _ => {
                    for &i in &participants {
                        let p = &mut self.players[i];
                        let diff =
                            (i32::from(p.bid.unwrap_or(0)) - i32::from(p.tricks_won)).abs();
                        p.lives -= diff;
                        lost[i] = diff;
                    }
                }
            }
        }

        let alive_now = participants
            .iter()
            .filter(|&&i| self.players[i].lives > 0)
            .count();
        let newly_dead: Vec<usize> = participants
            .iter()
            .copied()
            .filter(|&i| self.players[i].lives <= 0)
            .collect();

        if !aborted && alive_now == 0 && !participants.is_empty() {
            // Everyone went down together: revive the best of the round so
            // the game can never end with zero survivors.
            let max_lives = participants
                .iter()
                .map(|&i| self.players[i].lives)
                .max()
                .unwrap_or(0);
            for &i in &participants {
                if self.players[i].lives == max_lives {
                    self.players[i].lives = 1;
                    report.revived.push(self.players[i].name.clone());
                }
            }
        } else if !aborted && alive_now > 0 && !newly_dead.is_empty() && !self.rescue.used {
            for &i in &newly_dead {
                self.players[i].lives += 1;
            }
            self.rescue.used = true;
            self.rescue.beneficiaries =
                newly_dead.iter().map(|&i| self.players[i].name.clone()).collect();
            report.rescued = self.rescue.beneficiaries.clone();
        }

        // Whoever is still at zero or below is out for the rest of the game.
        for &i in &participants {
            let p = &mut self.players[i];
            if p.lives <= 0 {
                p.lives = 0;
                p.is_spectator = true;
                p.eliminated = true;
                report.eliminated.push(p.name.clone());
            }
        }

        for &i in &participants {
            let p = &self.players[i];
            report.entries.push(RoundReportEntry {
                name: p.name.clone(),
                bid: p.bid.unwrap_or(0),
                tricks_won: p.tricks_won,
                lives_lost: lost[i],
                lives_left: p.lives,
            });
        }
        report
    }

    /// Removes every seat flagged `pending_removal`, compacting indices.
    /// Returns the purged players' identities so the service can tell their
    /// clients to disconnect.
    pub fn purge_pending(&mut self) -> Vec<(String, Option<Uuid>)> {
        let mut purged = Vec::new();
        let mut i = 0;
        while i < self.players.len() {
            if self.players[i].pending_removal {
                let removed = self.remove_seat(i);
                purged.push((removed.name, removed.conn_id));
            } else {
                i += 1;
            }
        }
        purged
    }

    /// Post-settlement housekeeping: victory detection, round-size cycling
    /// and dealer rotation with the 5-player anti-repetition skip.
    pub fn advance_round(&mut self) -> Progression {
        let alive: Vec<usize> = (0..self.players.len())
            .filter(|&i| self.players[i].lives > 0)
            .collect();
        if alive.len() == 1 {
            return Progression::Victory {
                winner: self.players[alive[0]].name.clone(),
            };
        }

        self.round_cards = self.round_cards.saturating_sub(1);
        let mut dealer_skipped = false;
        if alive.len() == 2 && self.round_cards == 1 {
            // A 1-card hand is degenerate for two players: skip back to 5.
            self.round_cards = 5;
        } else if self.round_cards < 1 {
            self.round_cards = 5;
            if alive.len() == 5 && self.last_wrap_player_count == 5 {
                dealer_skipped = true;
            }
            self.last_wrap_player_count = alive.len();
        }

        self.dealer_seat = self.next_alive_seat(self.dealer_seat);
        if dealer_skipped {
            self.dealer_seat = self.next_alive_seat(self.dealer_seat);
        }
        Progression::NextRound {
            round_cards: self.round_cards,
            dealer_skipped,
        }
    }
}
