use std::time::Duration;

use cappotto::game::{Card, Phase, Suit};
use cappotto::websockets::MessageType;

mod utils;

use utils::*;

/// Lets spawned continuations (trick resolution, settlement, resets) finish.
async fn settle(ms: u64) {
    tokio::time::sleep(Duration::from_millis(ms)).await;
}

#[tokio::test]
async fn test_lobby_join_sends_roster_and_host_flag() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;

    assert!(setup.received("alice", MessageType::PlayersUpdate).await);
    assert!(setup.received("bob", MessageType::StateSnapshot).await);
    assert_eq!(setup.phase(), Phase::Lobby);

    // The host flag is personal to the first seat.
    let alice_updates: Vec<String> = setup.messages_for("alice").await;
    assert!(alice_updates.iter().any(|m| m.contains("\"is_host\":true")));
    let bob_updates: Vec<String> = setup.messages_for("bob").await;
    assert!(!bob_updates.iter().any(|m| m.contains("\"is_host\":true")));
}

#[tokio::test]
async fn test_start_game_deals_hands_and_opens_bidding() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.clear_messages().await;

    setup.start_game("alice").await;

    assert_eq!(setup.phase(), Phase::Bidding);
    for name in ["alice", "bob", "carol"] {
        assert!(setup.received(name, MessageType::HandUpdate).await);
        assert!(setup.received(name, MessageType::TurnUpdate).await);
        assert!(setup.received(name, MessageType::BonusUpdate).await);
        assert_eq!(setup.lives(name), 5);
    }
    let room = setup.room();
    let room = room.lock().unwrap();
    for p in &room.players {
        assert_eq!(p.hand.len(), 5);
    }
}

#[tokio::test]
async fn test_non_host_cannot_start_game() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;
    setup.clear_messages().await;

    setup.start_game("bob").await;

    assert_eq!(setup.phase(), Phase::Lobby);
    assert!(setup.received("bob", MessageType::Warning).await);
    assert!(!setup.received("alice", MessageType::Warning).await);
}

#[tokio::test]
async fn test_single_card_round_trick_and_settlement() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    // Coins beat every other suit, so bob takes the trick.
    setup.rig_single_card_round(&[
        ("alice", Card::new(Suit::Swords, 7)),
        ("bob", Card::new(Suit::Coins, 2)),
        ("carol", Card::new(Suit::Cups, 10)),
    ]);
    setup.clear_messages().await;

    for _ in 0..3 {
        let name = setup.current_player();
        setup.bid(&name, 0).await;
    }
    assert_eq!(setup.phase(), Phase::Playing);

    for _ in 0..3 {
        let name = setup.current_player();
        setup.play(&name, 0).await;
    }
    assert!(setup.received("alice", MessageType::TrickResult).await);
    let trick: Vec<String> = setup.messages_for("alice").await;
    assert!(trick.iter().any(|m| m.contains("TRICK_RESULT") && m.contains("bob")));

    settle(150).await;

    // bob bid 0 and won 1 trick: one life gone. Everyone else was exact.
    assert_eq!(setup.lives("bob"), 4);
    assert_eq!(setup.lives("alice"), 5);
    assert_eq!(setup.lives("carol"), 5);
    assert!(setup.received("carol", MessageType::RoundReport).await);

    // The next round was dealt: the size wrapped from 1 back to 5.
    assert_eq!(setup.phase(), Phase::Bidding);
    assert_eq!(setup.room().lock().unwrap().round_cards, 5);
}

#[tokio::test]
async fn test_dealer_cannot_make_bids_add_up() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    setup.rig_single_card_round(&[
        ("alice", Card::new(Suit::Swords, 7)),
        ("bob", Card::new(Suit::Coins, 2)),
        ("carol", Card::new(Suit::Cups, 10)),
    ]);

    let first = setup.current_player();
    setup.bid(&first, 0).await;
    let second = setup.current_player();
    setup.bid(&second, 0).await;

    let dealer = setup.current_player();
    assert_eq!(dealer, setup.dealer(), "dealer bids last");
    setup.clear_messages().await;

    // 0 + 0 + 1 would match the single card on the table.
    setup.bid(&dealer, 1).await;
    assert!(setup.received(&dealer, MessageType::Warning).await);
    assert_eq!(setup.phase(), Phase::Bidding, "rejected bid changes nothing");

    setup.bid(&dealer, 0).await;
    assert_eq!(setup.phase(), Phase::Playing);
}

#[tokio::test]
async fn test_reconnect_within_grace_window_keeps_seat() {
    let mut setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;

    let old_conn = setup.conn("bob");
    setup.service.disconnect(old_conn, ROOM).await;
    assert!(setup.received("alice", MessageType::Warning).await);

    // Back before the grace window closes, under the same name.
    assert!(setup.join("bob").await);
    assert!(setup.received("bob", MessageType::StateSnapshot).await);
    assert_ne!(setup.conn("bob"), old_conn);

    // Long past the original grace deadline the seat must still be there.
    settle(100).await;
    assert_eq!(setup.player_count(), 3);
    assert_eq!(setup.phase(), Phase::Bidding);
}

#[tokio::test]
async fn test_grace_expiry_abandons_round_and_removes_player() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    setup.clear_messages().await;

    setup.service.disconnect(setup.conn("bob"), ROOM).await;
    settle(200).await;

    assert_eq!(setup.player_count(), 2, "bob purged at settlement");
    assert!(setup.received("alice", MessageType::RoundReport).await);
    let reports: Vec<String> = setup.messages_for("alice").await;
    assert!(
        reports
            .iter()
            .any(|m| m.contains("ROUND_REPORT") && m.contains("\"aborted\":true")),
        "abandoned rounds cost no lives"
    );
    assert_eq!(setup.lives("alice"), 5);
    assert_eq!(setup.lives("carol"), 5);
    assert_eq!(setup.phase(), Phase::Bidding, "play continues two-handed");
}

#[tokio::test]
async fn test_lobby_disconnect_frees_seat_immediately() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;

    setup.service.disconnect(setup.conn("bob"), ROOM).await;
    assert_eq!(setup.player_count(), 1);

    setup.service.disconnect(setup.conn("alice"), ROOM).await;
    assert!(setup.registry.get(ROOM).is_none(), "empty room destroyed");
}

#[tokio::test]
async fn test_unanimous_restart_vote_returns_to_lobby() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    setup.clear_messages().await;

    setup.service.vote_restart(setup.conn("alice"), ROOM).await;
    setup.service.vote_restart(setup.conn("bob"), ROOM).await;
    assert_ne!(setup.phase(), Phase::Lobby, "vote not unanimous yet");

    setup.service.vote_restart(setup.conn("carol"), ROOM).await;
    settle(100).await;

    assert_eq!(setup.phase(), Phase::Lobby);
    assert!(setup.received("bob", MessageType::BackToLobby).await);
    assert_eq!(setup.lives("alice"), 5);
}

#[tokio::test]
async fn test_restart_vote_expires_without_unanimity() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;
    setup.start_game("alice").await;

    setup.service.vote_restart(setup.conn("alice"), ROOM).await;
    settle(150).await; // past the vote window

    assert_ne!(setup.phase(), Phase::Lobby);
    assert!(setup.room().lock().unwrap().restart_votes.is_empty());
}

#[tokio::test]
async fn test_pause_blocks_bids_until_resumed() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;
    setup.start_game("alice").await;

    setup.service.toggle_pause(setup.conn("alice"), ROOM).await;
    assert_eq!(setup.phase(), Phase::Paused);
    assert!(setup.received("bob", MessageType::PauseState).await);

    let bidder = {
        let room = setup.room();
        let room = room.lock().unwrap();
        room.players[room.current_seat].name.clone()
    };
    setup.bid(&bidder, 1).await;
    {
        let room = setup.room();
        let room = room.lock().unwrap();
        let seat = room.seat_by_name(&bidder).unwrap();
        assert_eq!(room.players[seat].bid, None, "bids bounce off a paused room");
    }

    // Only the host can resume.
    setup.service.toggle_pause(setup.conn("bob"), ROOM).await;
    assert_eq!(setup.phase(), Phase::Paused);
    setup.service.toggle_pause(setup.conn("alice"), ROOM).await;
    assert_eq!(setup.phase(), Phase::Bidding);
    setup.bid(&bidder, 1).await;
    {
        let room = setup.room();
        let room = room.lock().unwrap();
        let seat = room.seat_by_name(&bidder).unwrap();
        assert_eq!(room.players[seat].bid, Some(1));
    }
}

#[tokio::test]
async fn test_ninth_player_is_rejected_in_lobby() {
    let mut setup = TestSetupBuilder::new()
        .with_players(&["p1", "p2", "p3", "p4", "p5", "p6", "p7", "p8"])
        .build()
        .await;

    assert!(!setup.join("p9").await);
    assert_eq!(setup.player_count(), 8);
}

#[tokio::test]
async fn test_mid_game_join_becomes_spectator() {
    let mut setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;
    setup.start_game("alice").await;

    assert!(setup.join("dave").await);
    assert!(setup.received("dave", MessageType::StateSnapshot).await);
    {
        let room = setup.room();
        let room = room.lock().unwrap();
        let seat = room.seat_by_name("dave").unwrap();
        assert!(room.players[seat].is_spectator);
        assert_eq!(room.players[seat].lives, 0);
    }

    // Spectator votes don't count toward a restart.
    setup.service.vote_restart(setup.conn("dave"), ROOM).await;
    assert!(setup.room().lock().unwrap().restart_votes.is_empty());
}

#[tokio::test]
async fn test_last_player_standing_wins_and_room_resets() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob"])
        .build()
        .await;
    setup.start_game("alice").await;
    setup.rig_single_card_round(&[
        ("alice", Card::new(Suit::Swords, 7)),
        ("bob", Card::new(Suit::Coins, 2)),
    ]);
    {
        // bob is one miss from elimination and the rescue is spent.
        let room = setup.room();
        let mut room = room.lock().unwrap();
        let seat = room.seat_by_name("bob").unwrap();
        room.players[seat].lives = 1;
        room.rescue.used = true;
    }
    setup.clear_messages().await;

    for _ in 0..2 {
        let name = setup.current_player();
        setup.bid(&name, 0).await;
    }
    for _ in 0..2 {
        let name = setup.current_player();
        setup.play(&name, 0).await;
    }
    settle(200).await;

    assert!(setup.received("alice", MessageType::GameOver).await);
    let over: Vec<String> = setup.messages_for("alice").await;
    assert!(over.iter().any(|m| m.contains("GAME_OVER") && m.contains("alice")));

    // After the banner the room resets and bob is back in.
    assert_eq!(setup.phase(), Phase::Lobby);
    assert!(setup.received("bob", MessageType::BackToLobby).await);
    assert_eq!(setup.lives("bob"), 5);
    let room = setup.room();
    let room = room.lock().unwrap();
    let seat = room.seat_by_name("bob").unwrap();
    assert!(!room.players[seat].is_spectator);
}

#[tokio::test]
async fn test_final_round_plays_blind_when_enabled() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    {
        // Rig a two-card round so the next deal lands on the blind round.
        let room = setup.room();
        let mut room = room.lock().unwrap();
        room.settings.blind_final_round = true;
        room.round_cards = 2;
        let hands = [
            ("alice", vec![Card::new(Suit::Coins, 2), Card::new(Suit::Coins, 3)]),
            ("bob", vec![Card::new(Suit::Swords, 4), Card::new(Suit::Swords, 5)]),
            ("carol", vec![Card::new(Suit::Cups, 6), Card::new(Suit::Cups, 7)]),
        ];
        for (name, hand) in hands {
            let seat = room.seat_by_name(name).unwrap();
            room.players[seat].hand = hand;
            room.players[seat].bid = None;
            room.players[seat].tricks_won = 0;
        }
        room.table_cards.clear();
        room.resolving = false;
        room.phase = Phase::Bidding;
        room.first_bidder_seat = room.next_alive_seat(room.dealer_seat);
        room.current_seat = room.first_bidder_seat;
    }
    setup.clear_messages().await;

    for _ in 0..3 {
        let name = setup.current_player();
        setup.bid(&name, 0).await;
    }
    for _ in 0..2 {
        for _ in 0..3 {
            let name = setup.current_player();
            setup.play(&name, 0).await;
        }
        settle(150).await;
    }
    settle(300).await;

    // The one-card round opened blind: every card is broadcast face-up.
    assert_eq!(setup.phase(), Phase::Bidding);
    {
        let room = setup.room();
        let room = room.lock().unwrap();
        assert_eq!(room.round_cards, 1);
        assert!(room.is_blind_round());
    }
    for name in ["alice", "bob", "carol"] {
        assert!(setup.received(name, MessageType::BlindRound).await);
        assert!(setup.received(name, MessageType::HandUpdate).await);
    }
    let blind: Vec<String> = setup.messages_for("alice").await;
    let blind_msg = blind
        .iter()
        .find(|m| m.contains("BLIND_ROUND"))
        .expect("blind round broadcast");
    for name in ["alice", "bob", "carol"] {
        assert!(blind_msg.contains(name));
    }
    assert!(!blind_msg.contains("\"card\":null"));
    setup.clear_messages().await;

    for _ in 0..3 {
        let name = setup.current_player();
        setup.bid(&name, 0).await;
    }
    for _ in 0..3 {
        let name = setup.current_player();
        setup.play(&name, 0).await;
    }
    settle(300).await;

    // Settling the blind round tells clients to drop the face-up cards.
    assert!(setup.received("bob", MessageType::ClearBlind).await);
    assert_eq!(setup.room().lock().unwrap().round_cards, 5);
}

#[tokio::test]
async fn test_disconnecting_voter_loses_their_restart_vote() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;

    setup.service.vote_restart(setup.conn("alice"), ROOM).await;
    setup.service.disconnect(setup.conn("alice"), ROOM).await;
    {
        let room = setup.room();
        let room = room.lock().unwrap();
        assert!(!room.restart_votes.contains("alice"));
        assert!(room.vote_timer.is_none(), "emptied ballot cancels the window");
    }

    // alice is still eligible during her grace window, so two votes out of
    // three must not reach unanimity.
    setup.service.vote_restart(setup.conn("bob"), ROOM).await;
    setup.service.vote_restart(setup.conn("carol"), ROOM).await;

    assert_ne!(setup.phase(), Phase::Lobby);
    assert!(!setup.received("bob", MessageType::BackToLobby).await);
    assert_eq!(setup.room().lock().unwrap().restart_votes.len(), 2);
}

#[tokio::test]
async fn test_grace_expiry_settlement_waits_out_pause() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    setup.clear_messages().await;

    setup.service.toggle_pause(setup.conn("alice"), ROOM).await;
    setup.service.disconnect(setup.conn("bob"), ROOM).await;
    settle(150).await; // well past grace and the abandonment kickoff

    // The room is frozen: no settlement, no report, bob still seated.
    assert_eq!(setup.phase(), Phase::Paused);
    assert!(!setup.received("alice", MessageType::RoundReport).await);
    assert_eq!(setup.player_count(), 3);

    setup.service.toggle_pause(setup.conn("alice"), ROOM).await;
    settle(150).await;

    assert!(setup.received("alice", MessageType::RoundReport).await);
    assert_eq!(setup.player_count(), 2, "bob purged once the room resumed");
    assert_eq!(setup.lives("alice"), 5);
    assert_eq!(setup.lives("carol"), 5);
    assert_eq!(setup.phase(), Phase::Bidding);
}

#[tokio::test]
async fn test_trick_winner_leaving_during_reveal_abandons_round() {
    let setup = TestSetupBuilder::new()
        .with_players(&["alice", "bob", "carol"])
        .build()
        .await;
    setup.start_game("alice").await;
    {
        // Rig a two-card round; coins make bob the first trick's winner.
        let room = setup.room();
        let mut room = room.lock().unwrap();
        room.round_cards = 2;
        let hands = [
            ("alice", vec![Card::new(Suit::Swords, 7), Card::new(Suit::Swords, 5)]),
            ("bob", vec![Card::new(Suit::Coins, 2), Card::new(Suit::Coins, 3)]),
            ("carol", vec![Card::new(Suit::Cups, 10), Card::new(Suit::Cups, 9)]),
        ];
        for (name, hand) in hands {
            let seat = room.seat_by_name(name).unwrap();
            room.players[seat].hand = hand;
            room.players[seat].bid = None;
            room.players[seat].tricks_won = 0;
        }
        room.table_cards.clear();
        room.resolving = false;
        room.phase = Phase::Bidding;
        room.first_bidder_seat = room.next_alive_seat(room.dealer_seat);
        room.current_seat = room.first_bidder_seat;
    }
    setup.clear_messages().await;

    for _ in 0..3 {
        let name = setup.current_player();
        setup.bid(&name, 0).await;
    }
    for _ in 0..3 {
        let name = setup.current_player();
        setup.play(&name, 0).await;
    }
    // The winner walks out while the trick sits face-up on the table.
    setup.service.leave_game(setup.conn("bob"), ROOM, false).await;
    settle(200).await;

    // A round the winner cannot finish is abandoned, not scored.
    let reports: Vec<String> = setup.messages_for("alice").await;
    assert!(
        reports
            .iter()
            .any(|m| m.contains("ROUND_REPORT") && m.contains("\"aborted\":true")),
        "unfinishable round settles as aborted"
    );
    assert_eq!(setup.lives("alice"), 5);
    assert_eq!(setup.lives("carol"), 5);
    assert_eq!(setup.player_count(), 2, "bob purged at settlement");
    assert_eq!(setup.phase(), Phase::Bidding, "play continues two-handed");
}
