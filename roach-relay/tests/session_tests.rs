//! End-to-end session tests against scripted engines

mod common;

use common::{harness, minutes, raw, reply, seconds, settle, FakeEngine, Step};
use roach_core::{FaultReason, NotationRules, Outcome, Side};
use roach_relay::{
    Dialect, GameSession, ProcessConnector, SessionConfig, SessionState, SpectatorEvent,
};
use std::sync::Arc;

fn capped(plies: u32) -> SessionConfig {
    SessionConfig::default().with_max_plies(Some(plies))
}

#[tokio::test(start_paused = true)]
async fn test_two_ply_transcript() {
    let h = harness(capped(2), minutes(1));
    let white = FakeEngine::uhp(vec![reply(2_000, "wS1")]);
    let black = FakeEngine::uhp(vec![reply(3_000, "bS1 wS1-")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    let moves: Vec<String> = done.record.moves().map(|m| m.to_string()).collect();
    assert_eq!(moves, vec!["wS1", "bS1 wS1-"]);
    assert_eq!(done.to_move, Side::White);
    assert_eq!(done.white_clock_ms, 58_000);
    assert_eq!(done.black_clock_ms, 57_000);
    assert_eq!(done.state, SessionState::Completed);
    assert_eq!(done.record.outcome(), Some(Outcome::Draw));
    assert_eq!(done.record.position().to_string(), "Base;InProgress;White[2];wS1;bS1 wS1-");

    // Both engines track the game through `play`
    assert_eq!(
        white.heard(),
        vec![
            "newgame Base;NotStarted;White[1]",
            "bestmove",
            "play wS1",
            "play bS1 wS1-",
        ]
    );
    assert_eq!(black.count("play wS1"), 1);
    assert_eq!(black.count("bestmove"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_record_replays_to_final_position() {
    let h = harness(capped(4), minutes(5));
    let white = FakeEngine::uhp(vec![reply(100, "wS1"), reply(100, "wQ -wS1")]);
    let black = FakeEngine::uhp(vec![reply(100, "bS1 wS1-"), reply(100, "bQ bS1/")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(done.record.plies().len(), 4);
    let replayed = done.record.replay(&NotationRules).unwrap();
    assert_eq!(&replayed, done.record.position());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_faults_mover_and_moves_ratings() {
    let h = harness(SessionConfig::default(), seconds(5));
    let white = FakeEngine::uhp(vec![Step::Silent]);
    let black = FakeEngine::uhp(vec![]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::White,
            reason: FaultReason::Timeout
        })
    );
    assert_eq!(done.state, SessionState::Faulted);
    assert!(done.record.plies().is_empty());

    h.registry.drain().await;
    let white_after = h.repository.rating(handle.white).unwrap();
    let black_after = h.repository.rating(handle.black).unwrap();
    assert!(white_after < 1500);
    assert!(black_after > 1500);
    assert_eq!(white_after + black_after, 3000);

    // The faulting engine hears nothing after its last request
    assert_eq!(white.heard(), vec!["newgame Base;NotStarted;White[1]", "bestmove"]);
}

#[tokio::test(start_paused = true)]
async fn test_illegal_replies_are_retried() {
    let h = harness(capped(2), minutes(1));
    // Wrong colour, then the queen under the tournament rule, then a legal move
    let white = FakeEngine::uhp(vec![reply(10, "bS1"), reply(10, "wQ"), reply(10, "wS1")]);
    let black = FakeEngine::uhp(vec![reply(10, "bS1 wS1-")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(done.record.outcome(), Some(Outcome::Draw));
    let moves: Vec<String> = done.record.moves().map(|m| m.to_string()).collect();
    assert_eq!(moves, vec!["wS1", "bS1 wS1-"]);
    assert_eq!(white.count("bestmove"), 3);
    // Time spent on refused replies still counts against the mover
    assert_eq!(done.record.plies()[0].elapsed_ms, 30);
}

#[tokio::test(start_paused = true)]
async fn test_quota_exhaustion_is_protocol_breach() {
    let session = capped(10).with_quota(1);
    let h = harness(session, minutes(1));
    let white = FakeEngine::uhp(vec![raw(&["hello", "ok"]), raw(&["hello", "ok"])]);
    let black = FakeEngine::uhp(vec![]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::White,
            reason: FaultReason::ProtocolBreach
        })
    );
    assert!(done.record.comment.contains("quota"));
}

#[tokio::test(start_paused = true)]
async fn test_undo_is_ignored_and_not_counted() {
    let session = capped(2).with_quota(0);
    let h = harness(session, minutes(1));
    let white = FakeEngine::uhp(vec![raw(&["undo", "ok"]), reply(10, "wS1")]);
    let black = FakeEngine::uhp(vec![raw(&["undo 2", "ok"]), reply(10, "bS1 wS1-")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(done.record.outcome(), Some(Outcome::Draw));
    assert_eq!(done.record.plies().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_error_block_is_protocol_breach() {
    let h = harness(capped(10), minutes(1));
    let white = FakeEngine::uhp(vec![reply(10, "wS1")]);
    let black = FakeEngine::uhp(vec![raw(&["err engine exploded", "ok"])]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::Black,
            reason: FaultReason::ProtocolBreach
        })
    );
    assert_eq!(done.record.plies().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_faults_that_side() {
    let h = harness(capped(10), minutes(1));
    let white = FakeEngine::uhp(vec![reply(10, "wS1")]);
    let black = FakeEngine::uhp(vec![Step::Exit]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::Black,
            reason: FaultReason::ProtocolBreach
        })
    );
    assert_eq!(done.record.outcome().and_then(|o| o.winner()), Some(Side::White));
}

#[tokio::test(start_paused = true)]
async fn test_forfeit_through_handle() {
    let h = harness(SessionConfig::default(), minutes(10));
    let white = FakeEngine::uhp(vec![Step::Silent]);
    let black = FakeEngine::uhp(vec![]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let mut feed = handle.subscribe();
    assert!(matches!(feed.recv().await.unwrap(), SpectatorEvent::Started { .. }));

    assert!(handle.forfeit(Side::Black));
    let done = handle.finished().await;
    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::Black,
            reason: FaultReason::VoluntaryForfeit
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_line_dialect_resign_and_gameover() {
    let h = harness(capped(10), minutes(1));
    let white = FakeEngine::line(vec![reply(10, "play wS1")]);
    let black = FakeEngine::line(vec![reply(10, "info"), reply(10, "resign")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;
    h.registry.drain().await;
    settle().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::Black,
            reason: FaultReason::VoluntaryForfeit
        })
    );
    // The accepted move is acknowledged with the new game string and `ok`
    assert_eq!(
        white.heard(),
        vec![
            "Base;NotStarted;White[1]",
            "Base;InProgress;Black[1];wS1",
            "ok",
            "gameover WhiteWins"
        ]
    );
    let black_heard = black.heard();
    assert_eq!(black_heard[0], "Base;InProgress;Black[1];wS1");
    assert!(black_heard[1].starts_with("id roach-relay"));
    assert_eq!(black_heard[2], "ok");
    assert!(!black_heard.iter().any(|l| l.starts_with("gameover")));
}

#[tokio::test(start_paused = true)]
async fn test_line_dialect_refuses_unknown_commands() {
    let h = harness(capped(2), minutes(1));
    let white = FakeEngine::line(vec![reply(10, "dance"), reply(10, "validmoves"), reply(10, "wS1")]);
    let black = FakeEngine::line(vec![reply(10, "bS1 wS1-")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(done.record.plies().len(), 2);
    let heard = white.heard();
    assert_eq!(heard[1], "err unrecognized command `dance`");
    assert_eq!(heard[2], "err validmoves is not supported");
}

#[tokio::test(start_paused = true)]
async fn test_line_move_sent_out_of_turn_is_refused() {
    // No quota at all: refusing the early move must not count against anyone
    let h = harness(capped(2).with_quota(0), minutes(1));
    let white = FakeEngine::uhp(vec![reply(5_000, "wS1")]);
    let black = FakeEngine::line(vec![reply(0, "bS1 wS1-")]).with_opening(&["bG1 wS1-", "info"]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;
    h.registry.drain().await;
    settle().await;

    let moves: Vec<String> = done.record.moves().map(|m| m.to_string()).collect();
    assert_eq!(moves, vec!["wS1", "bS1 wS1-"]);
    assert_eq!(done.record.outcome(), Some(Outcome::Draw));
    assert_eq!(done.record.plies()[0].elapsed_ms, 5_000);

    let heard = black.heard();
    assert_eq!(heard[0], "err out of turn: White to move, got a move for Black");
    // Queries are still answered while waiting
    assert!(heard[1].starts_with("id roach-relay"));
    assert_eq!(heard[2], "ok");
    assert_eq!(
        &heard[3..],
        [
            "Base;InProgress;Black[1];wS1",
            "Base;InProgress;White[2];wS1;bS1 wS1-",
            "ok",
            "gameover Draw",
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn test_line_resignation_while_waiting_ends_game() {
    let h = harness(SessionConfig::default(), minutes(1));
    let white = FakeEngine::uhp(vec![Step::Silent]);
    let black = FakeEngine::line(vec![]).with_opening(&["resign"]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::Black,
            reason: FaultReason::VoluntaryForfeit
        })
    );
    assert!(done.record.plies().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_spectators_see_every_ply() {
    let h = harness(capped(2), minutes(1));
    let white = FakeEngine::uhp(vec![reply(500, "wG1")]);
    let black = FakeEngine::uhp(vec![reply(500, "bG1 -wG1")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    let mut feed = handle.subscribe();

    let mut plies = Vec::new();
    loop {
        match feed.recv().await.unwrap() {
            SpectatorEvent::Started { white, black, .. } => {
                assert_eq!((white, black), (handle.white, handle.black));
            }
            SpectatorEvent::Ply { ply, .. } => plies.push(ply.mv.to_string()),
            SpectatorEvent::Finished { outcome, .. } => {
                assert_eq!(outcome, Outcome::Draw);
                break;
            }
        }
    }
    assert_eq!(plies, vec!["wG1", "bG1 -wG1"]);
}

#[tokio::test(start_paused = true)]
async fn test_failed_start_faults_that_side() {
    let h = harness(SessionConfig::default(), minutes(1));
    let missing = Arc::new(ProcessConnector {
        command: "/nonexistent/hive-engine".to_string(),
        args: vec![],
    });
    let black = FakeEngine::uhp(vec![]);

    let white = h.participant(1, Dialect::Uhp, 1500, missing);
    let handle = GameSession::spawn(h.context.clone(), white, h.fake(2, &black));
    let done = handle.finished().await;

    assert_eq!(
        done.record.outcome(),
        Some(Outcome::Fault {
            side: Side::White,
            reason: FaultReason::ProtocolBreach
        })
    );
    assert_eq!(black.heard(), vec!["newgame Base;NotStarted;White[1]"]);
}

#[tokio::test(start_paused = true)]
async fn test_finished_session_is_retired_and_stored() {
    let h = harness(capped(2), minutes(1));
    let white = FakeEngine::uhp(vec![reply(10, "wS1")]);
    let black = FakeEngine::uhp(vec![reply(10, "bS1 wS1-")]);

    let handle = GameSession::spawn(h.context.clone(), h.fake(1, &white), h.fake(2, &black));
    assert!(h.registry.get(handle.id).is_some());

    handle.finished().await;
    h.registry.drain().await;

    assert!(h.registry.is_empty());
    assert_eq!(h.repository.game_count(), 1);
    // A draw between equals leaves ratings alone
    assert_eq!(h.repository.rating(handle.white), Some(1500));
    assert!(!handle.forfeit(Side::White));
}
