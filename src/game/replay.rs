//! Delayed spectator snapshots, rebuilt purely from the action log.
//!
//! The replay never reads a session's live board or clocks; it works
//! from immutable metadata (start time, time control) and the records
//! whose timestamps fall at or before the cutoff. That keeps a snapshot
//! correct even while the live game keeps mutating concurrently.

use chrono::{DateTime, Utc};

use crate::error::ArenaError;
use crate::models::action::ActionRecord;
use crate::models::board::Board;
use crate::models::clock::ClockPair;
use crate::models::piece::{Color, PieceKind};
use crate::models::session::GameSession;

/// A historical view of one game, safe to broadcast to spectators.
#[derive(Clone, Debug)]
pub struct DelayedSnapshot {
    pub game_id: String,
    pub board: Board,
    pub turn: Color,
    pub clocks: ClockPair,
    pub move_count: u32,
    pub as_of: DateTime<Utc>,
}

/// Rebuild the board, turn and clocks as they stood at `cutoff`.
///
/// The log must be gapless: a hole means records were lost and the
/// snapshot is refused rather than silently skipping history.
pub fn snapshot_at(
    session: &GameSession,
    actions: &[ActionRecord],
    cutoff: DateTime<Utc>,
) -> Result<DelayedSnapshot, ArenaError> {
    verify_log(session, actions)?;

    // Timestamps are non-decreasing, so the records at or before the
    // cutoff are exactly a prefix of the log.
    let replayed: Vec<&ActionRecord> = actions
        .iter()
        .take_while(|r| r.timestamp <= cutoff)
        .collect();

    let mut board = Board::standard();
    for record in &replayed {
        let promote_to = record.promotion.unwrap_or(PieceKind::Queen);
        board.apply(record.from, record.to, record.kind, promote_to);
    }

    let turn = if replayed.len() % 2 == 0 {
        Color::White
    } else {
        Color::Black
    };

    let clocks = rebuild_clocks(session, &replayed, cutoff);

    Ok(DelayedSnapshot {
        game_id: session.id.clone(),
        board,
        turn,
        clocks,
        move_count: replayed.len() as u32,
        as_of: cutoff,
    })
}

/// Walk the replayed records from game start, alternating the active
/// side, charging wall time between records to whoever was on the move
/// and crediting each mover's increment, then charge the tail span
/// between the last record and the cutoff.
fn rebuild_clocks(
    session: &GameSession,
    replayed: &[&ActionRecord],
    cutoff: DateTime<Utc>,
) -> ClockPair {
    let mut clocks = ClockPair::new(
        session.clocks.default_ms,
        session.clocks.increment_ms,
        session.clocks.bank_increment,
    );
    let started_at = match session.started_at {
        Some(started_at) => started_at,
        // Not started by the cutoff: both clocks idle at full time.
        None => return clocks,
    };
    if cutoff < started_at {
        return clocks;
    }

    clocks.start(Color::White, started_at);
    let mut mover = Color::White;
    for record in replayed {
        clocks.commit_move(mover, record.timestamp);
        mover = mover.opposite();
    }
    // Tail span: whoever is on the move has been thinking since the
    // last record (a flag here is just a zeroed clock in the view).
    let _ = clocks.tick(cutoff);
    clocks
}

/// A valid log is seq 1..=n in order with non-decreasing timestamps.
fn verify_log(session: &GameSession, actions: &[ActionRecord]) -> Result<(), ArenaError> {
    let mut previous: Option<DateTime<Utc>> = None;
    for (i, record) in actions.iter().enumerate() {
        let expected = i as u64 + 1;
        if record.seq != expected {
            return Err(ArenaError::CorruptLog {
                session_id: session.id.clone(),
                detail: format!("expected seq {expected}, found {}", record.seq),
            });
        }
        if let Some(previous) = previous {
            if record.timestamp < previous {
                return Err(ArenaError::CorruptLog {
                    session_id: session.id.clone(),
                    detail: format!("timestamp regression at seq {}", record.seq),
                });
            }
        }
        previous = Some(record.timestamp);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::action::ActionKind;
    use crate::models::board::Position;
    use crate::models::session::GameMode;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn pos(s: &str) -> Position {
        Position::from_algebraic(s).unwrap()
    }

    fn started_session() -> GameSession {
        let mut session = GameSession::new(
            "g1".into(),
            "alice".into(),
            GameMode::Standard,
            false,
            None,
            ClockPair::new(60_000, 2_000, false),
            at(0),
        );
        session.add_player("bob".into()).unwrap();
        session.start(at(0)).unwrap();
        session
    }

    fn record(seq: u64, from: &str, to: &str, kind: ActionKind, secs: i64) -> ActionRecord {
        ActionRecord {
            seq,
            from: pos(from),
            to: pos(to),
            kind,
            promotion: None,
            player_id: if seq % 2 == 1 { "alice" } else { "bob" }.into(),
            timestamp: at(secs),
        }
    }

    fn open_game_log() -> Vec<ActionRecord> {
        vec![
            record(1, "e2", "e4", ActionKind::DoublePawnPush, 10),
            record(2, "e7", "e5", ActionKind::DoublePawnPush, 25),
            record(3, "g1", "f3", ActionKind::Normal, 40),
            record(4, "b8", "c6", ActionKind::Normal, 70),
        ]
    }

    #[test]
    fn cutoff_selects_a_prefix_of_the_log() {
        let session = started_session();
        let log = open_game_log();

        let snap = snapshot_at(&session, &log, at(30)).unwrap();
        assert_eq!(snap.move_count, 2);
        assert_eq!(snap.turn, Color::White);
        // e4 and e5 played; knights still home.
        assert!(snap.board.get(pos("e4")).is_some());
        assert!(snap.board.get(pos("e5")).is_some());
        assert!(snap.board.get(pos("g1")).is_some());
        assert!(snap.board.get(pos("f3")).is_none());

        let later = snapshot_at(&session, &log, at(45)).unwrap();
        assert_eq!(later.move_count, 3);
        assert_eq!(later.turn, Color::Black);
        assert!(later.board.get(pos("f3")).is_some());
    }

    #[test]
    fn snapshot_is_idempotent() {
        let session = started_session();
        let log = open_game_log();
        let a = snapshot_at(&session, &log, at(42)).unwrap();
        let b = snapshot_at(&session, &log, at(42)).unwrap();
        assert_eq!(a.board, b.board);
        assert_eq!(a.clocks, b.clocks);
        assert_eq!(a.turn, b.turn);
        assert_eq!(a.move_count, b.move_count);
    }

    #[test]
    fn clocks_reflect_time_only_up_to_the_cutoff() {
        let session = started_session();
        let log = open_game_log();

        // At t=30: white spent 10s (+2 inc), black spent 15s (+2 inc),
        // then white has been thinking for 5s of tail time.
        let snap = snapshot_at(&session, &log, at(30)).unwrap();
        assert_eq!(snap.clocks.white.remaining_ms, 60_000 - 10_000 + 2_000 - 5_000);
        assert_eq!(snap.clocks.black.remaining_ms, 60_000 - 15_000 + 2_000);
        assert_eq!(snap.clocks.active_side(), Some(Color::White));
    }

    #[test]
    fn tail_time_floors_at_zero() {
        let session = started_session();
        let log = vec![record(1, "e2", "e4", ActionKind::DoublePawnPush, 10)];
        // Black then sits for far longer than the allotment.
        let snap = snapshot_at(&session, &log, at(10 + 120)).unwrap();
        assert_eq!(snap.clocks.black.remaining_ms, 0);
    }

    #[test]
    fn unstarted_game_reports_idle_full_clocks() {
        let mut session = started_session();
        session.started_at = None;
        let snap = snapshot_at(&session, &[], at(50)).unwrap();
        assert_eq!(snap.clocks.active_side(), None);
        assert_eq!(snap.clocks.white.remaining_ms, 60_000);
        assert_eq!(snap.move_count, 0);
        assert_eq!(snap.turn, Color::White);
    }

    #[test]
    fn special_moves_replay_their_side_effects() {
        let session = started_session();
        let log = vec![
            record(1, "e2", "e4", ActionKind::DoublePawnPush, 1),
            record(2, "a7", "a6", ActionKind::Normal, 2),
            record(3, "e4", "e5", ActionKind::Normal, 3),
            record(4, "d7", "d5", ActionKind::DoublePawnPush, 4),
            record(5, "e5", "d6", ActionKind::EnPassant, 5),
        ];
        let snap = snapshot_at(&session, &log, at(10)).unwrap();
        assert!(snap.board.get(pos("d5")).is_none(), "victim pawn removed");
        assert_eq!(snap.board.get(pos("d6")).unwrap().kind, PieceKind::Pawn);
        assert_eq!(snap.turn, Color::Black);
    }

    #[test]
    fn gapped_logs_are_refused() {
        let session = started_session();
        let mut log = open_game_log();
        log.remove(1);
        let err = snapshot_at(&session, &log, at(100)).unwrap_err();
        assert!(matches!(err, ArenaError::CorruptLog { .. }));

        // A gap past the cutoff is still a corrupt log.
        let mut log = open_game_log();
        log[3].seq = 9;
        let err = snapshot_at(&session, &log, at(30)).unwrap_err();
        assert!(matches!(err, ArenaError::CorruptLog { .. }));
    }
}
