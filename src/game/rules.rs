//! Move legality for the arena's chess rules.
//!
//! Everything here is pure: functions take a session snapshot (or just a
//! board) and never mutate it. Simulation happens on cloned boards.
//! Checkmate and stalemate are derived one way only: enumerate every
//! legal move for the side to move and test the set for emptiness.

use crate::models::action::ActionKind;
use crate::models::board::{Board, Position};
use crate::models::piece::{Color, Piece, PieceKind};
use crate::models::session::GameSession;

/// Non-king material at or below this (with no pawns on the board) is a
/// dead draw: a lone minor piece cannot force mate.
const INSUFFICIENT_MATERIAL_THRESHOLD: u32 = 3;

/// Top-level legality check for the side to move.
pub fn is_legal(session: &GameSession, from: Position, to: Position) -> bool {
    match session.board.get(from) {
        Some(piece) if piece.color == session.current_turn => {}
        _ => return false,
    }
    is_legal_for(session, from, to)
}

/// Legality ignoring whose turn it is; the mover is whoever owns the
/// source square. Used for turn-flipped mate enumeration and previews.
fn is_legal_for(session: &GameSession, from: Position, to: Position) -> bool {
    if from == to {
        return false;
    }
    let piece = match session.board.get(from) {
        Some(piece) => piece,
        None => return false,
    };
    if let Some(dest) = session.board.get(to) {
        if dest.color == piece.color {
            return false;
        }
    }

    // A two-file lateral king move is a castling attempt, validated by
    // its own rules rather than king geometry.
    let file_delta = to.col as i16 - from.col as i16;
    if piece.kind == PieceKind::King && from.row == to.row && file_delta.abs() == 2 {
        return castling_legal(session, piece.color, file_delta > 0);
    }

    if !pseudo_legal(&session.board, from, to, piece) {
        return false;
    }

    // No move may leave the mover's own king in check.
    let mut simulated = session.board.clone();
    let kind = classify(&simulated, from, to);
    simulated.apply(from, to, kind, PieceKind::Queen);
    !in_check(&simulated, piece.color)
}

/// Piece geometry without the self-check simulation.
fn pseudo_legal(board: &Board, from: Position, to: Position, piece: Piece) -> bool {
    let dr = to.row as i16 - from.row as i16;
    let dc = to.col as i16 - from.col as i16;
    match piece.kind {
        PieceKind::Rook => (dr == 0 || dc == 0) && clear_path(board, from, to),
        PieceKind::Bishop => dr.abs() == dc.abs() && clear_path(board, from, to),
        PieceKind::Queen => {
            (dr == 0 || dc == 0 || dr.abs() == dc.abs()) && clear_path(board, from, to)
        }
        PieceKind::Knight => {
            (dr.abs() == 2 && dc.abs() == 1) || (dr.abs() == 1 && dc.abs() == 2)
        }
        PieceKind::King => dr.abs() <= 1 && dc.abs() <= 1,
        PieceKind::Pawn => pawn_legal(board, from, to, piece),
    }
}

fn pawn_legal(board: &Board, from: Position, to: Position, piece: Piece) -> bool {
    let dir = piece.color.pawn_direction() as i16;
    let dr = to.row as i16 - from.row as i16;
    let dc = to.col as i16 - from.col as i16;

    // Straight pushes land only on empty squares.
    if dc == 0 {
        if board.get(to).is_some() {
            return false;
        }
        if dr == dir {
            return true;
        }
        if dr == 2 * dir && from.row == piece.color.pawn_home_row() {
            let over = Position::new((from.row as i16 + dir) as u8, from.col);
            return board.get(over).is_none();
        }
        return false;
    }

    // Diagonal steps capture, either directly or en passant.
    if dc.abs() == 1 && dr == dir {
        if let Some(target) = board.get(to) {
            return target.color != piece.color;
        }
        // En passant: the empty landing square must sit behind the one
        // pawn flagged as capturable this ply.
        let beside = Position::new(from.row, to.col);
        return matches!(
            board.get(beside),
            Some(p) if p.kind == PieceKind::Pawn
                && p.color != piece.color
                && p.en_passant_target
        );
    }

    false
}

/// Walk the squares strictly between `from` and `to`; all must be empty.
fn clear_path(board: &Board, from: Position, to: Position) -> bool {
    let dr = (to.row as i16 - from.row as i16).signum();
    let dc = (to.col as i16 - from.col as i16).signum();
    let mut row = from.row as i16 + dr;
    let mut col = from.col as i16 + dc;
    while (row, col) != (to.row as i16, to.col as i16) {
        if board.get(Position::new(row as u8, col as u8)).is_some() {
            return false;
        }
        row += dr;
        col += dc;
    }
    true
}

/// Castling: rights flag intact, king and rook unmoved, the corridor
/// empty, the king not currently in check, and no square the king crosses
/// (destination included, origin excluded) attacked by the opponent.
fn castling_legal(session: &GameSession, color: Color, kingside: bool) -> bool {
    let board = &session.board;
    let row = color.back_rank();
    let king_from = Position::new(row, 4);

    let rights = if kingside {
        session.castling.kingside(color)
    } else {
        session.castling.queenside(color)
    };
    if !rights {
        return false;
    }

    match board.get(king_from) {
        Some(p) if p.kind == PieceKind::King && p.color == color && !p.has_moved => {}
        _ => return false,
    }

    let rook_from = Position::new(row, if kingside { 7 } else { 0 });
    match board.get(rook_from) {
        Some(p) if p.kind == PieceKind::Rook && p.color == color && !p.has_moved => {}
        _ => return false,
    }

    let between: &[u8] = if kingside { &[5, 6] } else { &[1, 2, 3] };
    if between
        .iter()
        .any(|&col| board.get(Position::new(row, col)).is_some())
    {
        return false;
    }

    if square_attacked(board, king_from, color.opposite()) {
        return false;
    }
    let crossed: &[u8] = if kingside { &[5, 6] } else { &[3, 2] };
    !crossed
        .iter()
        .any(|&col| square_attacked(board, Position::new(row, col), color.opposite()))
}

/// Whether any piece of `by` pseudo-legally attacks `target`. The
/// attacker's king is deliberately excluded: kings cannot give check in
/// this rule set, and the exclusion applies to castling corridors too.
pub fn square_attacked(board: &Board, target: Position, by: Color) -> bool {
    for (pos, piece) in board.pieces(by) {
        if piece.kind == PieceKind::King {
            continue;
        }
        if attacks(board, pos, piece, target) {
            return true;
        }
    }
    false
}

fn attacks(board: &Board, from: Position, piece: Piece, target: Position) -> bool {
    if piece.kind == PieceKind::Pawn {
        // Pawns attack only their two forward diagonals.
        let dir = piece.color.pawn_direction() as i16;
        let dr = target.row as i16 - from.row as i16;
        let dc = target.col as i16 - from.col as i16;
        return dr == dir && dc.abs() == 1;
    }
    pseudo_legal(board, from, target, piece)
}

/// Whether `color`'s king is attacked. A board with no king (a terminal
/// or corrupt state) reports not-in-check rather than panicking.
pub fn in_check(board: &Board, color: Color) -> bool {
    match board.king_position(color) {
        Some(king) => square_attacked(board, king, color.opposite()),
        None => false,
    }
}

/// Every legal destination for the piece on `from`.
pub fn legal_moves_from(session: &GameSession, from: Position) -> Vec<Position> {
    let mut moves = Vec::new();
    if session.board.get(from).is_none() {
        return moves;
    }
    for row in 0..8 {
        for col in 0..8 {
            let to = Position::new(row, col);
            if is_legal_for(session, from, to) {
                moves.push(to);
            }
        }
    }
    moves
}

/// Whether `color` has at least one legal move anywhere on the board.
pub fn has_any_legal_move(session: &GameSession, color: Color) -> bool {
    for (from, _) in session.board.pieces(color) {
        if !legal_moves_from(session, from).is_empty() {
            return true;
        }
    }
    false
}

/// Neither side keeps enough material to ever force mate.
pub fn insufficient_material(board: &Board) -> bool {
    for color in [Color::White, Color::Black] {
        let has_pawn = board
            .pieces(color)
            .iter()
            .any(|(_, p)| p.kind == PieceKind::Pawn);
        if has_pawn || board.material(color) > INSUFFICIENT_MATERIAL_THRESHOLD {
            return false;
        }
    }
    true
}

/// Classify an accepted move so its side effects can be applied and the
/// action log tagged. Assumes the move already passed legality.
pub fn classify(board: &Board, from: Position, to: Position) -> ActionKind {
    let piece = match board.get(from) {
        Some(piece) => piece,
        None => return ActionKind::Normal,
    };
    let dr = to.row as i16 - from.row as i16;
    let dc = to.col as i16 - from.col as i16;

    match piece.kind {
        PieceKind::King if dc.abs() == 2 => {
            if dc > 0 {
                ActionKind::CastleKingside
            } else {
                ActionKind::CastleQueenside
            }
        }
        PieceKind::Pawn => {
            if to.row == piece.color.promotion_row() {
                ActionKind::Promotion
            } else if dr.abs() == 2 {
                ActionKind::DoublePawnPush
            } else if dc != 0 && board.get(to).is_none() {
                ActionKind::EnPassant
            } else if board.get(to).is_some() {
                ActionKind::Capture
            } else {
                ActionKind::Normal
            }
        }
        _ => {
            if board.get(to).is_some() {
                ActionKind::Capture
            } else {
                ActionKind::Normal
            }
        }
    }
}

/// Position status for the side to move, computed after a move lands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Assessment {
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_stalemate: bool,
    pub insufficient_material: bool,
}

/// Assess the position from `color`'s perspective (the side to move).
pub fn assess(session: &GameSession, color: Color) -> Assessment {
    let is_check = in_check(&session.board, color);
    let any_move = has_any_legal_move(session, color);
    Assessment {
        is_check,
        is_checkmate: is_check && !any_move,
        is_stalemate: !is_check && !any_move,
        insufficient_material: insufficient_material(&session.board),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::clock::ClockPair;
    use crate::models::session::{GameMode, GameSession, GameStatus};
    use chrono::{TimeZone, Utc};

    fn pos(s: &str) -> Position {
        Position::from_algebraic(s).unwrap()
    }

    fn fresh_session() -> GameSession {
        let mut session = GameSession::new(
            "g1".into(),
            "alice".into(),
            GameMode::Standard,
            false,
            None,
            ClockPair::new(60_000, 0, false),
            Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        );
        session.add_player("bob".into()).unwrap();
        session
            .start(Utc.timestamp_opt(1_700_000_000, 0).unwrap())
            .unwrap();
        session
    }

    /// Play a scripted sequence, trusting the legality check, applying
    /// side effects the way the orchestrator would.
    fn play(session: &mut GameSession, moves: &[(&str, &str)]) {
        for (from, to) in moves {
            let (from, to) = (pos(from), pos(to));
            assert!(
                is_legal(session, from, to),
                "expected {}->{} to be legal",
                from.to_algebraic(),
                to.to_algebraic()
            );
            let moved = session.board.get(from).unwrap();
            let captured = session.board.get(to);
            let kind = classify(&session.board, from, to);
            session.board.apply(from, to, kind, PieceKind::Queen);
            session.update_castling_rights(from, to, moved, captured);
            session.en_passant_target = session.board.en_passant_square();
            session.current_turn = session.current_turn.opposite();
            session.move_count += 1;
        }
    }

    #[test]
    fn opening_pawn_and_knight_moves() {
        let session = fresh_session();
        assert!(is_legal(&session, pos("e2"), pos("e4")));
        assert!(is_legal(&session, pos("e2"), pos("e3")));
        assert!(is_legal(&session, pos("g1"), pos("f3")));
        // Blocked or geometric nonsense.
        assert!(!is_legal(&session, pos("e2"), pos("e5")));
        assert!(!is_legal(&session, pos("a1"), pos("a3")));
        assert!(!is_legal(&session, pos("d1"), pos("d3")));
        assert!(!is_legal(&session, pos("e2"), pos("d3")));
        // Black may not move on white's turn.
        assert!(!is_legal(&session, pos("e7"), pos("e5")));
        // Moving an empty square is meaningless.
        assert!(!is_legal(&session, pos("e4"), pos("e5")));
    }

    #[test]
    fn sliders_stop_at_the_first_occupied_square() {
        let mut session = fresh_session();
        play(&mut session, &[("e2", "e4"), ("e7", "e5")]);
        // Bishop has an open diagonal now.
        assert!(is_legal(&session, pos("f1"), pos("c4")));
        // But cannot jump past its own pawn on the other diagonal.
        assert!(!is_legal(&session, pos("c1"), pos("e3")));
        // Rook still boxed in.
        assert!(!is_legal(&session, pos("h1"), pos("h5")));
    }

    #[test]
    fn capture_requires_an_enemy_piece() {
        let mut session = fresh_session();
        play(&mut session, &[("e2", "e4"), ("d7", "d5")]);
        assert!(is_legal(&session, pos("e4"), pos("d5")));
        assert_eq!(
            classify(&session.board, pos("e4"), pos("d5")),
            ActionKind::Capture
        );
    }

    #[test]
    fn a_pinned_piece_may_not_expose_its_king() {
        let mut session = fresh_session();
        play(
            &mut session,
            &[("e2", "e4"), ("e7", "e5"), ("g1", "f3"), ("d8", "h4")],
        );
        // f3 knight now shields nothing, but g2-pawn... actually the h4
        // queen eyes e1 through f2: the f2 pawn is pinned.
        assert!(!is_legal(&session, pos("f2"), pos("f3")));
        // Unrelated moves remain legal.
        assert!(is_legal(&session, pos("b1"), pos("c3")));
    }

    #[test]
    fn en_passant_window_is_single_shot() {
        let mut session = fresh_session();
        play(
            &mut session,
            &[("e2", "e4"), ("a7", "a6"), ("e4", "e5"), ("d7", "d5")],
        );
        // d5 just double-stepped past e5's guard.
        assert_eq!(session.en_passant_target, Some(pos("d6")));
        assert!(is_legal(&session, pos("e5"), pos("d6")));
        assert_eq!(
            classify(&session.board, pos("e5"), pos("d6")),
            ActionKind::EnPassant
        );
        // The capture may only target the flagged file.
        assert!(!is_legal(&session, pos("e5"), pos("f6")));

        // Let the window lapse: one quiet move each side.
        play(&mut session, &[("b1", "c3"), ("a6", "a5")]);
        assert!(!is_legal(&session, pos("e5"), pos("d6")));
    }

    #[test]
    fn castling_kingside_once_the_corridor_clears() {
        let mut session = fresh_session();
        assert!(!is_legal(&session, pos("e1"), pos("g1")));
        play(
            &mut session,
            &[("g1", "f3"), ("g8", "f6"), ("e2", "e3"), ("e7", "e6"), ("f1", "e2"), ("f8", "e7")],
        );
        assert!(is_legal(&session, pos("e1"), pos("g1")));
        assert_eq!(
            classify(&session.board, pos("e1"), pos("g1")),
            ActionKind::CastleKingside
        );
    }

    #[test]
    fn castling_blocked_by_an_attacked_crossing_square() {
        // Kings and rooks alone; a black rook rakes the f-file so the
        // white king would pass through an attacked square.
        let mut session = fresh_session();
        session.board = Board::empty();
        session.board.set(pos("e1"), Some(Piece::new(PieceKind::King, Color::White)));
        session.board.set(pos("h1"), Some(Piece::new(PieceKind::Rook, Color::White)));
        session.board.set(pos("e8"), Some(Piece::new(PieceKind::King, Color::Black)));
        session.board.set(pos("f8"), Some(Piece::new(PieceKind::Rook, Color::Black)));
        assert!(!is_legal(&session, pos("e1"), pos("g1")));

        // Shift the threat off the corridor and castling works, even
        // though a1-style long-range threats still exist elsewhere.
        session.board.set(pos("f8"), None);
        session.board.set(pos("a8"), Some(Piece::new(PieceKind::Rook, Color::Black)));
        assert!(is_legal(&session, pos("e1"), pos("g1")));
    }

    #[test]
    fn castling_denied_while_in_check_or_without_rights() {
        let mut session = fresh_session();
        session.board = Board::empty();
        session.board.set(pos("e1"), Some(Piece::new(PieceKind::King, Color::White)));
        session.board.set(pos("h1"), Some(Piece::new(PieceKind::Rook, Color::White)));
        session.board.set(pos("e8"), Some(Piece::new(PieceKind::King, Color::Black)));

        // In check: no castling out of it.
        session.board.set(pos("e7"), Some(Piece::new(PieceKind::Rook, Color::Black)));
        assert!(!is_legal(&session, pos("e1"), pos("g1")));
        session.board.set(pos("e7"), None);
        assert!(is_legal(&session, pos("e1"), pos("g1")));

        // Rights gone: geometry alone is not enough.
        session.castling.revoke_kingside(Color::White);
        assert!(!is_legal(&session, pos("e1"), pos("g1")));
    }

    #[test]
    fn scholars_mate_is_checkmate() {
        let mut session = fresh_session();
        play(
            &mut session,
            &[
                ("e2", "e4"),
                ("e7", "e5"),
                ("f1", "c4"),
                ("b8", "c6"),
                ("d1", "h5"),
                ("g8", "f6"),
                ("h5", "f7"),
            ],
        );
        let assessment = assess(&session, Color::Black);
        assert!(assessment.is_check);
        assert!(assessment.is_checkmate);
        assert!(!has_any_legal_move(&session, Color::Black));
    }

    #[test]
    fn bare_kings_and_a_stalemate_corner() {
        let mut session = fresh_session();
        session.board = Board::empty();
        session.board.set(pos("a8"), Some(Piece::new(PieceKind::King, Color::Black)));
        session.board.set(pos("c7"), Some(Piece::new(PieceKind::King, Color::White)));
        session.board.set(pos("b6"), Some(Piece::new(PieceKind::Queen, Color::White)));
        session.current_turn = Color::Black;

        let assessment = assess(&session, Color::Black);
        assert!(!assessment.is_check);
        assert!(assessment.is_stalemate);
        assert!(!assessment.is_checkmate);

        session.board.set(pos("b6"), None);
        assert!(insufficient_material(&session.board));

        // A lone pawn is always enough material to play on.
        session.board.set(pos("h2"), Some(Piece::new(PieceKind::Pawn, Color::White)));
        assert!(!insufficient_material(&session.board));
    }

    #[test]
    fn promotion_classified_on_the_last_rank() {
        let mut session = fresh_session();
        session.board = Board::empty();
        session.board.set(pos("e1"), Some(Piece::new(PieceKind::King, Color::White)));
        session.board.set(pos("e8"), Some(Piece::new(PieceKind::King, Color::Black)));
        session.board.set(pos("a7"), Some(Piece::new(PieceKind::Pawn, Color::White)));
        assert!(is_legal(&session, pos("a7"), pos("a8")));
        assert_eq!(
            classify(&session.board, pos("a7"), pos("a8")),
            ActionKind::Promotion
        );
    }

    #[test]
    fn legal_moves_enumeration_matches_point_checks() {
        let session = fresh_session();
        let knight_moves = legal_moves_from(&session, pos("b1"));
        assert_eq!(knight_moves.len(), 2);
        assert!(knight_moves.contains(&pos("a3")));
        assert!(knight_moves.contains(&pos("c3")));
        let pawn_moves = legal_moves_from(&session, pos("d2"));
        assert_eq!(pawn_moves.len(), 2);
        assert_eq!(session.status, GameStatus::Active);
    }
}
