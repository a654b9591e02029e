use serde::{Deserialize, Serialize};

use crate::models::action::ActionKind;
use crate::models::piece::{Color, Piece, PieceKind};

/// A board coordinate. `row` 0 is white's back rank (rank 1), `col` 0 is
/// the a-file, so "e2" is `Position { row: 1, col: 4 }`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub row: u8,
    pub col: u8,
}

impl Position {
    pub fn new(row: u8, col: u8) -> Self {
        Self { row, col }
    }

    pub fn in_bounds(row: i16, col: i16) -> bool {
        (0..8).contains(&row) && (0..8).contains(&col)
    }

    /// Whether this coordinate lies on the board. Parsed positions are
    /// always valid; programmatically built ones may not be.
    pub fn valid(self) -> bool {
        self.row < 8 && self.col < 8
    }

    /// Offset by a (row, col) delta, returning None when off the board.
    pub fn offset(self, dr: i8, dc: i8) -> Option<Position> {
        let row = self.row as i16 + dr as i16;
        let col = self.col as i16 + dc as i16;
        if Position::in_bounds(row, col) {
            Some(Position::new(row as u8, col as u8))
        } else {
            None
        }
    }

    /// Parse algebraic notation ("e2").
    pub fn from_algebraic(s: &str) -> Option<Position> {
        let mut chars = s.trim().chars();
        let file = chars.next()?.to_ascii_lowercase();
        let rank = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        if !('a'..='h').contains(&file) || !('1'..='8').contains(&rank) {
            return None;
        }
        Some(Position::new(rank as u8 - b'1', file as u8 - b'a'))
    }

    pub fn to_algebraic(self) -> String {
        format!("{}{}", (b'a' + self.col) as char, self.row + 1)
    }
}

/// The 8x8 playing surface. A plain value type: cloning a board and
/// applying moves to the clone is how legality simulation and replay work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Board {
    squares: [[Option<Piece>; 8]; 8],
}

impl Board {
    pub fn empty() -> Self {
        Self {
            squares: [[None; 8]; 8],
        }
    }

    /// Standard chess starting position.
    pub fn standard() -> Self {
        use PieceKind::*;
        let mut board = Board::empty();
        let back_rank = [Rook, Knight, Bishop, Queen, King, Bishop, Knight, Rook];
        for (col, kind) in back_rank.into_iter().enumerate() {
            board.set(Position::new(0, col as u8), Some(Piece::new(kind, Color::White)));
            board.set(Position::new(7, col as u8), Some(Piece::new(kind, Color::Black)));
        }
        for col in 0..8 {
            board.set(Position::new(1, col), Some(Piece::new(Pawn, Color::White)));
            board.set(Position::new(6, col), Some(Piece::new(Pawn, Color::Black)));
        }
        board
    }

    pub fn get(&self, pos: Position) -> Option<Piece> {
        self.squares[pos.row as usize][pos.col as usize]
    }

    pub fn set(&mut self, pos: Position, piece: Option<Piece>) {
        self.squares[pos.row as usize][pos.col as usize] = piece;
    }

    /// All occupied squares of one color.
    pub fn pieces(&self, color: Color) -> Vec<(Position, Piece)> {
        let mut out = Vec::new();
        for row in 0..8 {
            for col in 0..8 {
                let pos = Position::new(row, col);
                if let Some(piece) = self.get(pos) {
                    if piece.color == color {
                        out.push((pos, piece));
                    }
                }
            }
        }
        out
    }

    pub fn king_position(&self, color: Color) -> Option<Position> {
        self.pieces(color)
            .into_iter()
            .find(|(_, p)| p.kind == PieceKind::King)
            .map(|(pos, _)| pos)
    }

    /// Sum of non-king material for one side.
    pub fn material(&self, color: Color) -> u32 {
        self.pieces(color)
            .iter()
            .map(|(_, p)| p.kind.material_value())
            .sum()
    }

    /// The square a pawn may capture onto en passant, derived from the
    /// single flagged pawn (the cell it skipped over), if any.
    pub fn en_passant_square(&self) -> Option<Position> {
        for row in 0..8 {
            for col in 0..8 {
                let pos = Position::new(row, col);
                if let Some(piece) = self.get(pos) {
                    if piece.kind == PieceKind::Pawn && piece.en_passant_target {
                        return pos.offset(-piece.color.pawn_direction(), 0);
                    }
                }
            }
        }
        None
    }

    /// Apply an already-classified move and its special-move side effects.
    ///
    /// This is the one piece-movement routine shared by the live game and
    /// the replay engine, so a replayed log reproduces the live board
    /// square for square. An empty source square is a no-op; callers
    /// validate before applying.
    pub fn apply(&mut self, from: Position, to: Position, kind: ActionKind, promote_to: PieceKind) {
        let mut piece = match self.get(from) {
            Some(piece) => piece,
            None => return,
        };

        // The en-passant window lasts exactly one ply.
        self.clear_en_passant_flags();

        match kind {
            ActionKind::EnPassant => {
                // The captured pawn sits beside the capturer, one row
                // behind the landing square.
                if let Some(victim) = to.offset(-piece.color.pawn_direction(), 0) {
                    self.set(victim, None);
                }
            }
            ActionKind::CastleKingside => {
                let row = from.row;
                if let Some(mut rook) = self.get(Position::new(row, 7)) {
                    rook.has_moved = true;
                    self.set(Position::new(row, 7), None);
                    self.set(Position::new(row, 5), Some(rook));
                }
            }
            ActionKind::CastleQueenside => {
                let row = from.row;
                if let Some(mut rook) = self.get(Position::new(row, 0)) {
                    rook.has_moved = true;
                    self.set(Position::new(row, 0), None);
                    self.set(Position::new(row, 3), Some(rook));
                }
            }
            ActionKind::DoublePawnPush => {
                piece.en_passant_target = true;
            }
            ActionKind::Promotion => {
                piece.kind = promote_to;
            }
            ActionKind::Normal | ActionKind::Capture => {}
        }

        piece.has_moved = true;
        self.set(from, None);
        self.set(to, Some(piece));
    }

    fn clear_en_passant_flags(&mut self) {
        for row in 0..8 {
            for col in 0..8 {
                if let Some(piece) = &mut self.squares[row][col] {
                    piece.en_passant_target = false;
                }
            }
        }
    }

    /// Render the board as eight strings, rank 8 first, '.' for empty.
    pub fn render_rows(&self) -> Vec<String> {
        (0..8)
            .rev()
            .map(|row| {
                (0..8)
                    .map(|col| {
                        self.get(Position::new(row, col))
                            .map(|p| p.glyph())
                            .unwrap_or('.')
                    })
                    .collect()
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(s: &str) -> Position {
        Position::from_algebraic(s).unwrap()
    }

    #[test]
    fn algebraic_round_trip() {
        assert_eq!(pos("e2"), Position::new(1, 4));
        assert_eq!(pos("a1"), Position::new(0, 0));
        assert_eq!(pos("h8"), Position::new(7, 7));
        assert_eq!(pos("c7").to_algebraic(), "c7");
        assert!(Position::from_algebraic("i9").is_none());
        assert!(Position::from_algebraic("e22").is_none());
    }

    #[test]
    fn standard_setup() {
        let board = Board::standard();
        assert_eq!(board.get(pos("e1")).unwrap().kind, PieceKind::King);
        assert_eq!(board.get(pos("d8")).unwrap().kind, PieceKind::Queen);
        assert_eq!(board.get(pos("a1")).unwrap().kind, PieceKind::Rook);
        assert_eq!(board.get(pos("b7")).unwrap().color, Color::Black);
        assert!(board.get(pos("e4")).is_none());
        assert_eq!(board.pieces(Color::White).len(), 16);
        assert_eq!(board.material(Color::White), 8 + 2 * 5 + 2 * 3 + 2 * 3 + 9);
    }

    #[test]
    fn double_push_marks_and_expires_en_passant() {
        let mut board = Board::standard();
        board.apply(pos("e2"), pos("e4"), ActionKind::DoublePawnPush, PieceKind::Queen);
        assert!(board.get(pos("e4")).unwrap().en_passant_target);
        assert_eq!(board.en_passant_square(), Some(pos("e3")));

        // Any following move clears the window.
        board.apply(pos("g8"), pos("f6"), ActionKind::Normal, PieceKind::Queen);
        assert!(!board.get(pos("e4")).unwrap().en_passant_target);
        assert_eq!(board.en_passant_square(), None);
    }

    #[test]
    fn en_passant_removes_the_double_stepped_pawn() {
        let mut board = Board::standard();
        board.apply(pos("e2"), pos("e4"), ActionKind::DoublePawnPush, PieceKind::Queen);
        board.apply(pos("e4"), pos("e5"), ActionKind::Normal, PieceKind::Queen);
        board.apply(pos("d7"), pos("d5"), ActionKind::DoublePawnPush, PieceKind::Queen);
        board.apply(pos("e5"), pos("d6"), ActionKind::EnPassant, PieceKind::Queen);

        assert!(board.get(pos("d5")).is_none(), "captured pawn removed");
        assert_eq!(board.get(pos("d6")).unwrap().kind, PieceKind::Pawn);
        // The neighboring c/e pawns are untouched.
        assert!(board.get(pos("c7")).is_some());
        assert!(board.get(pos("e7")).is_some());
    }

    #[test]
    fn castling_moves_the_rook_too() {
        let mut board = Board::standard();
        board.set(pos("f1"), None);
        board.set(pos("g1"), None);
        board.apply(pos("e1"), pos("g1"), ActionKind::CastleKingside, PieceKind::Queen);

        assert_eq!(board.get(pos("g1")).unwrap().kind, PieceKind::King);
        assert_eq!(board.get(pos("f1")).unwrap().kind, PieceKind::Rook);
        assert!(board.get(pos("h1")).is_none());
        assert!(board.get(pos("f1")).unwrap().has_moved);
    }

    #[test]
    fn promotion_swaps_the_piece_kind() {
        let mut board = Board::empty();
        board.set(pos("a7"), Some(Piece::new(PieceKind::Pawn, Color::White)));
        board.apply(pos("a7"), pos("a8"), ActionKind::Promotion, PieceKind::Queen);
        let promoted = board.get(pos("a8")).unwrap();
        assert_eq!(promoted.kind, PieceKind::Queen);
        assert_eq!(promoted.color, Color::White);
    }
}
