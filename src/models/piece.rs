use serde::{Deserialize, Serialize};

/// Side of the board a piece (or player) belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    /// Board direction pawns of this color advance in (row delta).
    pub fn pawn_direction(self) -> i8 {
        match self {
            Color::White => 1,
            Color::Black => -1,
        }
    }

    /// Rank index pawns of this color start on.
    pub fn pawn_home_row(self) -> u8 {
        match self {
            Color::White => 1,
            Color::Black => 6,
        }
    }

    /// Rank index pawns of this color promote on.
    pub fn promotion_row(self) -> u8 {
        match self {
            Color::White => 7,
            Color::Black => 0,
        }
    }

    pub fn back_rank(self) -> u8 {
        match self {
            Color::White => 0,
            Color::Black => 7,
        }
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Color::White => write!(f, "white"),
            Color::Black => write!(f, "black"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PieceKind {
    King,
    Queen,
    Rook,
    Bishop,
    Knight,
    Pawn,
}

impl PieceKind {
    /// Simplified material value used by the insufficient-material check.
    pub fn material_value(self) -> u32 {
        match self {
            PieceKind::King => 0,
            PieceKind::Queen => 9,
            PieceKind::Rook => 5,
            PieceKind::Bishop => 3,
            PieceKind::Knight => 3,
            PieceKind::Pawn => 1,
        }
    }

    pub fn parse(s: &str) -> Option<PieceKind> {
        match s.to_ascii_lowercase().as_str() {
            "king" | "k" => Some(PieceKind::King),
            "queen" | "q" => Some(PieceKind::Queen),
            "rook" | "r" => Some(PieceKind::Rook),
            "bishop" | "b" => Some(PieceKind::Bishop),
            "knight" | "n" => Some(PieceKind::Knight),
            "pawn" | "p" => Some(PieceKind::Pawn),
            _ => None,
        }
    }
}

/// A single piece on the board.
///
/// `has_moved` feeds castling and double-push validation;
/// `en_passant_target` marks the one pawn that just double-stepped and is
/// capturable en passant for exactly one reply.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Piece {
    pub kind: PieceKind,
    pub color: Color,
    pub has_moved: bool,
    pub en_passant_target: bool,
}

impl Piece {
    pub fn new(kind: PieceKind, color: Color) -> Self {
        Self {
            kind,
            color,
            has_moved: false,
            en_passant_target: false,
        }
    }

    /// Single-character render used in board views ('.' is an empty cell).
    pub fn glyph(&self) -> char {
        let c = match self.kind {
            PieceKind::King => 'k',
            PieceKind::Queen => 'q',
            PieceKind::Rook => 'r',
            PieceKind::Bishop => 'b',
            PieceKind::Knight => 'n',
            PieceKind::Pawn => 'p',
        };
        match self.color {
            Color::White => c.to_ascii_uppercase(),
            Color::Black => c,
        }
    }
}
