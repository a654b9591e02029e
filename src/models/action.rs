use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::board::Position;
use crate::models::piece::PieceKind;

/// Classification of an executed move, recorded in the action log and
/// replayed verbatim by the delayed-snapshot engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Normal,
    Capture,
    CastleKingside,
    CastleQueenside,
    EnPassant,
    Promotion,
    DoublePawnPush,
}

/// One committed move. Immutable once appended; the ordered sequence per
/// session is the sole ground truth for spectator replay.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Strictly increasing from 1, gapless within a session.
    pub seq: u64,
    pub from: Position,
    pub to: Position,
    pub kind: ActionKind,
    /// The piece a promotion produced; None everywhere else (and read
    /// as queen by replay for logs written before underpromotion).
    pub promotion: Option<PieceKind>,
    pub player_id: String,
    pub timestamp: DateTime<Utc>,
}
