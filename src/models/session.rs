use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::ArenaError;
use crate::models::board::{Board, Position};
use crate::models::clock::ClockPair;
use crate::models::piece::{Color, Piece, PieceKind};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    WaitingForPlayers,
    Active,
    Paused,
    Completed,
    Abandoned,
}

impl GameStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GameStatus::WaitingForPlayers => "waiting_for_players",
            GameStatus::Active => "active",
            GameStatus::Paused => "paused",
            GameStatus::Completed => "completed",
            GameStatus::Abandoned => "abandoned",
        }
    }
}

/// Standard is strict 1v1 chess; Team seats one white player against one
/// or more black players sharing the black pieces.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Standard,
    Team,
}

/// A filled seat. Disconnects flip `connected` but never free the seat,
/// so a returning player resumes the same session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Seat {
    pub player_id: String,
    pub color: Color,
    pub connected: bool,
}

/// The four independent castling permissions. Each flips true -> false
/// exactly once and never back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CastlingRights {
    pub white_kingside: bool,
    pub white_queenside: bool,
    pub black_kingside: bool,
    pub black_queenside: bool,
}

impl CastlingRights {
    pub fn all() -> Self {
        Self {
            white_kingside: true,
            white_queenside: true,
            black_kingside: true,
            black_queenside: true,
        }
    }

    pub fn kingside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_kingside,
            Color::Black => self.black_kingside,
        }
    }

    pub fn queenside(&self, color: Color) -> bool {
        match color {
            Color::White => self.white_queenside,
            Color::Black => self.black_queenside,
        }
    }

    pub fn revoke_both(&mut self, color: Color) {
        self.revoke_kingside(color);
        self.revoke_queenside(color);
    }

    pub fn revoke_kingside(&mut self, color: Color) {
        match color {
            Color::White => self.white_kingside = false,
            Color::Black => self.black_kingside = false,
        }
    }

    pub fn revoke_queenside(&mut self, color: Color) {
        match color {
            Color::White => self.white_queenside = false,
            Color::Black => self.black_queenside = false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    Timeout,
    Resignation,
    Agreement,
    Abandoned,
}

/// How a finished game ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub winner_id: Option<String>,
    pub winner_color: Option<Color>,
    pub is_draw: bool,
    pub reason: EndReason,
}

/// The single source of truth for one game. Mutated only through the
/// orchestration service, which serializes writers per session.
#[derive(Clone, Debug)]
pub struct GameSession {
    pub id: String,
    pub mode: GameMode,
    pub seats: Vec<Seat>,
    pub status: GameStatus,
    pub board: Board,
    pub current_turn: Color,
    pub move_count: u32,
    pub castling: CastlingRights,
    pub en_passant_target: Option<Position>,
    pub is_check: bool,
    pub is_checkmate: bool,
    pub is_draw: bool,
    pub outcome: Option<Outcome>,
    pub clocks: ClockPair,
    pub is_private: bool,
    pub invite_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl GameSession {
    /// Create a session with the creator seated as white.
    pub fn new(
        id: String,
        creator_id: String,
        mode: GameMode,
        is_private: bool,
        invite_code: Option<String>,
        clocks: ClockPair,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            mode,
            seats: vec![Seat {
                player_id: creator_id,
                color: Color::White,
                connected: true,
            }],
            status: GameStatus::WaitingForPlayers,
            board: Board::standard(),
            current_turn: Color::White,
            move_count: 0,
            castling: CastlingRights::all(),
            en_passant_target: None,
            is_check: false,
            is_checkmate: false,
            is_draw: false,
            outcome: None,
            clocks,
            is_private,
            invite_code,
            created_at,
            started_at: None,
            ended_at: None,
        }
    }

    pub fn seat_of(&self, player_id: &str) -> Option<&Seat> {
        self.seats.iter().find(|s| s.player_id == player_id)
    }

    pub fn color_of(&self, player_id: &str) -> Option<Color> {
        self.seat_of(player_id).map(|s| s.color)
    }

    /// First seated player of a color; the representative for outcomes.
    pub fn player_for_color(&self, color: Color) -> Option<&Seat> {
        self.seats.iter().find(|s| s.color == color)
    }

    fn seats_filled(&self) -> bool {
        match self.mode {
            GameMode::Standard => self.seats.len() == 2,
            GameMode::Team => self.seats.len() >= 2,
        }
    }

    /// Seat a joining player. In Standard mode the second seat is black
    /// and the game is then full; Team mode keeps accepting black seats.
    pub fn add_player(&mut self, player_id: String) -> Result<Color, ArenaError> {
        if self.status != GameStatus::WaitingForPlayers {
            return Err(ArenaError::conflict(format!(
                "session {} is not accepting players",
                self.id
            )));
        }
        if self.seat_of(&player_id).is_some() {
            return Err(ArenaError::conflict(format!(
                "player {player_id} already seated"
            )));
        }
        if self.mode == GameMode::Standard && self.seats.len() >= 2 {
            return Err(ArenaError::conflict("all seats are taken"));
        }
        self.seats.push(Seat {
            player_id,
            color: Color::Black,
            connected: true,
        });
        Ok(Color::Black)
    }

    /// Transition to Active: fresh standard board, full castling rights,
    /// white to move, clocks at the default with white counting down.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), ArenaError> {
        if self.status != GameStatus::WaitingForPlayers {
            return Err(ArenaError::conflict(format!(
                "session {} already started",
                self.id
            )));
        }
        if !self.seats_filled() {
            return Err(ArenaError::validation("not enough players to start"));
        }
        self.board = Board::standard();
        self.castling = CastlingRights::all();
        self.current_turn = Color::White;
        self.move_count = 0;
        self.en_passant_target = None;
        self.is_check = false;
        self.is_checkmate = false;
        self.is_draw = false;
        self.status = GameStatus::Active;
        self.started_at = Some(now);
        self.clocks.start(Color::White, now);
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), ArenaError> {
        if self.status != GameStatus::Active {
            return Err(ArenaError::conflict("only an active session can pause"));
        }
        self.status = GameStatus::Paused;
        self.clocks.halt();
        Ok(())
    }

    pub fn resume(&mut self, now: DateTime<Utc>) -> Result<(), ArenaError> {
        if self.status != GameStatus::Paused {
            return Err(ArenaError::conflict("session is not paused"));
        }
        self.status = GameStatus::Active;
        self.clocks.start(self.current_turn, now);
        Ok(())
    }

    /// Terminal transition. Ending an already-completed session is an
    /// idempotent no-op so duplicate end requests do not error.
    pub fn end(&mut self, outcome: Outcome, abandoned: bool, now: DateTime<Utc>) {
        if matches!(self.status, GameStatus::Completed | GameStatus::Abandoned) {
            return;
        }
        self.is_draw = outcome.is_draw;
        self.outcome = Some(outcome);
        self.status = if abandoned {
            GameStatus::Abandoned
        } else {
            GameStatus::Completed
        };
        self.ended_at = Some(now);
        self.clocks.halt();
    }

    pub fn is_over(&self) -> bool {
        matches!(self.status, GameStatus::Completed | GameStatus::Abandoned)
    }

    pub fn set_connected(&mut self, player_id: &str, connected: bool) {
        if let Some(seat) = self.seats.iter_mut().find(|s| s.player_id == player_id) {
            seat.connected = connected;
        }
    }

    /// Drop castling permissions invalidated by a committed move: a king
    /// move revokes both flags, a rook leaving (or being captured on) its
    /// home corner revokes that side.
    pub fn update_castling_rights(
        &mut self,
        from: Position,
        to: Position,
        moved: Piece,
        captured: Option<Piece>,
    ) {
        if moved.kind == PieceKind::King {
            self.castling.revoke_both(moved.color);
        }
        if moved.kind == PieceKind::Rook && from.row == moved.color.back_rank() {
            if from.col == 0 {
                self.castling.revoke_queenside(moved.color);
            } else if from.col == 7 {
                self.castling.revoke_kingside(moved.color);
            }
        }
        if let Some(victim) = captured {
            if victim.kind == PieceKind::Rook && to.row == victim.color.back_rank() {
                if to.col == 0 {
                    self.castling.revoke_queenside(victim.color);
                } else if to.col == 7 {
                    self.castling.revoke_kingside(victim.color);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn session(mode: GameMode) -> GameSession {
        GameSession::new(
            "g1".into(),
            "alice".into(),
            mode,
            false,
            None,
            ClockPair::new(60_000, 0, false),
            at(0),
        )
    }

    #[test]
    fn standard_mode_seats_exactly_two() {
        let mut s = session(GameMode::Standard);
        assert_eq!(s.add_player("bob".into()).unwrap(), Color::Black);
        assert!(matches!(
            s.add_player("carol".into()),
            Err(ArenaError::Conflict(_))
        ));
        assert!(matches!(
            s.add_player("bob".into()),
            Err(ArenaError::Conflict(_))
        ));
    }

    #[test]
    fn team_mode_accepts_multiple_black_seats() {
        let mut s = session(GameMode::Team);
        s.add_player("bob".into()).unwrap();
        s.add_player("carol".into()).unwrap();
        assert_eq!(s.seats.len(), 3);
        assert_eq!(s.color_of("carol"), Some(Color::Black));
        assert_eq!(s.player_for_color(Color::Black).unwrap().player_id, "bob");
    }

    #[test]
    fn start_needs_a_full_roster() {
        let mut s = session(GameMode::Standard);
        assert!(matches!(s.start(at(1)), Err(ArenaError::Validation(_))));
        s.add_player("bob".into()).unwrap();
        s.start(at(1)).unwrap();
        assert_eq!(s.status, GameStatus::Active);
        assert_eq!(s.current_turn, Color::White);
        assert_eq!(s.clocks.active_side(), Some(Color::White));
        assert_eq!(s.started_at, Some(at(1)));
    }

    #[test]
    fn end_is_idempotent_once_completed() {
        let mut s = session(GameMode::Standard);
        s.add_player("bob".into()).unwrap();
        s.start(at(1)).unwrap();
        s.end(
            Outcome {
                winner_id: Some("alice".into()),
                winner_color: Some(Color::White),
                is_draw: false,
                reason: EndReason::Resignation,
            },
            false,
            at(5),
        );
        assert_eq!(s.status, GameStatus::Completed);
        assert_eq!(s.clocks.active_side(), None);
        assert_eq!(s.ended_at, Some(at(5)));

        // A second end keeps the first outcome.
        s.end(
            Outcome {
                winner_id: Some("bob".into()),
                winner_color: Some(Color::Black),
                is_draw: false,
                reason: EndReason::Agreement,
            },
            false,
            at(9),
        );
        assert_eq!(
            s.outcome.as_ref().unwrap().winner_id.as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn pause_and_resume_toggle_the_clock() {
        let mut s = session(GameMode::Standard);
        s.add_player("bob".into()).unwrap();
        s.start(at(1)).unwrap();
        s.pause().unwrap();
        assert_eq!(s.status, GameStatus::Paused);
        assert_eq!(s.clocks.active_side(), None);
        s.resume(at(2)).unwrap();
        assert_eq!(s.status, GameStatus::Active);
        assert_eq!(s.clocks.active_side(), Some(Color::White));
    }

    #[test]
    fn castling_rights_only_ever_revoke() {
        let mut s = session(GameMode::Standard);
        let rook = Piece::new(PieceKind::Rook, Color::White);
        s.update_castling_rights(
            Position::new(0, 7),
            Position::new(4, 7),
            rook,
            None,
        );
        assert!(!s.castling.white_kingside);
        assert!(s.castling.white_queenside);

        // Capturing black's a8 rook revokes black queenside.
        let queen = Piece::new(PieceKind::Queen, Color::White);
        let victim = Piece::new(PieceKind::Rook, Color::Black);
        s.update_castling_rights(
            Position::new(4, 0),
            Position::new(7, 0),
            queen,
            Some(victim),
        );
        assert!(!s.castling.black_queenside);
        assert!(s.castling.black_kingside);
    }
}
