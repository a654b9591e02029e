pub mod action;
pub mod app_state;
pub mod board;
pub mod clock;
pub mod messages;
pub mod piece;
pub mod session;

// Re-export important types
pub use action::{ActionKind, ActionRecord};
pub use app_state::AppState;
pub use board::{Board, Position};
pub use clock::{Clock, ClockPair};
pub use messages::{ClientMessage, OutboundMessage, ServerMessage};
pub use piece::{Color, Piece, PieceKind};
pub use session::{
    CastlingRights, EndReason, GameMode, GameSession, GameStatus, Outcome, Seat,
};
