use actix::Message;
use serde::{Deserialize, Serialize};

use crate::models::board::Position;
use crate::models::session::GameSession;

/// Message sent from client to server.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ClientMessage {
    pub action: String,
    pub game_id: Option<String>,
    pub player_id: Option<String>,
    pub move_from: Option<String>,
    pub move_to: Option<String>,
    pub promote_to: Option<String>,
    pub mode: Option<String>,
    pub is_private: Option<bool>,
    pub invite_code: Option<String>,
    pub rating: Option<u32>,
    pub winner_id: Option<String>,
    pub is_draw: Option<bool>,
}

/// Message sent from server to client.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerMessage {
    pub message_type: String,
    pub game_id: Option<String>,
    pub error: Option<String>,
    pub board: Option<Vec<String>>,
    pub turn: Option<String>,
    pub status: Option<String>,
    pub color: Option<String>,
    pub move_from: Option<String>,
    pub move_to: Option<String>,
    pub white_time_ms: Option<u64>,
    pub black_time_ms: Option<u64>,
    pub increment_ms: Option<u64>,
    pub move_count: Option<u32>,
    pub is_check: Option<bool>,
    pub is_checkmate: Option<bool>,
    pub is_draw: Option<bool>,
    pub opponent: Option<String>,
    pub available_moves: Option<Vec<String>>,
    pub invite_code: Option<String>,
}

impl ServerMessage {
    /// An empty payload of the given type; callers fill what they need.
    pub fn new(message_type: &str) -> Self {
        Self {
            message_type: message_type.to_string(),
            game_id: None,
            error: None,
            board: None,
            turn: None,
            status: None,
            color: None,
            move_from: None,
            move_to: None,
            white_time_ms: None,
            black_time_ms: None,
            increment_ms: None,
            move_count: None,
            is_check: None,
            is_checkmate: None,
            is_draw: None,
            opponent: None,
            available_moves: None,
            invite_code: None,
        }
    }

    pub fn error(message: &str, game_id: Option<String>) -> Self {
        let mut msg = Self::new("error");
        msg.game_id = game_id;
        msg.error = Some(message.to_string());
        msg
    }

    /// Full session snapshot, the payload for create/join/move updates.
    pub fn session_update(message_type: &str, session: &GameSession) -> Self {
        let mut msg = Self::new(message_type);
        msg.game_id = Some(session.id.clone());
        msg.board = Some(session.board.render_rows());
        msg.turn = Some(session.current_turn.to_string());
        msg.status = Some(session.status.as_str().to_string());
        msg.white_time_ms = Some(session.clocks.white.remaining_ms);
        msg.black_time_ms = Some(session.clocks.black.remaining_ms);
        msg.increment_ms = Some(session.clocks.increment_ms);
        msg.move_count = Some(session.move_count);
        msg.is_check = Some(session.is_check);
        msg.is_checkmate = Some(session.is_checkmate);
        msg.is_draw = Some(session.is_draw);
        msg
    }

    pub fn with_move(mut self, from: Position, to: Position) -> Self {
        self.move_from = Some(from.to_algebraic());
        self.move_to = Some(to.to_algebraic());
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.color = Some(color.to_string());
        self
    }

    pub fn match_found(game_id: &str, opponent: &str, color: &str) -> Self {
        let mut msg = Self::new("match_found");
        msg.game_id = Some(game_id.to_string());
        msg.opponent = Some(opponent.to_string());
        msg.color = Some(color.to_string());
        msg
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            log::warn!("failed to serialize server message: {e}");
            "{\"message_type\":\"error\",\"error\":\"internal serialization failure\"}".to_string()
        })
    }
}

/// Envelope forwarded to a websocket actor for delivery to its client.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct OutboundMessage(pub String);
