use actix_web_actors::ws;
use log::warn;

use crate::error::ArenaError;
use crate::game::orchestrator::{live_topic, spectator_topic, MoveRequest};
use crate::game::rules;
use crate::models::board::Position;
use crate::models::messages::{ClientMessage, ServerMessage};
use crate::models::piece::{Color, PieceKind};
use crate::models::session::GameMode;
use crate::scheduler::snapshot_message;
use crate::websocket::handler::ArenaWebSocket;

impl ArenaWebSocket {
    pub fn handle_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match msg.action.as_str() {
            "create" => self.handle_create(msg, ctx),
            "join" => self.handle_join(msg, ctx),
            "start" => self.handle_start(msg, ctx),
            "move" => self.handle_move(msg, ctx),
            "get_moves" => self.handle_get_moves(msg, ctx),
            "end" => self.handle_end(msg, ctx),
            "pause" => self.handle_pause(msg, ctx),
            "resume" => self.handle_resume(msg, ctx),
            "queue_join" => self.handle_queue_join(msg, ctx),
            "queue_leave" => self.handle_queue_leave(msg, ctx),
            "spectate" => self.handle_spectate(msg, ctx),
            other => {
                self.send_error(ctx, &format!("Unknown action: {other}"));
            }
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        let game_id = if self.game_id.is_empty() {
            None
        } else {
            Some(self.game_id.clone())
        };
        ctx.text(ServerMessage::error(message, game_id).to_json());
    }

    fn fail(&self, ctx: &mut ws::WebsocketContext<Self>, e: ArenaError) {
        if !e.is_user_error() {
            warn!("request on connection {} failed: {e}", self.id);
        }
        self.send_error(ctx, &e.to_string());
    }

    /// Remember who this connection claims to be. Identity verification
    /// is a collaborator concern; the engine takes the id at face value.
    fn resolve_player(&mut self, msg: &ClientMessage) -> Option<String> {
        if let Some(player_id) = &msg.player_id {
            if !player_id.is_empty() {
                self.player_id = Some(player_id.clone());
                self.app_state.hub.identify(player_id, &self.id);
            }
        }
        self.player_id.clone()
    }

    fn resolve_game(&self, msg: &ClientMessage) -> Option<String> {
        msg.game_id
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| {
                if self.game_id.is_empty() {
                    None
                } else {
                    Some(self.game_id.clone())
                }
            })
    }

    fn handle_create(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.resolve_player(&msg) else {
            self.send_error(ctx, "player_id is required");
            return;
        };
        let mode = match msg.mode.as_deref() {
            None | Some("standard") => GameMode::Standard,
            Some("team") => GameMode::Team,
            Some(other) => {
                self.send_error(ctx, &format!("Unknown mode: {other}"));
                return;
            }
        };
        let is_private = msg.is_private.unwrap_or(false);

        match self
            .app_state
            .games
            .create_session(&player_id, mode, is_private, msg.invite_code)
        {
            Ok(session) => {
                self.game_id = session.id.clone();
                self.color = Some(Color::White);
                self.app_state.hub.subscribe(&live_topic(&session.id), &self.id);

                let mut response = ServerMessage::session_update("game_created", &session)
                    .with_color(&Color::White.to_string());
                response.invite_code = session.invite_code.clone();
                ctx.text(response.to_json());
            }
            Err(e) => self.fail(ctx, e),
        }
    }

    fn handle_join(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.resolve_player(&msg) else {
            self.send_error(ctx, "player_id is required");
            return;
        };
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "game_id is required");
            return;
        };

        match self
            .app_state
            .games
            .join_session(&game_id, &player_id, msg.invite_code.as_deref())
        {
            Ok(session) => {
                self.game_id = session.id.clone();
                self.color = session.color_of(&player_id);
                self.app_state.hub.subscribe(&live_topic(&session.id), &self.id);

                let color = self
                    .color
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "spectator".to_string());
                let response =
                    ServerMessage::session_update("game_joined", &session).with_color(&color);
                ctx.text(response.to_json());
            }
            Err(e) => self.fail(ctx, e),
        }
    }

    fn handle_start(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        if let Err(e) = self.app_state.games.start_session(&game_id) {
            self.fail(ctx, e);
        }
    }

    fn handle_move(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.resolve_player(&msg) else {
            self.send_error(ctx, "player_id is required");
            return;
        };
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        let (Some(from), Some(to)) = (
            msg.move_from.as_deref().and_then(Position::from_algebraic),
            msg.move_to.as_deref().and_then(Position::from_algebraic),
        ) else {
            self.send_error(ctx, "Move requires valid from and to squares");
            return;
        };
        let promote_to = msg.promote_to.as_deref().and_then(PieceKind::parse);

        let request = MoveRequest {
            player_id,
            from,
            to,
            promote_to,
        };
        // The accepted move is broadcast to the game topic; only
        // rejections need a direct reply.
        if let Err(e) = self.app_state.games.execute_move(&game_id, request) {
            self.fail(ctx, e);
        }
    }

    fn handle_get_moves(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        let Some(from) = msg.move_from.as_deref().and_then(Position::from_algebraic) else {
            self.send_error(ctx, "get_moves requires a valid from square");
            return;
        };

        match self.app_state.games.store().load(&game_id) {
            Ok(session) => {
                if session.board.get(from).is_none() {
                    self.send_error(ctx, "No piece on that square");
                    return;
                }
                let moves = rules::legal_moves_from(&session, from)
                    .into_iter()
                    .map(Position::to_algebraic)
                    .collect();

                let mut response = ServerMessage::new("available_moves");
                response.game_id = Some(game_id);
                response.move_from = Some(from.to_algebraic());
                response.available_moves = Some(moves);
                ctx.text(response.to_json());
            }
            Err(e) => self.fail(ctx, e),
        }
    }

    fn handle_end(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        let is_draw = msg.is_draw.unwrap_or(false);
        if let Err(e) =
            self.app_state
                .games
                .end_session(&game_id, msg.winner_id.as_deref(), is_draw)
        {
            self.fail(ctx, e);
        }
    }

    fn handle_pause(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        if let Err(e) = self.app_state.games.pause_session(&game_id) {
            self.fail(ctx, e);
        }
    }

    fn handle_resume(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "Not in a game");
            return;
        };
        if let Err(e) = self.app_state.games.resume_session(&game_id) {
            self.fail(ctx, e);
        }
    }

    fn handle_queue_join(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.resolve_player(&msg) else {
            self.send_error(ctx, "player_id is required");
            return;
        };
        self.app_state.matchmaker.join(&player_id, msg.rating);
        ctx.text(ServerMessage::new("queued").to_json());
    }

    fn handle_queue_leave(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(player_id) = self.resolve_player(&msg) else {
            self.send_error(ctx, "player_id is required");
            return;
        };
        self.app_state.matchmaker.leave(&player_id);
        ctx.text(ServerMessage::new("dequeued").to_json());
    }

    /// Subscribe to a game's delayed feed and reply with the current
    /// lagged snapshot right away.
    fn handle_spectate(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(game_id) = self.resolve_game(&msg) else {
            self.send_error(ctx, "game_id is required");
            return;
        };
        self.app_state
            .hub
            .subscribe(&spectator_topic(&game_id), &self.id);

        let delay = self.app_state.config.spectator_delay;
        match self.app_state.games.snapshot_delayed(&game_id, delay) {
            Ok(snapshot) => {
                ctx.text(snapshot_message(&snapshot).to_json());
            }
            Err(e) => self.fail(ctx, e),
        }
    }
}
