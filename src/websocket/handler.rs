use actix::{Actor, ActorContext, AsyncContext, Handler, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{info, warn};
use uuid::Uuid;

use crate::models::app_state::AppState;
use crate::models::messages::{ClientMessage, OutboundMessage};
use crate::models::piece::Color;

/// One websocket connection. The actor is the push-channel endpoint for
/// its client; game state itself lives behind the orchestration service.
pub struct ArenaWebSocket {
    pub id: String,
    pub app_state: web::Data<AppState>,
    pub game_id: String,
    pub player_id: Option<String>,
    pub color: Option<Color>,
}

impl Actor for ArenaWebSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        // Register the connection with the hub so broadcasts reach it.
        self.app_state
            .hub
            .register(&self.id, ctx.address().recipient());
        info!("websocket connection started: {}", self.id);
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let Some(player_id) = self.player_id.clone() {
            // A vanished player leaves matchmaking but keeps their seat,
            // flagged as disconnected, so they can come back.
            self.app_state.matchmaker.leave(&player_id);
            if !self.game_id.is_empty() {
                self.app_state
                    .games
                    .mark_connected(&self.game_id, &player_id, false);
            }
        }
        self.app_state.hub.unregister(&self.id);
        info!("websocket connection closed: {}", self.id);
        Running::Stop
    }
}

impl Handler<OutboundMessage> for ArenaWebSocket {
    type Result = ();

    fn handle(&mut self, msg: OutboundMessage, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ArenaWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(text.as_ref()) {
                Ok(client_msg) => {
                    self.handle_message(client_msg, ctx);
                }
                Err(e) => {
                    warn!("error parsing client message: {e}");
                    ctx.text(format!("{{\"error\": \"Invalid message format: {e}\"}}"));
                }
            },
            Ok(ws::Message::Binary(_)) => {
                warn!("binary messages are not supported");
                ctx.text("{\"error\": \"Binary messages are not supported\"}");
            }
            Ok(ws::Message::Close(reason)) => {
                info!("connection closed: {reason:?}");
                ctx.close(reason);
                ctx.stop();
            }
            _ => {
                ctx.stop();
            }
        }
    }
}

/// WebSocket connection entry point.
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let id = Uuid::new_v4().to_string();
    info!("new websocket connection: {id}");

    let socket = ArenaWebSocket {
        id,
        app_state,
        game_id: String::new(),
        player_id: None,
        color: None,
    };
    ws::start(socket, &req, stream)
}
