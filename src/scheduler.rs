//! Periodic background work, owned by process lifecycle.
//!
//! Each concern runs on its own spawned loop with a fixed interval:
//! clock decrement, delayed spectator broadcast, matchmaking pairing and
//! the stale-session sweep. The loops are decoupled from request
//! handling and tolerate sessions disappearing mid-iteration.

use std::sync::Arc;

use actix_rt::time::interval;
use chrono::Utc;
use log::{debug, info, warn};

use crate::config::ArenaConfig;
use crate::game::matchmaking::Matchmaker;
use crate::game::orchestrator::{spectator_topic, GameService};
use crate::game::replay::DelayedSnapshot;
use crate::models::messages::ServerMessage;
use crate::models::session::GameStatus;
use crate::services::push::PushChannel;

pub fn spawn_background_tasks(
    games: Arc<GameService>,
    matchmaker: Arc<Matchmaker>,
    push: Arc<dyn PushChannel>,
    config: &ArenaConfig,
) {
    info!("spawning background tasks");

    {
        let games = games.clone();
        let tick = config.clock_tick;
        actix_rt::spawn(async move {
            let mut timer = interval(tick);
            loop {
                timer.tick().await;
                games.tick_clocks(Utc::now());
            }
        });
    }

    {
        let games = games.clone();
        let push = push.clone();
        let tick = config.spectator_tick;
        let delay = config.spectator_delay;
        actix_rt::spawn(async move {
            let mut timer = interval(tick);
            loop {
                timer.tick().await;
                broadcast_delayed_snapshots(&games, push.as_ref(), delay);
            }
        });
    }

    {
        let tick = config.matchmaking_tick;
        actix_rt::spawn(async move {
            let mut timer = interval(tick);
            loop {
                timer.tick().await;
                let created = matchmaker.tick();
                if !created.is_empty() {
                    debug!("matchmaking tick created {} session(s)", created.len());
                }
            }
        });
    }

    {
        let tick = config.cleanup_tick;
        actix_rt::spawn(async move {
            let mut timer = interval(tick);
            loop {
                timer.tick().await;
                games.sweep_finished(Utc::now());
            }
        });
    }
}

/// Push a lagged snapshot of every active game to its spectator topic.
/// A session vanishing or refusing a snapshot skips to the next one.
fn broadcast_delayed_snapshots(games: &GameService, push: &dyn PushChannel, delay: std::time::Duration) {
    for session in games.store().sessions_with_status(GameStatus::Active) {
        match games.snapshot_delayed(&session.id, delay) {
            Ok(snapshot) => {
                let payload = snapshot_message(&snapshot).to_json();
                push.broadcast_to_topic(&spectator_topic(&session.id), &payload);
            }
            Err(e) => {
                warn!("skipping spectator snapshot for {}: {e}", session.id);
            }
        }
    }
}

pub fn snapshot_message(snapshot: &DelayedSnapshot) -> ServerMessage {
    let mut msg = ServerMessage::new("delayed_snapshot");
    msg.game_id = Some(snapshot.game_id.clone());
    msg.board = Some(snapshot.board.render_rows());
    msg.turn = Some(snapshot.turn.to_string());
    msg.white_time_ms = Some(snapshot.clocks.white.remaining_ms);
    msg.black_time_ms = Some(snapshot.clocks.black.remaining_ms);
    msg.increment_ms = Some(snapshot.clocks.increment_ms);
    msg.move_count = Some(snapshot.move_count);
    msg
}
