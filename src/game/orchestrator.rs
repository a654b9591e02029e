//! Session orchestration: the single mutating entry point for gameplay.
//!
//! Every state transition loads a session copy, validates, mutates the
//! copy and saves it back while holding that session's lock, so a
//! session is a single-writer resource. Rejections never touch the
//! store or the action log; persistence and publish failures after a
//! valid move are logged and do not roll it back.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::{error, info, warn};
use uuid::Uuid;

use crate::config::ArenaConfig;
use crate::error::ArenaError;
use crate::game::replay::{self, DelayedSnapshot};
use crate::game::rules;
use crate::models::action::{ActionKind, ActionRecord};
use crate::models::board::Position;
use crate::models::clock::ClockPair;
use crate::models::messages::ServerMessage;
use crate::models::piece::PieceKind;
use crate::models::session::{EndReason, GameMode, GameSession, GameStatus, Outcome};
use crate::services::push::PushChannel;
use crate::services::store::{monotonic_timestamp, SessionStore};

/// A move as requested by a player.
#[derive(Clone, Debug)]
pub struct MoveRequest {
    pub player_id: String,
    pub from: Position,
    pub to: Position,
    pub promote_to: Option<PieceKind>,
}

/// Topic carrying live updates for a game.
pub fn live_topic(game_id: &str) -> String {
    game_id.to_string()
}

/// Topic carrying the delayed spectator feed for a game.
pub fn spectator_topic(game_id: &str) -> String {
    format!("spectate:{game_id}")
}

pub struct GameService {
    store: Arc<dyn SessionStore>,
    push: Arc<dyn PushChannel>,
    config: ArenaConfig,
    /// Per-session write locks; the serialization boundary for all
    /// mutating operations on one session.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl GameService {
    pub fn new(store: Arc<dyn SessionStore>, push: Arc<dyn PushChannel>, config: ArenaConfig) -> Self {
        Self {
            store,
            push,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ArenaConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    fn session_lock(&self, id: &str) -> Arc<Mutex<()>> {
        let mut locks = lock_or_recover(&self.locks);
        locks.entry(id.to_string()).or_default().clone()
    }

    fn drop_session_lock(&self, id: &str) {
        let mut locks = lock_or_recover(&self.locks);
        locks.remove(id);
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn create_session(
        &self,
        player_id: &str,
        mode: GameMode,
        is_private: bool,
        invite_code: Option<String>,
    ) -> Result<GameSession, ArenaError> {
        self.create_session_at(player_id, mode, is_private, invite_code, Utc::now())
    }

    pub fn create_session_at(
        &self,
        player_id: &str,
        mode: GameMode,
        is_private: bool,
        invite_code: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        if player_id.is_empty() {
            return Err(ArenaError::validation("player id must not be empty"));
        }
        let invite_code = match (is_private, invite_code) {
            (true, Some(code)) if !code.is_empty() => Some(code),
            (true, _) => Some(generate_invite_code()),
            (false, _) => None,
        };
        let session = GameSession::new(
            Uuid::new_v4().to_string(),
            player_id.to_string(),
            mode,
            is_private,
            invite_code,
            ClockPair::new(
                self.config.default_time_ms,
                self.config.increment_ms,
                self.config.bank_increment,
            ),
            now,
        );
        self.store.save(&session)?;
        info!("session {} created by {player_id}", session.id);
        Ok(session)
    }

    pub fn join_session(
        &self,
        game_id: &str,
        player_id: &str,
        invite_code: Option<&str>,
    ) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);

        let mut session = self.store.load(game_id)?;
        if session.is_private && session.invite_code.as_deref() != invite_code {
            return Err(ArenaError::validation("invalid invite code"));
        }
        // A returning player reclaims their seat instead of taking a
        // new one.
        if session.seat_of(player_id).is_some() {
            session.set_connected(player_id, true);
            self.store.save(&session)?;
            info!("player {player_id} reconnected to session {game_id}");
            return Ok(session);
        }
        let color = session.add_player(player_id.to_string())?;
        self.store.save(&session)?;
        info!("player {player_id} joined session {game_id} as {color}");

        let update = ServerMessage::session_update("player_joined", &session)
            .with_color(&color.to_string());
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());
        Ok(session)
    }

    pub fn start_session(&self, game_id: &str) -> Result<GameSession, ArenaError> {
        self.start_session_at(game_id, Utc::now())
    }

    pub fn start_session_at(
        &self,
        game_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);

        let mut session = self.store.load(game_id)?;
        session.start(now)?;
        self.store.save(&session)?;
        info!("session {game_id} started");

        let update = ServerMessage::session_update("game_started", &session);
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());
        Ok(session)
    }

    // ------------------------------------------------------------------
    // Move execution
    // ------------------------------------------------------------------

    pub fn execute_move(&self, game_id: &str, request: MoveRequest) -> Result<GameSession, ArenaError> {
        self.execute_move_at(game_id, request, Utc::now())
    }

    /// The atomic move transition: validate, apply, log, flip turn,
    /// reassess, swap clocks, persist, publish.
    pub fn execute_move_at(
        &self,
        game_id: &str,
        request: MoveRequest,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);

        let mut session = self.store.load(game_id)?;
        if session.status != GameStatus::Active {
            return Err(ArenaError::conflict(format!(
                "session {game_id} is {} and cannot accept moves",
                session.status.as_str()
            )));
        }

        if !request.from.valid() || !request.to.valid() {
            return Err(ArenaError::validation("coordinates out of range"));
        }
        let mover = session
            .color_of(&request.player_id)
            .ok_or_else(|| ArenaError::validation("you are not seated in this game"))?;
        if mover != session.current_turn {
            return Err(ArenaError::validation("not your turn"));
        }
        if !rules::is_legal(&session, request.from, request.to) {
            return Err(ArenaError::validation(format!(
                "illegal move {} -> {}",
                request.from.to_algebraic(),
                request.to.to_algebraic()
            )));
        }

        // Snapshot what the move touches before mutating the board.
        let moved = match session.board.get(request.from) {
            Some(piece) => piece,
            None => return Err(ArenaError::validation("no piece on source square")),
        };
        let captured = session.board.get(request.to);
        let kind = rules::classify(&session.board, request.from, request.to);
        let promote_to = self.resolve_promotion(kind, request.promote_to)?;

        session.board.apply(request.from, request.to, kind, promote_to);
        session.update_castling_rights(request.from, request.to, moved, captured);
        session.en_passant_target = session.board.en_passant_square();
        session.move_count += 1;
        session.current_turn = mover.opposite();

        // The action log is ground truth; it is appended before the
        // session snapshot is persisted.
        let timestamp = monotonic_timestamp(now, self.store.last_timestamp(game_id));
        let record = ActionRecord {
            seq: self.store.next_seq(game_id),
            from: request.from,
            to: request.to,
            kind,
            promotion: (kind == ActionKind::Promotion).then_some(promote_to),
            player_id: request.player_id.clone(),
            timestamp,
        };
        self.store.append_action(game_id, record)?;

        session.clocks.commit_move(mover, now);

        let assessment = rules::assess(&session, session.current_turn);
        session.is_check = assessment.is_check;
        session.is_checkmate = assessment.is_checkmate;
        if assessment.is_checkmate {
            session.end(
                Outcome {
                    winner_id: Some(request.player_id.clone()),
                    winner_color: Some(mover),
                    is_draw: false,
                    reason: EndReason::Checkmate,
                },
                false,
                now,
            );
        } else if assessment.is_stalemate {
            session.end(draw_outcome(EndReason::Stalemate), false, now);
        } else if assessment.insufficient_material {
            session.end(draw_outcome(EndReason::InsufficientMaterial), false, now);
        }

        // From here on the move is committed; infrastructure trouble is
        // reported but never undoes it.
        if let Err(e) = self.store.save(&session) {
            error!("session {game_id} mutated but save failed: {e}");
        }
        let update = ServerMessage::session_update("move_made", &session)
            .with_move(request.from, request.to)
            .with_color(&mover.to_string());
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());

        info!(
            "session {game_id}: {} played {} -> {} ({kind:?})",
            request.player_id,
            request.from.to_algebraic(),
            request.to.to_algebraic()
        );
        Ok(session)
    }

    fn resolve_promotion(
        &self,
        kind: ActionKind,
        requested: Option<PieceKind>,
    ) -> Result<PieceKind, ArenaError> {
        if kind != ActionKind::Promotion {
            return Ok(PieceKind::Queen);
        }
        match requested {
            Some(piece) if self.config.allow_underpromotion => {
                if matches!(piece, PieceKind::King | PieceKind::Pawn) {
                    Err(ArenaError::validation("cannot promote to that piece"))
                } else {
                    Ok(piece)
                }
            }
            _ => Ok(PieceKind::Queen),
        }
    }

    // ------------------------------------------------------------------
    // Ending
    // ------------------------------------------------------------------

    pub fn end_session(
        &self,
        game_id: &str,
        winner_id: Option<&str>,
        is_draw: bool,
    ) -> Result<GameSession, ArenaError> {
        self.end_session_at(game_id, winner_id, is_draw, Utc::now())
    }

    pub fn end_session_at(
        &self,
        game_id: &str,
        winner_id: Option<&str>,
        is_draw: bool,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        let outcome = if is_draw {
            draw_outcome(EndReason::Agreement)
        } else {
            match winner_id {
                Some(winner) => Outcome {
                    winner_id: Some(winner.to_string()),
                    winner_color: None,
                    is_draw: false,
                    reason: EndReason::Resignation,
                },
                None => Outcome {
                    winner_id: None,
                    winner_color: None,
                    is_draw: false,
                    reason: EndReason::Abandoned,
                },
            }
        };
        let abandoned = !is_draw && winner_id.is_none();
        self.finish(game_id, outcome, abandoned, now)
    }

    fn finish(
        &self,
        game_id: &str,
        mut outcome: Outcome,
        abandoned: bool,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);

        let mut session = self.store.load(game_id)?;
        if session.is_over() {
            // Repeated end calls are idempotent.
            return Ok(session);
        }
        if outcome.winner_color.is_none() {
            if let Some(winner) = outcome.winner_id.as_deref() {
                outcome.winner_color = session.color_of(winner);
            }
        }
        session.end(outcome, abandoned, now);
        self.store.save(&session)?;
        info!("session {game_id} ended as {}", session.status.as_str());

        let update = ServerMessage::session_update("game_over", &session);
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());
        Ok(session)
    }

    pub fn pause_session(&self, game_id: &str) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);
        let mut session = self.store.load(game_id)?;
        session.pause()?;
        self.store.save(&session)?;
        let update = ServerMessage::session_update("game_paused", &session);
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());
        Ok(session)
    }

    pub fn resume_session(&self, game_id: &str) -> Result<GameSession, ArenaError> {
        self.resume_session_at(game_id, Utc::now())
    }

    pub fn resume_session_at(
        &self,
        game_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GameSession, ArenaError> {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);
        let mut session = self.store.load(game_id)?;
        session.resume(now)?;
        self.store.save(&session)?;
        let update = ServerMessage::session_update("game_resumed", &session);
        self.push.broadcast_to_topic(&live_topic(game_id), &update.to_json());
        Ok(session)
    }

    /// Flip a seat's connected flag; the seat itself is never freed, so
    /// a returning player resumes where they left off.
    pub fn mark_connected(&self, game_id: &str, player_id: &str, connected: bool) {
        let lock = self.session_lock(game_id);
        let _guard = lock_or_recover(&lock);
        match self.store.load(game_id) {
            Ok(mut session) => {
                session.set_connected(player_id, connected);
                if let Err(e) = self.store.save(&session) {
                    warn!("failed to persist connection flag for {game_id}: {e}");
                }
            }
            Err(_) => {
                // Session already gone; nothing to mark.
            }
        }
    }

    // ------------------------------------------------------------------
    // Spectator snapshots
    // ------------------------------------------------------------------

    /// Delayed view for spectators: the game as it stood `delay` ago.
    pub fn snapshot_delayed(
        &self,
        game_id: &str,
        delay: std::time::Duration,
    ) -> Result<DelayedSnapshot, ArenaError> {
        let delay = chrono::Duration::from_std(delay)
            .map_err(|e| ArenaError::validation(format!("bad delay: {e}")))?;
        self.snapshot_at(game_id, Utc::now() - delay)
    }

    /// Pure reconstruction from the action log; never reads live clocks.
    pub fn snapshot_at(
        &self,
        game_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<DelayedSnapshot, ArenaError> {
        let session = self.store.load(game_id)?;
        let actions = self.store.actions(game_id)?;
        replay::snapshot_at(&session, &actions, cutoff)
    }

    // ------------------------------------------------------------------
    // Background work
    // ------------------------------------------------------------------

    /// Decrement the active clock of every active session; a clock at
    /// zero ends its game by timeout with the opponent as winner.
    pub fn tick_clocks(&self, now: DateTime<Utc>) {
        for snapshot in self.store.sessions_with_status(GameStatus::Active) {
            let game_id = snapshot.id.clone();
            let lock = self.session_lock(&game_id);
            let _guard = lock_or_recover(&lock);

            // Reload under the lock; the snapshot may be stale.
            let mut session = match self.store.load(&game_id) {
                Ok(session) => session,
                Err(_) => continue,
            };
            if session.status != GameStatus::Active {
                continue;
            }
            let flagged = session.clocks.tick(now);
            match flagged {
                Some(loser) => {
                    let winner = session
                        .player_for_color(loser.opposite())
                        .map(|seat| seat.player_id.clone());
                    info!("session {game_id}: {loser} flagged on time");
                    session.end(
                        Outcome {
                            winner_id: winner,
                            winner_color: Some(loser.opposite()),
                            is_draw: false,
                            reason: EndReason::Timeout,
                        },
                        false,
                        now,
                    );
                    if let Err(e) = self.store.save(&session) {
                        error!("failed to persist timeout for {game_id}: {e}");
                        continue;
                    }
                    let update = ServerMessage::session_update("game_over", &session);
                    self.push
                        .broadcast_to_topic(&live_topic(&game_id), &update.to_json());
                }
                None => {
                    if let Err(e) = self.store.save(&session) {
                        warn!("failed to persist clock tick for {game_id}: {e}");
                    }
                }
            }
        }
    }

    /// Drop finished sessions past the retention window, with their
    /// lock-table entries.
    pub fn sweep_finished(&self, now: DateTime<Utc>) {
        let retention = chrono::Duration::from_std(self.config.session_retention)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        for status in [GameStatus::Completed, GameStatus::Abandoned] {
            for session in self.store.sessions_with_status(status) {
                let cutoff = session.ended_at.unwrap_or(session.created_at) + retention;
                if now > cutoff {
                    info!("sweeping finished session {}", session.id);
                    self.store.remove(&session.id);
                    self.drop_session_lock(&session.id);
                }
            }
        }
    }
}

fn draw_outcome(reason: EndReason) -> Outcome {
    Outcome {
        winner_id: None,
        winner_color: None,
        is_draw: true,
        reason,
    }
}

fn generate_invite_code() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_uppercase()
}

/// Mutex poisoning only happens after a panic in another writer; the
/// data is still the best state available, so recover rather than die.
fn lock_or_recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
