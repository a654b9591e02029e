//! Rating-proximity matchmaking with a starvation fallback.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rand::Rng;

use crate::config::ArenaConfig;
use crate::game::orchestrator::GameService;
use crate::models::messages::ServerMessage;
use crate::models::piece::Color;
use crate::models::session::{GameMode, GameSession};
use crate::services::directory::PlayerDirectory;
use crate::services::push::PushChannel;

/// A player waiting to be paired.
#[derive(Clone, Debug)]
pub struct MatchmakingEntry {
    pub player_id: String,
    pub rating: u32,
    pub joined_at: DateTime<Utc>,
}

pub struct Matchmaker {
    entries: Mutex<Vec<MatchmakingEntry>>,
    games: Arc<GameService>,
    directory: Arc<dyn PlayerDirectory>,
    push: Arc<dyn PushChannel>,
    window: u32,
    starvation: Duration,
}

impl Matchmaker {
    pub fn new(
        games: Arc<GameService>,
        directory: Arc<dyn PlayerDirectory>,
        push: Arc<dyn PushChannel>,
        config: &ArenaConfig,
    ) -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            games,
            directory,
            push,
            window: config.matchmaking_window,
            starvation: Duration::from_std(config.matchmaking_starvation)
                .unwrap_or_else(|_| Duration::seconds(90)),
        }
    }

    pub fn join(&self, player_id: &str, rating: Option<u32>) {
        self.join_at(player_id, rating, Utc::now());
    }

    /// Enqueue a player; re-joining replaces the previous entry.
    pub fn join_at(&self, player_id: &str, rating: Option<u32>, now: DateTime<Utc>) {
        let rating = rating.unwrap_or_else(|| self.directory.rating(player_id));
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|e| e.player_id != player_id);
        entries.push(MatchmakingEntry {
            player_id: player_id.to_string(),
            rating,
            joined_at: now,
        });
        info!("player {player_id} queued for matchmaking at rating {rating}");
    }

    /// Dequeue a player; no error if they were never queued.
    pub fn leave(&self, player_id: &str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.retain(|e| e.player_id != player_id);
    }

    pub fn queue_len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn tick(&self) -> Vec<GameSession> {
        self.tick_at(Utc::now())
    }

    /// Pair as many couples as the policy allows this tick, materialize
    /// a session for each and notify both players.
    pub fn tick_at(&self, now: DateTime<Utc>) -> Vec<GameSession> {
        let mut created = Vec::new();
        loop {
            let pair = {
                let mut entries = match self.entries.lock() {
                    Ok(entries) => entries,
                    Err(poisoned) => poisoned.into_inner(),
                };
                entries.sort_by_key(|e| e.joined_at);
                match select_pair(&entries, now, self.window, self.starvation) {
                    Some((a, b)) => {
                        // Remove the later index first so the earlier
                        // one stays valid.
                        let second = entries.remove(a.max(b));
                        let first = entries.remove(a.min(b));
                        (first, second)
                    }
                    None => break,
                }
            };
            match self.materialize(&pair.0, &pair.1, now) {
                Ok(session) => created.push(session),
                Err(e) => {
                    // Skip-and-continue: losing one pairing must not
                    // wedge the queue.
                    warn!(
                        "failed to materialize match {} vs {}: {e}",
                        pair.0.player_id, pair.1.player_id
                    );
                }
            }
        }
        created
    }

    fn materialize(
        &self,
        a: &MatchmakingEntry,
        b: &MatchmakingEntry,
        now: DateTime<Utc>,
    ) -> Result<GameSession, crate::error::ArenaError> {
        // Coin flip for colors.
        let (white, black) = if rand::thread_rng().gen_bool(0.5) {
            (a, b)
        } else {
            (b, a)
        };
        let session =
            self.games
                .create_session_at(&white.player_id, GameMode::Standard, false, None, now)?;
        self.games.join_session(&session.id, &black.player_id, None)?;
        let session = self.games.start_session_at(&session.id, now)?;

        info!(
            "matched {} (white) vs {} (black) in session {}",
            white.player_id, black.player_id, session.id
        );
        let white_name = self.directory.display_name(&white.player_id);
        let black_name = self.directory.display_name(&black.player_id);
        self.push.send_to_user(
            &white.player_id,
            &ServerMessage::match_found(&session.id, &black_name, &Color::White.to_string())
                .to_json(),
        );
        self.push.send_to_user(
            &black.player_id,
            &ServerMessage::match_found(&session.id, &white_name, &Color::Black.to_string())
                .to_json(),
        );
        Ok(session)
    }
}

/// Pick a pair of indices into `entries` (sorted by join time), or None
/// when the head of the queue has no acceptable partner yet.
///
/// The earliest waiter drives the decision: once it has waited past the
/// starvation threshold it takes the next-longest waiter regardless of
/// rating, otherwise it takes the closest rating within the window.
fn select_pair(
    entries: &[MatchmakingEntry],
    now: DateTime<Utc>,
    window: u32,
    starvation: Duration,
) -> Option<(usize, usize)> {
    if entries.len() < 2 {
        return None;
    }
    let head = &entries[0];

    if now - head.joined_at >= starvation {
        // Starvation fallback: entries are join-time sorted, so index 1
        // is the longest-waiting partner.
        return Some((0, 1));
    }

    let mut best: Option<(usize, u32)> = None;
    for (i, candidate) in entries.iter().enumerate().skip(1) {
        let gap = head.rating.abs_diff(candidate.rating);
        if gap > window {
            continue;
        }
        if best.map_or(true, |(_, best_gap)| gap < best_gap) {
            best = Some((i, gap));
        }
    }
    best.map(|(i, _)| (0, i))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::directory::MemoryDirectory;
    use crate::services::push::RecordingPush;
    use crate::services::store::MemoryStore;
    use crate::models::session::GameStatus;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn matchmaker() -> (Matchmaker, Arc<RecordingPush>) {
        let store = Arc::new(MemoryStore::new());
        let push = Arc::new(RecordingPush::new());
        let directory = Arc::new(MemoryDirectory::new());
        let config = ArenaConfig::default();
        let games = Arc::new(GameService::new(store, push.clone(), config.clone()));
        (Matchmaker::new(games, directory, push.clone(), &config), push)
    }

    #[test]
    fn close_ratings_pair_immediately() {
        let (mm, push) = matchmaker();
        mm.join_at("alice", Some(1000), at(0));
        mm.join_at("bob", Some(1050), at(1));

        let created = mm.tick_at(at(2));
        assert_eq!(created.len(), 1);
        assert_eq!(mm.queue_len(), 0);

        let session = &created[0];
        assert_eq!(session.status, GameStatus::Active);
        assert_eq!(session.seats.len(), 2);
        let colors: Vec<Color> = session.seats.iter().map(|s| s.color).collect();
        assert!(colors.contains(&Color::White));
        assert!(colors.contains(&Color::Black));

        // Both players got a match notification.
        let direct = push.direct.lock().unwrap();
        assert_eq!(direct.len(), 2);
        assert!(direct.iter().all(|(_, p)| p.contains("match_found")));
    }

    #[test]
    fn wide_rating_gap_waits_for_the_window() {
        let (mm, _) = matchmaker();
        mm.join_at("alice", Some(1000), at(0));
        mm.join_at("bob", Some(1300), at(1));
        assert!(mm.tick_at(at(5)).is_empty());
        assert_eq!(mm.queue_len(), 2);
    }

    #[test]
    fn starved_player_pairs_regardless_of_rating() {
        let (mm, _) = matchmaker();
        mm.join_at("alice", Some(1000), at(0));
        mm.join_at("bob", Some(2400), at(80));

        // Before the threshold nothing happens.
        assert!(mm.tick_at(at(60)).is_empty());
        // Past 90s of waiting, alice takes whoever is next.
        let created = mm.tick_at(at(95));
        assert_eq!(created.len(), 1);
        assert_eq!(mm.queue_len(), 0);
    }

    #[test]
    fn closest_rating_wins_among_candidates() {
        let entries = vec![
            MatchmakingEntry {
                player_id: "head".into(),
                rating: 1500,
                joined_at: at(0),
            },
            MatchmakingEntry {
                player_id: "far".into(),
                rating: 1590,
                joined_at: at(1),
            },
            MatchmakingEntry {
                player_id: "near".into(),
                rating: 1510,
                joined_at: at(2),
            },
        ];
        let pair = select_pair(&entries, at(10), 100, Duration::seconds(90)).unwrap();
        assert_eq!(pair, (0, 2));
    }

    #[test]
    fn leave_is_idempotent_and_rejoin_replaces() {
        let (mm, _) = matchmaker();
        mm.join_at("alice", Some(1000), at(0));
        mm.leave("alice");
        mm.leave("alice");
        assert_eq!(mm.queue_len(), 0);

        mm.join_at("bob", Some(1000), at(0));
        mm.join_at("bob", Some(1111), at(5));
        assert_eq!(mm.queue_len(), 1);
    }

    #[test]
    fn multiple_pairs_form_in_one_tick() {
        let (mm, _) = matchmaker();
        mm.join_at("a", Some(1000), at(0));
        mm.join_at("b", Some(1010), at(1));
        mm.join_at("c", Some(2000), at(2));
        mm.join_at("d", Some(2020), at(3));
        let created = mm.tick_at(at(4));
        assert_eq!(created.len(), 2);
        assert_eq!(mm.queue_len(), 0);
    }
}
