use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use log::warn;

use crate::error::ArenaError;
use crate::models::action::ActionRecord;
use crate::models::session::{GameSession, GameStatus};

/// Durable-store capability: sessions by id plus the append-only action
/// log per session. The engine only ever talks to this trait; swapping
/// the in-memory map for a database is a deployment concern.
pub trait SessionStore: Send + Sync {
    fn save(&self, session: &GameSession) -> Result<(), ArenaError>;
    fn load(&self, id: &str) -> Result<GameSession, ArenaError>;
    fn find_by_invite_code(&self, code: &str) -> Option<GameSession>;
    fn sessions_with_status(&self, status: GameStatus) -> Vec<GameSession>;
    fn remove(&self, id: &str);

    /// Append one record; `seq` must be exactly one past the current tail.
    fn append_action(&self, session_id: &str, record: ActionRecord) -> Result<(), ArenaError>;
    fn actions(&self, session_id: &str) -> Result<Vec<ActionRecord>, ArenaError>;
    fn next_seq(&self, session_id: &str) -> u64;
    fn last_timestamp(&self, session_id: &str) -> Option<DateTime<Utc>>;
}

/// In-memory store. Sessions are cloned out so readers never hold the
/// map lock while working, and writers go through the orchestration
/// layer's per-session locks.
pub struct MemoryStore {
    sessions: RwLock<HashMap<String, GameSession>>,
    actions: RwLock<HashMap<String, Vec<ActionRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            actions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemoryStore {
    fn save(&self, session: &GameSession) -> Result<(), ArenaError> {
        let mut sessions = self
            .sessions
            .write()
            .map_err(|_| ArenaError::Infrastructure("session store poisoned".into()))?;
        sessions.insert(session.id.clone(), session.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<GameSession, ArenaError> {
        let sessions = self
            .sessions
            .read()
            .map_err(|_| ArenaError::Infrastructure("session store poisoned".into()))?;
        sessions
            .get(id)
            .cloned()
            .ok_or_else(|| ArenaError::not_found(format!("session {id}")))
    }

    fn find_by_invite_code(&self, code: &str) -> Option<GameSession> {
        let sessions = self.sessions.read().ok()?;
        sessions
            .values()
            .find(|s| s.invite_code.as_deref() == Some(code))
            .cloned()
    }

    fn sessions_with_status(&self, status: GameStatus) -> Vec<GameSession> {
        match self.sessions.read() {
            Ok(sessions) => sessions
                .values()
                .filter(|s| s.status == status)
                .cloned()
                .collect(),
            Err(_) => {
                warn!("session store poisoned; returning no sessions");
                Vec::new()
            }
        }
    }

    fn remove(&self, id: &str) {
        if let Ok(mut sessions) = self.sessions.write() {
            sessions.remove(id);
        }
        if let Ok(mut actions) = self.actions.write() {
            actions.remove(id);
        }
    }

    fn append_action(&self, session_id: &str, record: ActionRecord) -> Result<(), ArenaError> {
        let mut actions = self
            .actions
            .write()
            .map_err(|_| ArenaError::Infrastructure("action log poisoned".into()))?;
        let log = actions.entry(session_id.to_string()).or_default();
        let expected = log.len() as u64 + 1;
        if record.seq != expected {
            return Err(ArenaError::conflict(format!(
                "action seq {} does not extend log at {}",
                record.seq,
                expected - 1
            )));
        }
        if let Some(last) = log.last() {
            if record.timestamp < last.timestamp {
                return Err(ArenaError::conflict(
                    "action timestamps must be non-decreasing",
                ));
            }
        }
        log.push(record);
        Ok(())
    }

    fn actions(&self, session_id: &str) -> Result<Vec<ActionRecord>, ArenaError> {
        let actions = self
            .actions
            .read()
            .map_err(|_| ArenaError::Infrastructure("action log poisoned".into()))?;
        Ok(actions.get(session_id).cloned().unwrap_or_default())
    }

    fn next_seq(&self, session_id: &str) -> u64 {
        self.actions
            .read()
            .ok()
            .and_then(|a| a.get(session_id).map(|log| log.len() as u64 + 1))
            .unwrap_or(1)
    }

    fn last_timestamp(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.actions
            .read()
            .ok()
            .and_then(|a| a.get(session_id).and_then(|log| log.last().map(|r| r.timestamp)))
    }
}

/// Timestamp helper shared by call sites that must keep log timestamps
/// non-decreasing even if the wall clock steps backwards.
pub fn monotonic_timestamp(now: DateTime<Utc>, last: Option<DateTime<Utc>>) -> DateTime<Utc> {
    match last {
        Some(last) if last > now => last,
        _ => now,
    }
}
