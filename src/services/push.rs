use std::collections::HashMap;
use std::sync::Mutex;

use actix::Recipient;
use log::{info, warn};

use crate::models::messages::OutboundMessage;

/// Push-channel capability: deliver payloads to a topic's subscribers or
/// to one user. Publishing is fire-and-forget relative to game state; a
/// failed delivery never rolls back or blocks a committed move.
pub trait PushChannel: Send + Sync {
    fn broadcast_to_topic(&self, topic: &str, payload: &str);
    fn send_to_user(&self, player_id: &str, payload: &str);
}

/// WebSocket-backed hub. Connections register a `Recipient` on open and
/// are dropped on close; topics are plain subscriber lists keyed by
/// string (live games and spectator feeds both live here).
///
/// Delivery failures are counted per connection: past the threshold the
/// destination is treated as unhealthy and evicted from the hub.
pub struct ConnectionHub {
    connections: Mutex<HashMap<String, Recipient<OutboundMessage>>>,
    topics: Mutex<HashMap<String, Vec<String>>>,
    users: Mutex<HashMap<String, String>>,
    failures: Mutex<HashMap<String, u32>>,
    failure_threshold: u32,
}

impl ConnectionHub {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            topics: Mutex::new(HashMap::new()),
            users: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            failure_threshold: failure_threshold.max(1),
        }
    }

    pub fn register(&self, conn_id: &str, recipient: Recipient<OutboundMessage>) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.insert(conn_id.to_string(), recipient);
        }
        info!("connection {conn_id} registered with hub");
    }

    /// Bind a player id to a connection so send-to-user can route.
    pub fn identify(&self, player_id: &str, conn_id: &str) {
        if let Ok(mut users) = self.users.lock() {
            users.insert(player_id.to_string(), conn_id.to_string());
        }
    }

    pub fn subscribe(&self, topic: &str, conn_id: &str) {
        if let Ok(mut topics) = self.topics.lock() {
            let subscribers = topics.entry(topic.to_string()).or_default();
            if !subscribers.iter().any(|id| id == conn_id) {
                subscribers.push(conn_id.to_string());
            }
        }
    }

    pub fn unsubscribe(&self, topic: &str, conn_id: &str) {
        if let Ok(mut topics) = self.topics.lock() {
            if let Some(subscribers) = topics.get_mut(topic) {
                subscribers.retain(|id| id != conn_id);
            }
        }
    }

    /// Remove every trace of a closed connection.
    pub fn unregister(&self, conn_id: &str) {
        if let Ok(mut connections) = self.connections.lock() {
            connections.remove(conn_id);
        }
        if let Ok(mut topics) = self.topics.lock() {
            for subscribers in topics.values_mut() {
                subscribers.retain(|id| id != conn_id);
            }
        }
        if let Ok(mut users) = self.users.lock() {
            users.retain(|_, c| c != conn_id);
        }
        if let Ok(mut failures) = self.failures.lock() {
            failures.remove(conn_id);
        }
    }

    /// Best-effort delivery with strike accounting. Returns whether the
    /// payload was accepted by the connection's mailbox.
    fn deliver(&self, conn_id: &str, payload: &str) -> bool {
        let recipient = match self.connections.lock() {
            Ok(connections) => connections.get(conn_id).cloned(),
            Err(_) => None,
        };
        let Some(recipient) = recipient else {
            return false;
        };

        match recipient.try_send(OutboundMessage(payload.to_string())) {
            Ok(()) => {
                if let Ok(mut failures) = self.failures.lock() {
                    failures.remove(conn_id);
                }
                true
            }
            Err(e) => {
                warn!("delivery to {conn_id} failed: {e}");
                let strikes = {
                    let mut failures = match self.failures.lock() {
                        Ok(failures) => failures,
                        Err(_) => return false,
                    };
                    let strikes = failures.entry(conn_id.to_string()).or_insert(0);
                    *strikes += 1;
                    *strikes
                };
                if strikes >= self.failure_threshold {
                    warn!("evicting unhealthy connection {conn_id} after {strikes} failures");
                    self.unregister(conn_id);
                }
                false
            }
        }
    }
}

impl PushChannel for ConnectionHub {
    fn broadcast_to_topic(&self, topic: &str, payload: &str) {
        let subscribers = match self.topics.lock() {
            Ok(topics) => topics.get(topic).cloned().unwrap_or_default(),
            Err(_) => return,
        };
        for conn_id in subscribers {
            self.deliver(&conn_id, payload);
        }
    }

    fn send_to_user(&self, player_id: &str, payload: &str) {
        let conn_id = match self.users.lock() {
            Ok(users) => users.get(player_id).cloned(),
            Err(_) => return,
        };
        match conn_id {
            Some(conn_id) => {
                self.deliver(&conn_id, payload);
            }
            None => info!("no live connection for player {player_id}; dropping push"),
        }
    }
}

/// Test double that records everything published.
#[derive(Default)]
pub struct RecordingPush {
    pub broadcasts: Mutex<Vec<(String, String)>>,
    pub direct: Mutex<Vec<(String, String)>>,
}

impl RecordingPush {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PushChannel for RecordingPush {
    fn broadcast_to_topic(&self, topic: &str, payload: &str) {
        if let Ok(mut broadcasts) = self.broadcasts.lock() {
            broadcasts.push((topic.to_string(), payload.to_string()));
        }
    }

    fn send_to_user(&self, player_id: &str, payload: &str) {
        if let Ok(mut direct) = self.direct.lock() {
            direct.push((player_id.to_string(), payload.to_string()));
        }
    }
}
