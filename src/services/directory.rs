use std::collections::HashMap;
use std::sync::RwLock;

/// Player-directory capability: resolve display names and ratings by id.
/// Identity itself (accounts, auth) lives outside this process.
pub trait PlayerDirectory: Send + Sync {
    fn display_name(&self, player_id: &str) -> String;
    fn rating(&self, player_id: &str) -> u32;
}

pub const DEFAULT_RATING: u32 = 1200;

/// In-memory directory; unknown players get their id back as a display
/// name and the default rating.
pub struct MemoryDirectory {
    entries: RwLock<HashMap<String, (String, u32)>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, player_id: &str, display_name: &str, rating: u32) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(player_id.to_string(), (display_name.to_string(), rating));
        }
    }
}

impl Default for MemoryDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayerDirectory for MemoryDirectory {
    fn display_name(&self, player_id: &str) -> String {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.get(player_id).map(|(name, _)| name.clone()))
            .unwrap_or_else(|| player_id.to_string())
    }

    fn rating(&self, player_id: &str) -> u32 {
        self.entries
            .read()
            .ok()
            .and_then(|e| e.get(player_id).map(|(_, rating)| *rating))
            .unwrap_or(DEFAULT_RATING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_players_fall_back_to_defaults() {
        let directory = MemoryDirectory::new();
        assert_eq!(directory.display_name("ghost"), "ghost");
        assert_eq!(directory.rating("ghost"), DEFAULT_RATING);

        directory.register("alice", "Alice", 1480);
        assert_eq!(directory.display_name("alice"), "Alice");
        assert_eq!(directory.rating("alice"), 1480);
    }
}
