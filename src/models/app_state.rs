use std::sync::Arc;

use crate::config::ArenaConfig;
use crate::game::matchmaking::Matchmaker;
use crate::game::orchestrator::GameService;
use crate::services::push::ConnectionHub;

/// Application state shared between connections.
pub struct AppState {
    pub config: ArenaConfig,
    pub games: Arc<GameService>,
    pub matchmaker: Arc<Matchmaker>,
    pub hub: Arc<ConnectionHub>,
}
