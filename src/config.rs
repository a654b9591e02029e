use std::env;
use std::time::Duration;

/// Runtime configuration for the arena server.
///
/// Every field has a sensible default; `from_env` overrides individual
/// values from `ARENA_*` environment variables so deployments can tune
/// time controls and tick rates without a rebuild.
#[derive(Debug, Clone)]
pub struct ArenaConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: String,
    /// Starting time per player in milliseconds.
    pub default_time_ms: u64,
    /// Increment credited to the mover after each committed move.
    pub increment_ms: u64,
    /// Allow increments to push a clock past `default_time_ms`.
    pub bank_increment: bool,
    /// Honor a requested promotion piece instead of auto-queening.
    pub allow_underpromotion: bool,
    /// How far behind live play spectators see the game.
    pub spectator_delay: Duration,
    /// Interval of the clock-decrement tick.
    pub clock_tick: Duration,
    /// Interval of the delayed-snapshot broadcast.
    pub spectator_tick: Duration,
    /// Interval of the matchmaking pairing tick.
    pub matchmaking_tick: Duration,
    /// Interval of the stale-session sweep.
    pub cleanup_tick: Duration,
    /// Maximum rating gap for a normal matchmaking pairing.
    pub matchmaking_window: u32,
    /// Wait time after which a queued player is paired regardless of rating.
    pub matchmaking_starvation: Duration,
    /// Completed/abandoned sessions older than this are dropped by the sweep.
    pub session_retention: Duration,
    /// Consecutive delivery failures before a push destination is evicted.
    pub publish_failure_threshold: u32,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            default_time_ms: 600_000,
            increment_ms: 5_000,
            bank_increment: false,
            allow_underpromotion: false,
            spectator_delay: Duration::from_secs(120),
            clock_tick: Duration::from_millis(500),
            spectator_tick: Duration::from_secs(2),
            matchmaking_tick: Duration::from_secs(1),
            cleanup_tick: Duration::from_secs(60),
            matchmaking_window: 100,
            matchmaking_starvation: Duration::from_secs(90),
            session_retention: Duration::from_secs(3600),
            publish_failure_threshold: 3,
        }
    }
}

impl ArenaConfig {
    /// Build a config from defaults plus `ARENA_*` environment overrides.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(addr) = env::var("ARENA_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Some(ms) = env_u64("ARENA_DEFAULT_TIME_MS") {
            config.default_time_ms = ms;
        }
        if let Some(ms) = env_u64("ARENA_INCREMENT_MS") {
            config.increment_ms = ms;
        }
        if let Some(secs) = env_u64("ARENA_SPECTATOR_DELAY_SECS") {
            config.spectator_delay = Duration::from_secs(secs);
        }
        if let Some(secs) = env_u64("ARENA_STARVATION_SECS") {
            config.matchmaking_starvation = Duration::from_secs(secs);
        }
        if let Some(window) = env_u64("ARENA_MATCHMAKING_WINDOW") {
            config.matchmaking_window = window as u32;
        }
        if let Ok(flag) = env::var("ARENA_BANK_INCREMENT") {
            config.bank_increment = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        if let Ok(flag) = env::var("ARENA_ALLOW_UNDERPROMOTION") {
            config.allow_underpromotion = flag == "1" || flag.eq_ignore_ascii_case("true");
        }
        config
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
