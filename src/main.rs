use std::sync::Arc;

use actix_web::{web, App, HttpServer};
use log::info;

use chess_arena::config::ArenaConfig;
use chess_arena::game::matchmaking::Matchmaker;
use chess_arena::game::orchestrator::GameService;
use chess_arena::models::app_state::AppState;
use chess_arena::routes;
use chess_arena::scheduler;
use chess_arena::services::directory::MemoryDirectory;
use chess_arena::services::push::{ConnectionHub, PushChannel};
use chess_arena::services::store::MemoryStore;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = ArenaConfig::from_env();
    info!("starting chess arena server at http://{}", config.bind_addr);

    // Wire the capability implementations into the engine.
    let store = Arc::new(MemoryStore::new());
    let directory = Arc::new(MemoryDirectory::new());
    let hub = Arc::new(ConnectionHub::new(config.publish_failure_threshold));
    let push: Arc<dyn PushChannel> = hub.clone();
    let games = Arc::new(GameService::new(store, push.clone(), config.clone()));
    let matchmaker = Arc::new(Matchmaker::new(
        games.clone(),
        directory,
        push.clone(),
        &config,
    ));

    scheduler::spawn_background_tasks(games.clone(), matchmaker.clone(), push, &config);

    let app_state = web::Data::new(AppState {
        config: config.clone(),
        games,
        matchmaker,
        hub,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(routes::configure_routes)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
