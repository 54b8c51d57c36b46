mod models;
mod handlers;
mod routes;
mod docs;
mod websocket;
mod config;
mod db;
mod session;
mod store;

use std::panic;
use std::sync::Arc;
use config::Config;
use routes::create_app;
use session::{spawn_dispatcher, EngineHandle, EngineSettings};
use store::{HistoryStore, MemoryHistoryStore};
use tracing::{info, error, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Shared state handed to every axum handler
pub struct AppState {
    pub engine: EngineHandle,
    pub service_name: String,
}

#[tokio::main]
async fn main() {

    // Set panic hook for better error messages
    panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
    }));

    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            // Default to info level, but allow debug for our app
            "colab_session=debug,tower_http=debug,axum::rejection=trace,info".into()
        }))
        .init();

    info!("Starting server...");

    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        error!("Failed to load configuration: {}", e);
        warn!("Using default configuration");
        Config::default()
    });

    // Pick the durable store
    let store: Arc<dyn HistoryStore> = match &config.db_url {
        Some(db_url) => match db::PgHistoryStore::connect(db_url).await {
            Ok(store) => {
                info!("Database initialized successfully");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to initialize database: {}", e);
                warn!("Falling back to in-memory history, nothing will survive a restart");
                Arc::new(MemoryHistoryStore::new())
            }
        },
        None => {
            warn!("No database URL configured - history is kept in memory only");
            Arc::new(MemoryHistoryStore::new())
        }
    };

    // Start the session dispatcher
    let engine = spawn_dispatcher(EngineSettings::from(&config), store, config.command_queue_capacity);
    let app_state = Arc::new(AppState {
        engine,
        service_name: config.service_name.clone(),
    });

    let app_routes = create_app(app_state, &config);

    // Start the HTTP/WebSocket server
    let listener = tokio::net::TcpListener::bind(config.server_address())
        .await
        .unwrap_or_else(|_| panic!("Failed to bind to {}", config.server_address()));

    info!("🚀 Server running on http://{}", config.server_address());
    info!("📡 WebSocket available at ws://{}/ws", config.server_address());
    info!("📚 Swagger UI available at http://{}/swagger", config.server_address());

    axum::serve(listener, app_routes)
        .await
        .expect("Server failed to start");
}
