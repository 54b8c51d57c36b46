use crate::{AppState, config::Config, docs::ApiDoc, handlers::{diagnostics, health_check, ready_check}, websocket::websocket_handler};
use axum::{http::HeaderValue, routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::{AllowOrigin, Any, CorsLayer}, trace::TraceLayer};
use tracing::warn;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Create API routes
pub fn create_api_routes(app_state: Arc<AppState>) -> Router {
    Router::<Arc<AppState>>::new()
        .route("/health", get(health_check))
        .route("/ready", get(ready_check))
        .route("/v1/diagnostics", get(diagnostics))
        .with_state(app_state)
}

/// Full application: API, WebSocket endpoint and Swagger UI
pub fn create_app(app_state: Arc<AppState>, config: &Config) -> Router {
    let ws_routes = Router::<Arc<AppState>>::new()
        .route("/ws", get(websocket_handler))
        .with_state(app_state.clone());

    Router::new()
        // Mount API routes
        .nest("/api", create_api_routes(app_state))
        .merge(ws_routes)
        // Mount Swagger UI
        .merge(SwaggerUi::new("/swagger").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(cors_layer(config))
        // Add tracing layer
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(config: &Config) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    if origins.is_empty() {
        if !config.is_development() {
            warn!("No CORS origins configured outside development, allowing any origin");
        }
        CorsLayer::permissive()
    } else {
        CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
    }
}
