use std::sync::Arc;
use axum::{extract::State, http::StatusCode, Json};
use crate::AppState;
use crate::models::{ErrorResponse, HealthResponse};
use tracing::debug;

/// Health check endpoint
pub async fn health_check(State(app_state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        service: app_state.service_name.clone(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint. Ready means the session dispatcher answers.
pub async fn ready_check(
    State(app_state): State<Arc<AppState>>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<ErrorResponse>)> {
    debug!("Readiness check requested");
    match app_state.engine.stats().await {
        Ok(_) => Ok(Json(HealthResponse {
            status: "ok".to_string(),
            service: app_state.service_name.clone(),
            message: "Service is ready".to_string(),
        })),
        Err(e) => Err(ErrorResponse::with_status(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
    }
}
