use crate::{AppState, models::{DiagnosticsResponse, ErrorResponse}};
use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::{error, info};

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Session engine and process statistics
pub async fn diagnostics(
    State(app_state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    // Ask the dispatcher for a consistent snapshot of its counters
    let stats = app_state.engine.stats().await.map_err(|e| {
        error!("Failed to collect engine diagnostics: {}", e);
        ErrorResponse::with_status(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
    })?;

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0),
        }
    };

    info!("Diagnostics: {} connections, {} sessions", stats.connections, stats.sessions);

    Ok((StatusCode::OK, Json(DiagnosticsResponse {
        n_conn: stats.connections as u32,
        n_sessions: stats.sessions as u32,
        n_participants: stats.participants as u32,
        n_bound_conn: stats.bound_connections as u32,
        n_history_entries: stats.history_entries as u32,
        cpu_usage,
        memory_alloc,
        memory_total,
        memory_free,
    })))
}
