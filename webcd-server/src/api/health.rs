//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// `<git describe>+<profile>`
    pub build: String,
    pub uptime_seconds: u64,
    pub current_device: Option<String>,
    pub active_streams: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "webcd".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        build: env!("WEBCD_BUILD").to_string(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
        current_device: state.disc.current_device().await,
        active_streams: state.sessions.active_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
