//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when no resolver is configured
    pub status: String,
    pub module: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub resolver_configured: bool,
    /// Provinces whose candidate sets are cached
    pub cached_provinces: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let last_error = state.last_error.read().await.clone();
    let resolver_configured = state.matcher.has_resolver().await;

    Json(HealthResponse {
        status: if resolver_configured { "ok" } else { "degraded" }.to_string(),
        module: "pcm-matcher".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        resolver_configured,
        cached_provinces: state.library.cached_provinces().await.len(),
        last_error,
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
