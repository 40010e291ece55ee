//! Settings API endpoint
//!
//! Provides POST /api/settings/resolver_api_key

use crate::services::LlmResolver;
use crate::{ApiError, ApiResult, AppState};
use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct SetApiKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SetApiKeyResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/settings/resolver_api_key handler
///
/// **Request:** `{"api_key": "sk-..."}`
///
/// 1. Validate key (non-empty, non-whitespace)
/// 2. Write to database (authoritative)
/// 3. Install a fresh resolver in the matcher
/// 4. Sync to TOML (best-effort backup)
pub async fn set_resolver_api_key(
    State(state): State<AppState>,
    Json(payload): Json<SetApiKeyRequest>,
) -> ApiResult<Json<SetApiKeyResponse>> {
    if !crate::config::is_valid_key(&payload.api_key) {
        return Err(ApiError::BadRequest(
            "API key cannot be empty or whitespace-only".to_string(),
        ));
    }

    crate::db::settings::set_resolver_api_key(&state.db, payload.api_key.clone())
        .await
        .map_err(|e| ApiError::Internal(format!("Failed to save API key to database: {}", e)))?;

    info!("Resolver API key configured via HTTP");

    let resolver = LlmResolver::new(payload.api_key.clone(), &state.config.resolver)
        .map_err(|e| ApiError::Internal(format!("Failed to build resolver: {}", e)))?;
    state.matcher.set_resolver(Arc::new(resolver)).await;

    let mut settings = HashMap::new();
    settings.insert(
        crate::config::RESOLVER_API_KEY_SETTING.to_string(),
        payload.api_key,
    );

    if let Err(e) = crate::config::sync_settings_to_toml(settings, &state.config_path).await {
        warn!("TOML sync failed (database write succeeded): {}", e);
    }

    Ok(Json(SetApiKeyResponse {
        success: true,
        message: "Resolver API key configured successfully".to_string(),
    }))
}

pub fn settings_routes() -> Router<AppState> {
    Router::new().route("/api/settings/resolver_api_key", post(set_resolver_api_key))
}
