//! Cache invalidation endpoint
//!
//! Curation tooling calls this after editing candidates outside the service.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::normalize_province;
use crate::{ApiResult, AppState};

#[derive(Debug, Default, Deserialize)]
pub struct InvalidateRequest {
    /// Omit to clear every province
    #[serde(default)]
    pub province: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InvalidateResponse {
    /// Province cleared, or `None` when everything was cleared
    pub province: Option<String>,
}

/// POST /api/cache/invalidate
pub async fn invalidate(
    State(state): State<AppState>,
    Json(request): Json<InvalidateRequest>,
) -> ApiResult<Json<InvalidateResponse>> {
    let province = request.province.as_deref().map(normalize_province);

    match &province {
        Some(province) => {
            state.library.invalidate(province).await;
            state.mappings.invalidate(province).await;
        }
        None => {
            state.library.invalidate_all().await;
            state.mappings.invalidate_all().await;
        }
    }

    tracing::info!(province = ?province, "Caches invalidated");

    Ok(Json(InvalidateResponse { province }))
}

pub fn cache_routes() -> Router<AppState> {
    Router::new().route("/api/cache/invalidate", post(invalidate))
}
