//! Low-confidence candidates awaiting manual review

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

use crate::models::CandidateLabel;
use crate::{ApiError, ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct ReviewQuery {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_threshold() -> f64 {
    60.0
}

fn default_limit() -> u32 {
    100
}

/// GET /api/review/low-confidence?threshold=&limit=
pub async fn low_confidence(
    State(state): State<AppState>,
    Query(query): Query<ReviewQuery>,
) -> ApiResult<Json<Vec<CandidateLabel>>> {
    if !(0.0..=100.0).contains(&query.threshold) {
        return Err(ApiError::BadRequest(format!(
            "threshold must be within 0..=100, got {}",
            query.threshold
        )));
    }

    let candidates =
        crate::db::candidates::list_needs_review(&state.db, query.threshold, query.limit).await?;
    Ok(Json(candidates))
}

pub fn review_routes() -> Router<AppState> {
    Router::new().route("/api/review/low-confidence", get(low_confidence))
}
