//! Matching and validation statistics

use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{default_days, normalize_province};
use crate::models::MatchStatistics;
use crate::services::ValidationStats;
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub province: Option<String>,
    #[serde(default = "default_days")]
    pub days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatsResponse {
    pub days: u32,
    pub matches: MatchStatistics,
    /// Counters since startup or the last reset
    pub validation: ValidationStats,
}

/// GET /api/stats?province=&days=
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<Json<StatsResponse>> {
    let province = query.province.as_deref().map(normalize_province);
    let matches = crate::db::match_records::statistics(&state.db, province.as_deref(), query.days).await?;

    Ok(Json(StatsResponse {
        days: query.days,
        matches,
        validation: state.validator.stats().await,
    }))
}

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/api/stats", get(get_stats))
}
