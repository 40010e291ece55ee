//! Reviewer feedback endpoints

use axum::{
    extract::{Query, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use super::{default_days, normalize_province};
use crate::db::feedback::ProvinceAcceptance;
use crate::models::{FeedbackSummary, NewFeedback};
use crate::{ApiResult, AppState};

#[derive(Debug, Serialize, Deserialize)]
pub struct FeedbackResponse {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    pub province: Option<String>,
    #[serde(default = "default_days")]
    pub days: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SummaryResponse {
    pub days: u32,
    pub summary: FeedbackSummary,
    pub acceptance_rates: Vec<ProvinceAcceptance>,
}

/// POST /api/feedback
///
/// Invalid choice/label combinations are rejected with 400.
pub async fn record_feedback(
    State(state): State<AppState>,
    Json(mut feedback): Json<NewFeedback>,
) -> ApiResult<Json<FeedbackResponse>> {
    feedback.province = normalize_province(&feedback.province);
    let id = state.feedback.record(&feedback).await?;
    Ok(Json(FeedbackResponse { id }))
}

/// GET /api/feedback/summary?province=&days=
pub async fn feedback_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<Json<SummaryResponse>> {
    let province = query.province.as_deref().map(normalize_province);
    let summary = state.feedback.summary(province.as_deref(), query.days).await?;
    let acceptance_rates = state.feedback.acceptance_rates(query.days).await?;

    Ok(Json(SummaryResponse {
        days: query.days,
        summary,
        acceptance_rates,
    }))
}

pub fn feedback_routes() -> Router<AppState> {
    Router::new()
        .route("/api/feedback", post(record_feedback))
        .route("/api/feedback/summary", get(feedback_summary))
}
