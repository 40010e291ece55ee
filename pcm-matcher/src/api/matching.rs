//! Matching endpoints
//!
//! `POST /api/match` for one item, `POST /api/match/batch` for a list.
//! Per-item failures are part of the 200 response; only store errors fail
//! the request.

use axum::{extract::State, routing::post, Json, Router};
use serde::{Deserialize, Serialize};

use super::{default_true, normalize_province};
use crate::models::{BatchItem, BatchSummary, MatchOutcome, MatchRow};
use crate::{ApiResult, AppState};

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub full_name: String,
    pub province: String,
    #[serde(default = "default_true")]
    pub use_history: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MatchResponse {
    /// "matched", "no_match" or a failure code
    pub status: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub items: Vec<BatchItem>,
    #[serde(default = "default_true")]
    pub use_history: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchMatchResponse {
    /// Reference for feedback on this batch
    pub batch_id: String,
    pub results: Vec<MatchOutcome>,
    pub rows: Vec<MatchRow>,
    pub summary: BatchSummary,
}

/// POST /api/match
pub async fn match_one(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> ApiResult<Json<MatchResponse>> {
    let province = normalize_province(&request.province);

    let outcome = match state
        .matcher
        .match_one(&request.full_name, &province, None, request.use_history)
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            state.record_error(format!("match failed: {}", e)).await;
            return Err(e.into());
        }
    };

    Ok(Json(MatchResponse {
        status: outcome.status().to_string(),
        outcome,
    }))
}

/// POST /api/match/batch
pub async fn match_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchMatchRequest>,
) -> ApiResult<Json<BatchMatchResponse>> {
    let items: Vec<BatchItem> = request
        .items
        .into_iter()
        .map(|item| BatchItem {
            province: item.province.as_deref().map(normalize_province),
            ..item
        })
        .collect();

    let results = match state.matcher.batch_match(&items, request.use_history).await {
        Ok(results) => results,
        Err(e) => {
            state.record_error(format!("batch match failed: {}", e)).await;
            return Err(e.into());
        }
    };

    Ok(Json(BatchMatchResponse {
        batch_id: uuid::Uuid::new_v4().to_string(),
        rows: results.iter().map(MatchRow::from).collect(),
        summary: BatchSummary::from_outcomes(&results),
        results,
    }))
}

pub fn match_routes() -> Router<AppState> {
    Router::new()
        .route("/api/match", post(match_one))
        .route("/api/match/batch", post(match_batch))
}
