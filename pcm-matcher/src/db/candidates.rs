//! Candidate label persistence
//!
//! Province-scoped CRUD over `chain_abbreviations`. The matching core only
//! reads validated labels; writes belong to the curation process.

use pcm_common::time::{now, parse_db_timestamp, to_db_timestamp};
use pcm_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use crate::models::{CandidateLabel, CandidateUpdate, ConfidenceTier, NewCandidate};

const SELECT_COLUMNS: &str = "SELECT id, abbreviation, province, full_name, confidence_level, \
     confidence_score, is_validated, needs_review, created_at, updated_at \
     FROM chain_abbreviations";

fn row_to_candidate(row: &SqliteRow) -> Result<CandidateLabel> {
    let confidence: String = row.try_get("confidence_level")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(CandidateLabel {
        id: row.try_get("id")?,
        label: row.try_get("abbreviation")?,
        province: row.try_get("province")?,
        full_name: row.try_get("full_name")?,
        confidence_level: ConfidenceTier::parse_lenient(&confidence),
        confidence_score: row.try_get("confidence_score")?,
        validated: row.try_get("is_validated")?,
        needs_review: row.try_get("needs_review")?,
        created_at: parse_db_timestamp(&created_at)?,
        updated_at: parse_db_timestamp(&updated_at)?,
    })
}

/// Insert a candidate, or update the existing (province, label) record
pub async fn add_candidate(pool: &SqlitePool, candidate: &NewCandidate) -> Result<CandidateLabel> {
    let label = candidate.label.trim();
    let province = candidate.province.trim();
    if label.is_empty() || province.is_empty() {
        return Err(Error::InvalidInput(
            "Candidate label and province are required".to_string(),
        ));
    }

    let ts = to_db_timestamp(&now());

    sqlx::query(
        r#"
        INSERT INTO chain_abbreviations (
            abbreviation, province, full_name, confidence_level, confidence_score,
            is_validated, needs_review, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(province, abbreviation) DO UPDATE SET
            full_name = COALESCE(excluded.full_name, full_name),
            confidence_level = excluded.confidence_level,
            confidence_score = excluded.confidence_score,
            is_validated = excluded.is_validated,
            needs_review = excluded.needs_review,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(label)
    .bind(province)
    .bind(&candidate.full_name)
    .bind(candidate.confidence_level.as_str())
    .bind(candidate.confidence_score)
    .bind(candidate.validated)
    .bind(candidate.needs_review)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await?;

    tracing::debug!(label, province, validated = candidate.validated, "Candidate saved");

    get_candidate(pool, label, province)
        .await?
        .ok_or_else(|| Error::Internal(format!("Candidate '{}' ({}) vanished after insert", label, province)))
}

/// Add many candidates; failures are logged and skipped
pub async fn bulk_add_candidates(pool: &SqlitePool, candidates: &[NewCandidate]) -> Result<usize> {
    let mut added = 0;
    for candidate in candidates {
        match add_candidate(pool, candidate).await {
            Ok(_) => added += 1,
            Err(Error::InvalidInput(msg)) => {
                tracing::warn!(label = %candidate.label, province = %candidate.province, "Skipping candidate: {}", msg);
            }
            Err(e) => return Err(e),
        }
    }

    tracing::info!("Bulk candidate import: {}/{}", added, candidates.len());
    Ok(added)
}

/// Load one candidate by (label, province)
pub async fn get_candidate(
    pool: &SqlitePool,
    label: &str,
    province: &str,
) -> Result<Option<CandidateLabel>> {
    let row = sqlx::query(&format!("{} WHERE abbreviation = ? AND province = ?", SELECT_COLUMNS))
        .bind(label)
        .bind(province)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_candidate).transpose()
}

/// Apply a partial update; returns `None` when the candidate does not exist
pub async fn update_candidate(
    pool: &SqlitePool,
    label: &str,
    province: &str,
    update: &CandidateUpdate,
) -> Result<Option<CandidateLabel>> {
    let result = sqlx::query(
        r#"
        UPDATE chain_abbreviations SET
            full_name = COALESCE(?, full_name),
            confidence_level = COALESCE(?, confidence_level),
            confidence_score = COALESCE(?, confidence_score),
            is_validated = COALESCE(?, is_validated),
            needs_review = COALESCE(?, needs_review),
            updated_at = ?
        WHERE abbreviation = ? AND province = ?
        "#,
    )
    .bind(&update.full_name)
    .bind(update.confidence_level.map(|c| c.as_str()))
    .bind(update.confidence_score)
    .bind(update.validated)
    .bind(update.needs_review)
    .bind(to_db_timestamp(&now()))
    .bind(label)
    .bind(province)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        tracing::warn!(label, province, "Candidate to update does not exist");
        return Ok(None);
    }

    get_candidate(pool, label, province).await
}

/// Delete a candidate; returns whether a row was removed
pub async fn delete_candidate(pool: &SqlitePool, label: &str, province: &str) -> Result<bool> {
    let result = sqlx::query("DELETE FROM chain_abbreviations WHERE abbreviation = ? AND province = ?")
        .bind(label)
        .bind(province)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// All candidates of one province
pub async fn list_by_province(
    pool: &SqlitePool,
    province: &str,
    validated_only: bool,
) -> Result<Vec<CandidateLabel>> {
    let sql = if validated_only {
        format!("{} WHERE province = ? AND is_validated = 1 ORDER BY abbreviation", SELECT_COLUMNS)
    } else {
        format!("{} WHERE province = ? ORDER BY abbreviation", SELECT_COLUMNS)
    };

    let rows = sqlx::query(&sql).bind(province).fetch_all(pool).await?;
    rows.iter().map(row_to_candidate).collect()
}

/// Validated label strings of one province (the matcher's vocabulary)
pub async fn list_validated_labels(pool: &SqlitePool, province: &str) -> Result<Vec<String>> {
    let labels = sqlx::query_scalar::<_, String>(
        "SELECT abbreviation FROM chain_abbreviations WHERE province = ? AND is_validated = 1 ORDER BY abbreviation",
    )
    .bind(province)
    .fetch_all(pool)
    .await?;

    Ok(labels)
}

/// Every candidate across provinces
pub async fn list_all(pool: &SqlitePool, validated_only: bool) -> Result<Vec<CandidateLabel>> {
    let sql = if validated_only {
        format!("{} WHERE is_validated = 1 ORDER BY province, abbreviation", SELECT_COLUMNS)
    } else {
        format!("{} ORDER BY province, abbreviation", SELECT_COLUMNS)
    };

    let rows = sqlx::query(&sql).fetch_all(pool).await?;
    rows.iter().map(row_to_candidate).collect()
}

/// Low-confidence candidates flagged for manual review, lowest score first
pub async fn list_needs_review(
    pool: &SqlitePool,
    threshold_score: f64,
    limit: u32,
) -> Result<Vec<CandidateLabel>> {
    let rows = sqlx::query(&format!(
        "{} WHERE needs_review = 1 AND confidence_score < ? ORDER BY confidence_score ASC LIMIT ?",
        SELECT_COLUMNS
    ))
    .bind(threshold_score)
    .bind(i64::from(limit))
    .fetch_all(pool)
    .await?;

    rows.iter().map(row_to_candidate).collect()
}
