//! Feedback event persistence
//!
//! `user_feedback` is append-only. Confirmed mappings are derived from it by
//! aggregation; nothing here updates or deletes rows.

use chrono::{DateTime, Utc};
use pcm_common::time::{now, parse_db_timestamp, to_db_timestamp};
use pcm_common::{Error, Result};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqlitePool};
use std::str::FromStr;

use crate::models::{ConfidenceTier, FeedbackEvent, NewFeedback, UserChoice};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Accepted (full name, final label) pair with its agreement count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmedGroup {
    pub full_name: String,
    pub label: String,
    pub count: u32,
    pub last_confirmed_at: DateTime<Utc>,
}

/// Acceptance rate of one province
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvinceAcceptance {
    pub province: String,
    pub total: u32,
    pub accepted: u32,
    /// Percentage, two decimals
    pub acceptance_rate: f64,
}

fn row_to_event(row: &SqliteRow) -> Result<FeedbackEvent> {
    let choice: String = row.try_get("user_choice")?;
    let confidence: Option<String> = row.try_get("confidence_level")?;
    let created_at: String = row.try_get("created_at")?;
    let candidate_count: i64 = row.try_get("candidate_count")?;

    Ok(FeedbackEvent {
        id: row.try_get("id")?,
        province: row.try_get("province")?,
        full_name: row.try_get("full_name")?,
        recommended_label: row.try_get("recommended_abbreviation")?,
        user_choice: UserChoice::from_str(&choice)?,
        final_label: row.try_get("final_abbreviation")?,
        confidence: confidence.as_deref().map(ConfidenceTier::parse_lenient),
        candidate_count: u32::try_from(candidate_count).unwrap_or(0),
        batch_id: row.try_get("batch_id")?,
        session_id: row.try_get("session_id")?,
        created_at: parse_db_timestamp(&created_at)?,
    })
}

async fn insert_feedback<'e, E>(executor: E, feedback: &NewFeedback, created_at: &str) -> Result<i64>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let final_label = feedback
        .final_label
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    let result = sqlx::query(
        r#"
        INSERT INTO user_feedback (
            province, full_name, recommended_abbreviation, user_choice,
            final_abbreviation, confidence_level, candidate_count,
            batch_id, session_id, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(feedback.province.trim())
    .bind(feedback.full_name.trim())
    .bind(&feedback.recommended_label)
    .bind(feedback.user_choice.as_str())
    .bind(final_label)
    .bind(feedback.confidence.map(|c| c.as_str()))
    .bind(i64::from(feedback.candidate_count))
    .bind(&feedback.batch_id)
    .bind(&feedback.session_id)
    .bind(created_at)
    .execute(executor)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Append one feedback event; returns the new row id
///
/// The event is checked with [`NewFeedback::validate`] before anything is
/// written.
pub async fn append_feedback(pool: &SqlitePool, feedback: &NewFeedback) -> Result<i64> {
    feedback.validate()?;

    let created_at = to_db_timestamp(&feedback.created_at.unwrap_or_else(now));

    let id = retry_on_lock("feedback append", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        insert_feedback(pool, feedback, &created_at).await
    })
    .await?;

    tracing::debug!(
        id,
        province = %feedback.province,
        choice = %feedback.user_choice,
        "Feedback appended"
    );

    Ok(id)
}

/// Append several events in one transaction; returns their ids in order
///
/// Either every row is committed or none is. All events are validated
/// before the transaction opens.
pub async fn append_feedback_batch(pool: &SqlitePool, events: &[NewFeedback]) -> Result<Vec<i64>> {
    for event in events {
        event.validate()?;
    }

    let stamped: Vec<(&NewFeedback, String)> = events
        .iter()
        .map(|event| (event, to_db_timestamp(&event.created_at.unwrap_or_else(now))))
        .collect();

    let ids = retry_on_lock("feedback batch append", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let mut tx = pool.begin().await?;
        let mut ids = Vec::with_capacity(stamped.len());
        for (event, created_at) in &stamped {
            ids.push(insert_feedback(&mut *tx, event, created_at).await?);
        }
        tx.commit().await?;
        Ok(ids)
    })
    .await?;

    tracing::debug!(count = ids.len(), "Feedback batch appended");

    Ok(ids)
}

/// Events newer than `days`, newest first, optionally for one province
pub async fn recent_feedback(
    pool: &SqlitePool,
    province: Option<&str>,
    days: u32,
) -> Result<Vec<FeedbackEvent>> {
    let cutoff = to_db_timestamp(&pcm_common::time::cutoff_days_ago(days));

    let rows = match province {
        Some(province) => {
            sqlx::query(
                "SELECT * FROM user_feedback WHERE province = ? AND created_at >= ? ORDER BY created_at DESC, id DESC",
            )
            .bind(province)
            .bind(&cutoff)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query("SELECT * FROM user_feedback WHERE created_at >= ? ORDER BY created_at DESC, id DESC")
                .bind(&cutoff)
                .fetch_all(pool)
                .await?
        }
    };

    rows.iter().map(row_to_event).collect()
}

/// Accepted (full name, final label) groups of a province inside the window
///
/// Only `accept` events with a final label count. Groups below `min_count`
/// are dropped. Picking one label per full name is left to the caller.
pub async fn confirmed_groups(
    pool: &SqlitePool,
    province: &str,
    min_count: u32,
    cutoff: DateTime<Utc>,
) -> Result<Vec<ConfirmedGroup>> {
    let rows = sqlx::query(
        r#"
        SELECT full_name, final_abbreviation, COUNT(*) AS confirmations, MAX(created_at) AS last_confirmed
        FROM user_feedback
        WHERE province = ?
          AND user_choice = 'accept'
          AND final_abbreviation IS NOT NULL
          AND final_abbreviation != ''
          AND created_at >= ?
        GROUP BY full_name, final_abbreviation
        HAVING COUNT(*) >= ?
        "#,
    )
    .bind(province)
    .bind(to_db_timestamp(&cutoff))
    .bind(i64::from(min_count))
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let count: i64 = row.try_get("confirmations")?;
            let last: String = row.try_get("last_confirmed")?;
            Ok(ConfirmedGroup {
                full_name: row.try_get("full_name")?,
                label: row.try_get("final_abbreviation")?,
                count: u32::try_from(count)
                    .map_err(|_| Error::Internal(format!("Confirmation count out of range: {}", count)))?,
                last_confirmed_at: parse_db_timestamp(&last)?,
            })
        })
        .collect()
}

/// Acceptance rate per province inside the window, busiest province first
pub async fn acceptance_rates(pool: &SqlitePool, days: u32) -> Result<Vec<ProvinceAcceptance>> {
    let cutoff = to_db_timestamp(&pcm_common::time::cutoff_days_ago(days));

    let rows = sqlx::query(
        r#"
        SELECT province,
               COUNT(*) AS total,
               SUM(CASE WHEN user_choice = 'accept' THEN 1 ELSE 0 END) AS accepted
        FROM user_feedback
        WHERE created_at >= ?
        GROUP BY province
        ORDER BY total DESC, province
        "#,
    )
    .bind(&cutoff)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            let total: i64 = row.try_get("total")?;
            let accepted: i64 = row.try_get("accepted")?;
            let total = u32::try_from(total).unwrap_or(u32::MAX);
            let accepted = u32::try_from(accepted).unwrap_or(0);
            Ok(ProvinceAcceptance {
                province: row.try_get("province")?,
                total,
                accepted,
                acceptance_rate: crate::models::feedback::percentage(accepted as usize, total as usize),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use chrono::Duration;

    const FULL_NAME: &str = "上海云湖医药连锁经营有限公司";

    #[tokio::test]
    async fn test_append_rejects_invalid_event() {
        let pool = init_memory_pool().await.unwrap();
        let mut feedback = NewFeedback::accept("上海", FULL_NAME, "云湖医药");
        feedback.final_label = None;

        assert!(matches!(
            append_feedback(&pool, &feedback).await,
            Err(Error::InvalidInput(_))
        ));
        assert!(recent_feedback(&pool, None, 30).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_and_recent() {
        let pool = init_memory_pool().await.unwrap();

        let first = append_feedback(&pool, &NewFeedback::accept("上海", FULL_NAME, "云湖医药"))
            .await
            .unwrap();
        let second = append_feedback(&pool, &NewFeedback::reject("四川", "某药房", None))
            .await
            .unwrap();
        assert!(second > first);

        let all = recent_feedback(&pool, None, 30).await.unwrap();
        assert_eq!(all.len(), 2);

        let shanghai = recent_feedback(&pool, Some("上海"), 30).await.unwrap();
        assert_eq!(shanghai.len(), 1);
        assert_eq!(shanghai[0].user_choice, UserChoice::Accept);
        assert_eq!(shanghai[0].final_label.as_deref(), Some("云湖医药"));
    }

    #[tokio::test]
    async fn test_confirmed_groups_counts_accepts_only() {
        let pool = init_memory_pool().await.unwrap();

        for _ in 0..3 {
            append_feedback(&pool, &NewFeedback::accept("上海", FULL_NAME, "云湖医药"))
                .await
                .unwrap();
        }
        append_feedback(
            &pool,
            &NewFeedback::modify("上海", FULL_NAME, Some("云湖医药".to_string()), "云湖"),
        )
        .await
        .unwrap();
        append_feedback(&pool, &NewFeedback::accept("四川", FULL_NAME, "云湖医药"))
            .await
            .unwrap();

        let groups = confirmed_groups(&pool, "上海", 1, pcm_common::time::cutoff_days_ago(30))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].label, "云湖医药");
        assert_eq!(groups[0].count, 3);

        let strict = confirmed_groups(&pool, "上海", 4, pcm_common::time::cutoff_days_ago(30))
            .await
            .unwrap();
        assert!(strict.is_empty());
    }

    #[tokio::test]
    async fn test_confirmed_groups_respects_window() {
        let pool = init_memory_pool().await.unwrap();
        let old = Utc::now() - Duration::days(45);

        for _ in 0..3 {
            append_feedback(&pool, &NewFeedback::accept("上海", FULL_NAME, "云湖医药").at(old))
                .await
                .unwrap();
        }

        let groups = confirmed_groups(&pool, "上海", 3, pcm_common::time::cutoff_days_ago(30))
            .await
            .unwrap();
        assert!(groups.is_empty());

        let groups = confirmed_groups(&pool, "上海", 3, pcm_common::time::cutoff_days_ago(60))
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].last_confirmed_at.timestamp(), old.timestamp());
    }

    #[tokio::test]
    async fn test_acceptance_rates() {
        let pool = init_memory_pool().await.unwrap();

        append_feedback(&pool, &NewFeedback::accept("上海", FULL_NAME, "云湖医药")).await.unwrap();
        append_feedback(&pool, &NewFeedback::accept("上海", FULL_NAME, "云湖医药")).await.unwrap();
        append_feedback(&pool, &NewFeedback::reject("上海", FULL_NAME, None)).await.unwrap();
        append_feedback(&pool, &NewFeedback::reject("四川", "某药房", None)).await.unwrap();

        let rates = acceptance_rates(&pool, 30).await.unwrap();
        assert_eq!(rates.len(), 2);
        assert_eq!(rates[0].province, "上海");
        assert_eq!(rates[0].total, 3);
        assert_eq!(rates[0].accepted, 2);
        assert_eq!(rates[0].acceptance_rate, 66.67);
        assert_eq!(rates[1].acceptance_rate, 0.0);
    }
}
