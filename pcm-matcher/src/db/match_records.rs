//! Match attempt audit log

use pcm_common::time::{cutoff_days_ago, to_db_timestamp};
use pcm_common::Result;
use sqlx::{Row, SqlitePool};

use crate::models::{MatchAttempt, MatchStatistics};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Append one attempt; returns the new row id
pub async fn append_attempt(pool: &SqlitePool, attempt: &MatchAttempt) -> Result<i64> {
    let created_at = to_db_timestamp(&attempt.created_at);
    let validation_passed = attempt.validation.passed();
    let validation_notes = attempt.validation.notes();

    retry_on_lock("match attempt append", DEFAULT_MAX_LOCK_WAIT_MS, || async {
        let result = sqlx::query(
            r#"
            INSERT INTO match_records (
                province, full_name, proposed_abbreviation, matched_abbreviation,
                match_method, confidence_level, validation_passed, validation_notes,
                failure_code, reasoning, llm_model, llm_prompt_tokens,
                llm_completion_tokens, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&attempt.province)
        .bind(&attempt.full_name)
        .bind(&attempt.proposed_label)
        .bind(&attempt.matched_label)
        .bind(attempt.method.as_str())
        .bind(attempt.confidence.as_str())
        .bind(validation_passed)
        .bind(&validation_notes)
        .bind(&attempt.failure_code)
        .bind(&attempt.rationale)
        .bind(&attempt.resolver_model)
        .bind(attempt.prompt_tokens.map(i64::from))
        .bind(attempt.completion_tokens.map(i64::from))
        .bind(&created_at)
        .execute(pool)
        .await?;

        Ok(result.last_insert_rowid())
    })
    .await
}

/// Aggregate counts inside the window, optionally for one province
pub async fn statistics(
    pool: &SqlitePool,
    province: Option<&str>,
    days: u32,
) -> Result<MatchStatistics> {
    let cutoff = to_db_timestamp(&cutoff_days_ago(days));

    // Province filter is optional; `? IS NULL` keeps one statement
    let totals = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(CASE WHEN matched_abbreviation IS NOT NULL AND matched_abbreviation != '' THEN 1 ELSE 0 END), 0) AS matched,
               COALESCE(SUM(CASE WHEN validation_passed = 1 THEN 1 ELSE 0 END), 0) AS passed
        FROM match_records
        WHERE created_at >= ? AND (? IS NULL OR province = ?)
        "#,
    )
    .bind(&cutoff)
    .bind(province)
    .bind(province)
    .fetch_one(pool)
    .await?;

    let total: i64 = totals.try_get("total")?;
    let matched: i64 = totals.try_get("matched")?;
    let passed: i64 = totals.try_get("passed")?;

    let mut stats = MatchStatistics {
        total_matches: total as usize,
        matched: matched as usize,
        empty: (total - matched) as usize,
        validation_passed: passed as usize,
        ..Default::default()
    };

    for (column, target) in [
        ("match_method", &mut stats.by_method),
        ("confidence_level", &mut stats.by_confidence),
    ] {
        let sql = format!(
            "SELECT {column} AS bucket, COUNT(*) AS n FROM match_records \
             WHERE created_at >= ? AND (? IS NULL OR province = ?) AND {column} IS NOT NULL \
             GROUP BY {column}"
        );
        let rows = sqlx::query(&sql)
            .bind(&cutoff)
            .bind(province)
            .bind(province)
            .fetch_all(pool)
            .await?;

        for row in rows {
            let bucket: String = row.try_get("bucket")?;
            let n: i64 = row.try_get("n")?;
            target.insert(bucket, n as usize);
        }
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory_pool;
    use crate::models::{
        ConfidenceTier, MatchFailure, MatchMethod, MatchOutcome, ValidationOutcome,
    };

    fn matched(province: &str, label: &str, method: MatchMethod) -> MatchAttempt {
        let outcome = MatchOutcome {
            full_name: "成都某某大药房连锁有限公司".to_string(),
            province: province.to_string(),
            label: Some(label.to_string()),
            confidence: ConfidenceTier::High,
            method,
            rationale: None,
            failure: None,
            warnings: vec![],
        };
        MatchAttempt::from_outcome(&outcome, Some(label.to_string()), ValidationOutcome::Passed)
    }

    #[tokio::test]
    async fn test_append_and_statistics() {
        let pool = init_memory_pool().await.unwrap();

        append_attempt(&pool, &matched("四川", "老百姓大药房", MatchMethod::Resolver))
            .await
            .unwrap();
        append_attempt(&pool, &matched("四川", "老百姓大药房", MatchMethod::Memo))
            .await
            .unwrap();

        let rejected = MatchOutcome::failed(
            "某药房",
            "四川",
            MatchMethod::Resolver,
            MatchFailure::ValidationViolation(vec!["fabricated".to_string()]),
        );
        append_attempt(
            &pool,
            &MatchAttempt::from_outcome(
                &rejected,
                Some("编造药房".to_string()),
                ValidationOutcome::Failed(vec!["fabricated".to_string()]),
            ),
        )
        .await
        .unwrap();

        append_attempt(&pool, &matched("广东", "海王星辰", MatchMethod::Resolver))
            .await
            .unwrap();

        let stats = statistics(&pool, Some("四川"), 30).await.unwrap();
        assert_eq!(stats.total_matches, 3);
        assert_eq!(stats.matched, 2);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.validation_passed, 2);
        assert_eq!(stats.by_method.get("llm"), Some(&2));
        assert_eq!(stats.by_method.get("memo"), Some(&1));
        assert_eq!(stats.by_confidence.get("Low"), Some(&1));

        let all = statistics(&pool, None, 30).await.unwrap();
        assert_eq!(all.total_matches, 4);
    }

    #[tokio::test]
    async fn test_statistics_empty_log() {
        let pool = init_memory_pool().await.unwrap();
        let stats = statistics(&pool, None, 7).await.unwrap();
        assert_eq!(stats, MatchStatistics::default());
    }
}
