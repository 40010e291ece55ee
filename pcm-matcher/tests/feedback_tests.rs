//! Feedback store tests
//!
//! Recording, batch atomicity, the retention window and how confirmations
//! turn into confirmed mappings.

mod helpers;

use chrono::{Duration, Utc};
use helpers::{build_state, count_rows, create_test_db, seed_accepts, seed_candidates};
use pcm_matcher::models::{ConfidenceTier, NewFeedback, UserChoice};

const YUNHU: &str = "上海云湖医药连锁经营有限公司";

#[tokio::test]
async fn test_record_and_summarize() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool.clone(), &temp_dir, None);

    state
        .feedback
        .record(&NewFeedback::accept("上海", YUNHU, "云湖医药"))
        .await
        .unwrap();
    state
        .feedback
        .record(&NewFeedback::reject("上海", YUNHU, Some("益丰大药房".to_string())))
        .await
        .unwrap();
    state
        .feedback
        .record(&NewFeedback::modify(
            "四川",
            "老百姓大药房连锁股份有限公司成都分公司",
            Some("九州通好药师".to_string()),
            "老百姓大药房",
        ))
        .await
        .unwrap();

    let all = state.feedback.summary(None, 30).await.unwrap();
    assert_eq!(all.total, 3);
    assert_eq!(all.accepted, 1);
    assert_eq!(all.rejected, 1);
    assert_eq!(all.modified, 1);
    assert_eq!(all.acceptance_rate, 33.33);

    let shanghai = state.feedback.summary(Some("上海"), 30).await.unwrap();
    assert_eq!(shanghai.total, 2);
    assert_eq!(shanghai.acceptance_rate, 50.0);

    let rates = state.feedback.acceptance_rates(30).await.unwrap();
    assert_eq!(rates.len(), 2);
    assert_eq!(rates[0].province, "上海");
    assert_eq!(rates[0].total, 2);
    assert_eq!(rates[0].accepted, 1);
    assert_eq!(rates[1].province, "四川");
    assert_eq!(rates[1].acceptance_rate, 0.0);
}

#[tokio::test]
async fn test_invalid_feedback_is_rejected() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool.clone(), &temp_dir, None);

    let mut accept_without_label = NewFeedback::accept("上海", YUNHU, "云湖医药");
    accept_without_label.final_label = None;
    let result = state.feedback.record(&accept_without_label).await;
    assert!(matches!(result, Err(pcm_common::Error::InvalidInput(_))));

    let mut empty_with_label = NewFeedback::accept("上海", YUNHU, "云湖医药");
    empty_with_label.user_choice = UserChoice::Empty;
    let result = state.feedback.record(&empty_with_label).await;
    assert!(matches!(result, Err(pcm_common::Error::InvalidInput(_))));

    assert_eq!(count_rows(&pool, "user_feedback").await, 0);
}

#[tokio::test]
async fn test_batch_with_bad_row_writes_nothing() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool.clone(), &temp_dir, None);

    let mut bad = NewFeedback::accept("上海", YUNHU, "云湖医药");
    bad.final_label = None;

    let events = vec![
        NewFeedback::accept("上海", YUNHU, "云湖医药").in_batch("batch-1"),
        bad,
    ];
    assert!(state.feedback.record_batch(&events).await.is_err());
    assert_eq!(count_rows(&pool, "user_feedback").await, 0);

    let ids = state
        .feedback
        .record_batch(&events[..1])
        .await
        .unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(count_rows(&pool, "user_feedback").await, 1);
}

#[tokio::test]
async fn test_batch_rejected_by_database_rolls_back() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool.clone(), &temp_dir, None);

    seed_accepts(&pool, "上海", YUNHU, "云湖医药", 2).await.unwrap();
    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_none());

    // Written behind the store's back, so the cached table is stale
    pcm_matcher::db::feedback::append_feedback(&pool, &NewFeedback::accept("上海", YUNHU, "云湖医药"))
        .await
        .unwrap();
    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_none());

    sqlx::query(
        "CREATE TRIGGER refuse_row BEFORE INSERT ON user_feedback \
         WHEN NEW.full_name = '坏数据公司' BEGIN SELECT RAISE(ABORT, 'refused'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let events = vec![
        NewFeedback::accept("上海", YUNHU, "云湖医药"),
        NewFeedback::accept("广东", "坏数据公司", "坏数据"),
    ];
    assert!(state.feedback.record_batch(&events).await.is_err());
    assert_eq!(count_rows(&pool, "user_feedback").await, 3);

    // The failed batch still dropped the cached table of every province it touched
    let mapping = state.mappings.lookup("上海", YUNHU).await.unwrap().unwrap();
    assert_eq!(mapping.confirmation_count, 3);

    sqlx::query("DROP TRIGGER refuse_row").execute(&pool).await.unwrap();
    let ids = state.feedback.record_batch(&events).await.unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1]);
    assert_eq!(count_rows(&pool, "user_feedback").await, 5);

    let mapping = state.mappings.lookup("上海", YUNHU).await.unwrap().unwrap();
    assert_eq!(mapping.confirmation_count, 4);
}

#[tokio::test]
async fn test_confirmation_threshold_and_tiers() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool, &temp_dir, None);

    let accept = NewFeedback::accept("上海", YUNHU, "云湖医药");
    let events = vec![accept.clone(), accept.clone()];
    state.feedback.record_batch(&events).await.unwrap();
    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_none());

    state.feedback.record(&accept).await.unwrap();
    let mapping = state.mappings.lookup("上海", YUNHU).await.unwrap().unwrap();
    assert_eq!(mapping.label, "云湖医药");
    assert_eq!(mapping.confirmation_count, 3);
    assert_eq!(mapping.confidence, ConfidenceTier::Medium);
    assert!(!state.feedback.is_high_confidence("上海", YUNHU).await.unwrap());

    state
        .feedback
        .record_batch(&[accept.clone(), accept.clone()])
        .await
        .unwrap();
    let mapping = state.mappings.lookup("上海", YUNHU).await.unwrap().unwrap();
    assert_eq!(mapping.confirmation_count, 5);
    assert_eq!(mapping.confidence, ConfidenceTier::High);
    assert!(state.feedback.is_high_confidence("上海", YUNHU).await.unwrap());
}

#[tokio::test]
async fn test_only_accepts_count_as_confirmations() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool, &temp_dir, None);

    let modify = NewFeedback::modify("上海", YUNHU, None, "云湖医药");
    state
        .feedback
        .record_batch(&[modify.clone(), modify.clone(), modify])
        .await
        .unwrap();

    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_none());
}

#[tokio::test]
async fn test_events_outside_retention_are_ignored() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool, &temp_dir, None);

    let old = Utc::now() - Duration::days(45);
    let events: Vec<NewFeedback> = (0..3)
        .map(|_| NewFeedback::accept("上海", YUNHU, "云湖医药").at(old))
        .collect();
    state.feedback.record_batch(&events).await.unwrap();

    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_none());
    assert_eq!(state.feedback.summary(None, 30).await.unwrap().total, 0);
    assert_eq!(state.feedback.summary(None, 60).await.unwrap().total, 3);
}

#[tokio::test]
async fn test_competing_labels_highest_count_wins() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    seed_candidates(&pool, &[("云湖医药", "上海"), ("云湖大药房", "上海")])
        .await
        .unwrap();
    let state = build_state(pool, &temp_dir, None);

    let first = NewFeedback::accept("上海", YUNHU, "云湖大药房");
    let second = NewFeedback::accept("上海", YUNHU, "云湖医药");
    state
        .feedback
        .record_batch(&[
            first.clone(),
            first.clone(),
            first,
            second.clone(),
            second.clone(),
            second.clone(),
            second,
        ])
        .await
        .unwrap();

    let mapping = state.mappings.lookup("上海", YUNHU).await.unwrap().unwrap();
    assert_eq!(mapping.label, "云湖医药");
    assert_eq!(mapping.confirmation_count, 4);
}

#[tokio::test]
async fn test_feedback_is_province_scoped() {
    let (temp_dir, pool) = create_test_db().await.unwrap();
    let state = build_state(pool, &temp_dir, None);

    let accept = NewFeedback::accept("上海", YUNHU, "云湖医药");
    state
        .feedback
        .record_batch(&[accept.clone(), accept.clone(), accept])
        .await
        .unwrap();

    assert!(state.mappings.lookup("上海", YUNHU).await.unwrap().is_some());
    assert!(state.mappings.lookup("浙江", YUNHU).await.unwrap().is_none());
}
