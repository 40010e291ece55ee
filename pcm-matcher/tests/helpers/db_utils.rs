//! Database Test Utilities

use anyhow::Result;
use pcm_common::config::TomlConfig;
use pcm_matcher::models::{NewCandidate, NewFeedback};
use pcm_matcher::services::Resolver;
use pcm_matcher::AppState;
use sqlx::SqlitePool;
use std::sync::Arc;
use tempfile::TempDir;

/// Create temporary file-backed test database with the schema applied
///
/// Returns (TempDir, SqlitePool) - TempDir must be kept alive for duration of test
pub async fn create_test_db() -> Result<(TempDir, SqlitePool)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test_pcm.db");

    let pool = pcm_matcher::db::init_database_pool(&db_path).await?;

    Ok((temp_dir, pool))
}

/// Insert validated candidates given as (label, province)
pub async fn seed_candidates(pool: &SqlitePool, rows: &[(&str, &str)]) -> Result<()> {
    for (label, province) in rows {
        pcm_matcher::db::candidates::add_candidate(pool, &NewCandidate::validated(*label, *province))
            .await?;
    }
    Ok(())
}

/// Append `times` accept events for (province, full name) → label
pub async fn seed_accepts(
    pool: &SqlitePool,
    province: &str,
    full_name: &str,
    label: &str,
    times: usize,
) -> Result<()> {
    for _ in 0..times {
        pcm_matcher::db::feedback::append_feedback(pool, &NewFeedback::accept(province, full_name, label))
            .await?;
    }
    Ok(())
}

/// Row count of a table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .unwrap()
}

/// Application state over `pool` with default configuration
pub fn build_state(
    pool: SqlitePool,
    temp_dir: &TempDir,
    resolver: Option<Arc<dyn Resolver>>,
) -> AppState {
    build_state_with(pool, temp_dir, resolver, TomlConfig::default())
}

pub fn build_state_with(
    pool: SqlitePool,
    temp_dir: &TempDir,
    resolver: Option<Arc<dyn Resolver>>,
    config: TomlConfig,
) -> AppState {
    AppState::new(
        pool,
        config,
        temp_dir.path().join("pcm-matcher.toml"),
        resolver,
    )
}
