//! Database access for pcm-matcher
//!
//! SQLite through `sqlx`. Tables are created at startup with
//! `CREATE TABLE IF NOT EXISTS`; there is no migration engine.

pub mod candidates;
pub mod feedback;
pub mod match_records;
pub mod settings;

use pcm_common::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::path::Path;

/// Initialize database connection pool
///
/// Creates the parent directory and the database file when missing.
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    // Use proper SQLite URI with mode=rwc (read, write, create)
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    tracing::debug!("Connecting to database: {}", db_url);

    let pool = SqlitePool::connect(&db_url).await?;

    init_tables(&pool).await?;

    Ok(pool)
}

/// In-memory database with the full schema
///
/// Single connection: every `:memory:` connection is a separate database.
pub async fn init_memory_pool() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;

    init_tables(&pool).await?;

    Ok(pool)
}

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS settings (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS chain_abbreviations (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        abbreviation TEXT NOT NULL,
        province TEXT NOT NULL,
        full_name TEXT,
        confidence_level TEXT NOT NULL DEFAULT 'Low',
        confidence_score REAL,
        is_validated INTEGER NOT NULL DEFAULT 0,
        needs_review INTEGER NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (province, abbreviation)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_abbreviation ON chain_abbreviations (abbreviation)",
    "CREATE INDEX IF NOT EXISTS idx_province_validated ON chain_abbreviations (province, is_validated)",
    r#"
    CREATE TABLE IF NOT EXISTS user_feedback (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        province TEXT NOT NULL,
        full_name TEXT NOT NULL,
        recommended_abbreviation TEXT,
        user_choice TEXT NOT NULL,
        final_abbreviation TEXT,
        confidence_level TEXT,
        candidate_count INTEGER NOT NULL DEFAULT 0,
        batch_id TEXT,
        session_id TEXT,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_feedback_province_choice ON user_feedback (province, user_choice, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_feedback_province_fullname ON user_feedback (province, full_name)",
    r#"
    CREATE TABLE IF NOT EXISTS match_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        province TEXT NOT NULL,
        full_name TEXT NOT NULL,
        proposed_abbreviation TEXT,
        matched_abbreviation TEXT,
        match_method TEXT NOT NULL,
        confidence_level TEXT,
        validation_passed INTEGER,
        validation_notes TEXT,
        failure_code TEXT,
        reasoning TEXT,
        llm_model TEXT,
        llm_prompt_tokens INTEGER,
        llm_completion_tokens INTEGER,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_match_province ON match_records (province, created_at)",
    "CREATE INDEX IF NOT EXISTS idx_match_method ON match_records (match_method)",
];

/// Create pcm-matcher tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!("Database tables initialized (settings, chain_abbreviations, user_feedback, match_records)");

    Ok(())
}
