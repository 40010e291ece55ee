//! pcm-matcher library interface
//!
//! Maps pharmacy-chain full names to province-scoped abbreviations. Exposes
//! the services, the HTTP router and the state they share, for the binary
//! and for integration tests.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use pcm_common::config::TomlConfig;
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use crate::services::{
    CandidateLibrary, ConfirmedMappingIndex, FeedbackStore, MappingSettings, MatchValidator,
    Matcher, MatcherSettings, Resolver,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool
    pub db: SqlitePool,
    pub library: Arc<CandidateLibrary>,
    pub mappings: Arc<ConfirmedMappingIndex>,
    pub validator: Arc<MatchValidator>,
    pub matcher: Arc<Matcher>,
    pub feedback: Arc<FeedbackStore>,
    /// Loaded configuration; resolver settings are reused when the API key changes
    pub config: Arc<TomlConfig>,
    /// TOML file that settings are synced back to
    pub config_path: PathBuf,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
    /// Last error for diagnostic purposes
    pub last_error: Arc<RwLock<Option<String>>>,
}

impl AppState {
    /// Wire every component over one pool
    ///
    /// The matcher and the feedback store share one [`ConfirmedMappingIndex`]
    /// so feedback invalidation is visible to matching immediately.
    pub fn new(
        db: SqlitePool,
        config: TomlConfig,
        config_path: PathBuf,
        resolver: Option<Arc<dyn Resolver>>,
    ) -> Self {
        let library = Arc::new(CandidateLibrary::new(db.clone()));
        let mappings = Arc::new(ConfirmedMappingIndex::new(
            db.clone(),
            MappingSettings::from(&config.matching),
        ));
        let validator = Arc::new(MatchValidator::new(
            Arc::clone(&library),
            config.validation.clone(),
        ));
        let matcher = Arc::new(Matcher::new(
            db.clone(),
            Arc::clone(&library),
            Arc::clone(&mappings),
            Arc::clone(&validator),
            resolver,
            MatcherSettings::from(&config.matching),
        ));
        let feedback = Arc::new(FeedbackStore::new(db.clone(), Arc::clone(&mappings)));

        Self {
            db,
            library,
            mappings,
            validator,
            matcher,
            feedback,
            config: Arc::new(config),
            config_path,
            startup_time: Utc::now(),
            last_error: Arc::new(RwLock::new(None)),
        }
    }

    /// Remember an error for `/health`
    pub async fn record_error(&self, message: impl Into<String>) {
        *self.last_error.write().await = Some(message.into());
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::match_routes())
        .merge(api::feedback_routes())
        .merge(api::stats_routes())
        .merge(api::cache_routes())
        .merge(api::review_routes())
        .merge(api::settings_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
