//! Feedback write path
//!
//! Every append attempt invalidates the confirmed-mapping cache of the
//! provinces it touched, after the write has committed or rolled back.

use pcm_common::Result;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::Arc;

use super::confirmed_mappings::ConfirmedMappingIndex;
use crate::db::feedback::ProvinceAcceptance;
use crate::models::{FeedbackSummary, NewFeedback};

pub struct FeedbackStore {
    db: SqlitePool,
    mappings: Arc<ConfirmedMappingIndex>,
}

impl FeedbackStore {
    pub fn new(db: SqlitePool, mappings: Arc<ConfirmedMappingIndex>) -> Self {
        Self { db, mappings }
    }

    /// Append one event and invalidate its province
    pub async fn record(&self, feedback: &NewFeedback) -> Result<i64> {
        let result = crate::db::feedback::append_feedback(&self.db, feedback).await;
        self.mappings.invalidate(feedback.province.trim()).await;
        let id = result?;

        tracing::info!(
            id,
            province = %feedback.province,
            choice = %feedback.user_choice,
            "Feedback recorded"
        );

        Ok(id)
    }

    /// Append a batch of events
    ///
    /// The batch is written in one transaction, so a bad or rejected row
    /// leaves nothing behind. Each touched province is invalidated once,
    /// whether or not the write succeeded.
    pub async fn record_batch(&self, events: &[NewFeedback]) -> Result<Vec<i64>> {
        let provinces: BTreeSet<String> = events
            .iter()
            .map(|event| event.province.trim().to_string())
            .collect();

        let result = crate::db::feedback::append_feedback_batch(&self.db, events).await;

        for province in &provinces {
            self.mappings.invalidate(province).await;
        }

        match &result {
            Ok(ids) => {
                tracing::info!(count = ids.len(), provinces = provinces.len(), "Feedback batch recorded")
            }
            Err(e) => tracing::warn!(rows = events.len(), error = %e, "Feedback batch rejected"),
        }

        result
    }

    /// Choice counts over the last `days`
    pub async fn summary(&self, province: Option<&str>, days: u32) -> Result<FeedbackSummary> {
        let events = crate::db::feedback::recent_feedback(&self.db, province, days).await?;
        Ok(FeedbackSummary::from_events(&events))
    }

    pub async fn acceptance_rates(&self, days: u32) -> Result<Vec<ProvinceAcceptance>> {
        crate::db::feedback::acceptance_rates(&self.db, days).await
    }

    /// Whether (province, full name) currently has a High-confidence mapping
    pub async fn is_high_confidence(&self, province: &str, full_name: &str) -> Result<bool> {
        Ok(self
            .mappings
            .lookup(province, full_name)
            .await?
            .map(|m| m.confidence == crate::models::ConfidenceTier::High)
            .unwrap_or(false))
    }
}
