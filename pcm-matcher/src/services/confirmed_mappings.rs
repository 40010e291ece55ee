//! Confirmed full-name → label mappings derived from reviewer feedback
//!
//! A mapping exists for (province, full name) once enough accepted events
//! agree on the same final label inside the retention window. The derived
//! map is cached per province and dropped whenever new feedback for that
//! province is written.

use chrono::{DateTime, Utc};
use pcm_common::time::cutoff_days_ago;
use pcm_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::sync::Arc;

use super::province_cache::ProvinceCache;
use crate::db::feedback::ConfirmedGroup;
use crate::models::ConfidenceTier;

/// Confirmation count at which a mapping is High confidence
pub const HIGH_CONFIDENCE_COUNT: u32 = 5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedMapping {
    pub label: String,
    pub confirmation_count: u32,
    pub confidence: ConfidenceTier,
    pub last_confirmed_at: DateTime<Utc>,
}

/// Past decision handed to the resolver as a few-shot example
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryExample {
    pub full_name: String,
    pub label: String,
    pub count: u32,
}

pub type MappingTable = Arc<HashMap<String, ConfirmedMapping>>;

#[derive(Debug, Clone)]
pub struct MappingSettings {
    pub enabled: bool,
    pub min_confirmation_count: u32,
    pub retention_days: u32,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            min_confirmation_count: 3,
            retention_days: 30,
        }
    }
}

impl From<&pcm_common::config::MatchingConfig> for MappingSettings {
    fn from(config: &pcm_common::config::MatchingConfig) -> Self {
        Self {
            enabled: config.enable_history,
            min_confirmation_count: config.min_confirmation_count,
            retention_days: config.history_days,
        }
    }
}

fn tier_for(count: u32) -> ConfidenceTier {
    if count >= HIGH_CONFIDENCE_COUNT {
        ConfidenceTier::High
    } else {
        ConfidenceTier::Medium
    }
}

/// Pick one winning label per full name
///
/// Highest count wins; ties go to the most recent confirmation, then to the
/// lexicographically smallest label.
pub fn select_confirmed(groups: Vec<ConfirmedGroup>) -> HashMap<String, ConfirmedMapping> {
    let mut winners: HashMap<String, ConfirmedGroup> = HashMap::new();

    for group in groups {
        let replaces = match winners.get(&group.full_name) {
            Some(current) => {
                (group.count, group.last_confirmed_at, Reverse(&group.label))
                    > (current.count, current.last_confirmed_at, Reverse(&current.label))
            }
            None => true,
        };
        if replaces {
            winners.insert(group.full_name.clone(), group);
        }
    }

    winners
        .into_iter()
        .map(|(full_name, group)| {
            let mapping = ConfirmedMapping {
                confidence: tier_for(group.count),
                label: group.label,
                confirmation_count: group.count,
                last_confirmed_at: group.last_confirmed_at,
            };
            (full_name, mapping)
        })
        .collect()
}

pub struct ConfirmedMappingIndex {
    db: SqlitePool,
    settings: MappingSettings,
    cache: ProvinceCache<MappingTable>,
}

impl ConfirmedMappingIndex {
    pub fn new(db: SqlitePool, settings: MappingSettings) -> Self {
        Self {
            db,
            settings,
            cache: ProvinceCache::new(),
        }
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    /// Confirmed mappings of `province`, keyed by full name
    pub async fn mappings(&self, province: &str) -> Result<MappingTable> {
        if !self.settings.enabled {
            return Ok(Arc::new(HashMap::new()));
        }

        if let Some(table) = self.cache.get(province).await {
            return Ok(table);
        }

        let ticket = self.cache.begin_fill(province).await;
        let groups = crate::db::feedback::confirmed_groups(
            &self.db,
            province,
            self.settings.min_confirmation_count,
            cutoff_days_ago(self.settings.retention_days),
        )
        .await?;
        let table = Arc::new(select_confirmed(groups));

        let cached = self.cache.finish_fill(province, ticket, Arc::clone(&table)).await;
        tracing::info!(province, count = table.len(), cached, "Confirmed mappings loaded");

        Ok(table)
    }

    pub async fn lookup(&self, province: &str, full_name: &str) -> Result<Option<ConfirmedMapping>> {
        Ok(self.mappings(province).await?.get(full_name).cloned())
    }

    /// Up to `max` examples, most confirmed first, then by full name
    pub async fn history_examples(&self, province: &str, max: usize) -> Result<Vec<HistoryExample>> {
        let table = self.mappings(province).await?;

        let mut examples: Vec<HistoryExample> = table
            .iter()
            .map(|(full_name, mapping)| HistoryExample {
                full_name: full_name.clone(),
                label: mapping.label.clone(),
                count: mapping.confirmation_count,
            })
            .collect();
        examples.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.full_name.cmp(&b.full_name)));
        examples.truncate(max);

        Ok(examples)
    }

    pub async fn invalidate(&self, province: &str) {
        if self.cache.invalidate(province).await {
            tracing::debug!(province, "Confirmed mapping cache invalidated");
        }
    }

    pub async fn invalidate_all(&self) {
        let count = self.cache.invalidate_all().await;
        tracing::debug!(count, "Confirmed mapping cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn group(full_name: &str, label: &str, count: u32, day: u32) -> ConfirmedGroup {
        ConfirmedGroup {
            full_name: full_name.to_string(),
            label: label.to_string(),
            count,
            last_confirmed_at: Utc.with_ymd_and_hms(2026, 3, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_highest_count_wins() {
        let table = select_confirmed(vec![
            group("某药房", "甲", 3, 1),
            group("某药房", "乙", 6, 1),
        ]);
        let mapping = &table["某药房"];
        assert_eq!(mapping.label, "乙");
        assert_eq!(mapping.confirmation_count, 6);
        assert_eq!(mapping.confidence, ConfidenceTier::High);
    }

    #[test]
    fn test_tie_goes_to_most_recent_then_smallest_label() {
        let table = select_confirmed(vec![
            group("某药房", "甲", 3, 1),
            group("某药房", "乙", 3, 5),
        ]);
        assert_eq!(table["某药房"].label, "乙");
        assert_eq!(table["某药房"].confidence, ConfidenceTier::Medium);

        // Same count and time: order of arrival must not matter
        let forward = select_confirmed(vec![group("x", "b", 3, 2), group("x", "a", 3, 2)]);
        let backward = select_confirmed(vec![group("x", "a", 3, 2), group("x", "b", 3, 2)]);
        assert_eq!(forward["x"].label, "a");
        assert_eq!(backward["x"].label, "a");
    }

    #[tokio::test]
    async fn test_history_examples_order_and_limit() {
        use crate::db::feedback::append_feedback;
        use crate::models::NewFeedback;

        let pool = crate::db::init_memory_pool().await.unwrap();
        let recent = Utc::now() - Duration::days(1);
        for (full_name, label, times) in [("乙公司", "乙", 3), ("甲公司", "甲", 3), ("丙公司", "丙", 5)] {
            for _ in 0..times {
                append_feedback(&pool, &NewFeedback::accept("上海", full_name, label).at(recent))
                    .await
                    .unwrap();
            }
        }

        let index = ConfirmedMappingIndex::new(pool, MappingSettings::default());
        let examples = index.history_examples("上海", 2).await.unwrap();
        let names: Vec<_> = examples.iter().map(|e| e.full_name.as_str()).collect();
        assert_eq!(names, vec!["丙公司", "乙公司"]);
    }

    #[tokio::test]
    async fn test_disabled_history_is_empty() {
        use crate::db::feedback::append_feedback;
        use crate::models::NewFeedback;

        let pool = crate::db::init_memory_pool().await.unwrap();
        for _ in 0..3 {
            append_feedback(&pool, &NewFeedback::accept("上海", "甲公司", "甲")).await.unwrap();
        }

        let settings = MappingSettings {
            enabled: false,
            ..Default::default()
        };
        let index = ConfirmedMappingIndex::new(pool, settings);
        assert!(index.lookup("上海", "甲公司").await.unwrap().is_none());
    }
}
