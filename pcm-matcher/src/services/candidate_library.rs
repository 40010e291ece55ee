//! Province-scoped candidate vocabulary
//!
//! Validated labels are loaded per province on first use and cached. A
//! refresh builds the new set outside the lock and swaps the `Arc` in, so
//! readers holding the previous handle keep a consistent snapshot.

use pcm_common::Result;
use sqlx::SqlitePool;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::province_cache::ProvinceCache;

/// Immutable label set of one province
pub type LabelSet = Arc<BTreeSet<String>>;

pub struct CandidateLibrary {
    db: SqlitePool,
    cache: ProvinceCache<LabelSet>,
    loads: AtomicU64,
}

impl CandidateLibrary {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            cache: ProvinceCache::new(),
            loads: AtomicU64::new(0),
        }
    }

    /// Validated labels of `province`
    ///
    /// Zero validated labels yields an empty set, not an error.
    pub async fn load(&self, province: &str, refresh: bool) -> Result<LabelSet> {
        if !refresh {
            if let Some(labels) = self.cache.get(province).await {
                return Ok(labels);
            }
        }

        let ticket = self.cache.begin_fill(province).await;
        let labels: BTreeSet<String> = crate::db::candidates::list_validated_labels(&self.db, province)
            .await?
            .into_iter()
            .collect();
        let labels = Arc::new(labels);
        self.loads.fetch_add(1, Ordering::Relaxed);

        let cached = self.cache.finish_fill(province, ticket, Arc::clone(&labels)).await;
        tracing::info!(province, count = labels.len(), refresh, cached, "Candidate labels loaded");

        Ok(labels)
    }

    /// Database loads performed so far, cache hits excluded
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    /// Currently cached provinces and their sets
    pub async fn cached_snapshot(&self) -> Vec<(String, LabelSet)> {
        self.cache.snapshot().await
    }

    pub async fn cached_provinces(&self) -> Vec<String> {
        self.cache.provinces().await
    }

    /// Drop one province; returns whether it was cached
    pub async fn invalidate(&self, province: &str) -> bool {
        let removed = self.cache.invalidate(province).await;
        if removed {
            tracing::debug!(province, "Candidate cache invalidated");
        }
        removed
    }

    pub async fn invalidate_all(&self) {
        let count = self.cache.invalidate_all().await;
        tracing::debug!(count, "Candidate cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::candidates::add_candidate;
    use crate::db::init_memory_pool;
    use crate::models::NewCandidate;

    async fn library() -> (SqlitePool, CandidateLibrary) {
        let pool = init_memory_pool().await.unwrap();
        for (label, province) in [
            ("九州通好药师", "四川"),
            ("老百姓大药房", "四川"),
            ("海王星辰", "广东"),
        ] {
            add_candidate(&pool, &NewCandidate::validated(label, province)).await.unwrap();
        }
        add_candidate(&pool, &NewCandidate::pending("草稿药房", "四川")).await.unwrap();
        (pool.clone(), CandidateLibrary::new(pool))
    }

    #[tokio::test]
    async fn test_load_is_province_scoped() {
        let (_pool, library) = library().await;

        let sichuan = library.load("四川", false).await.unwrap();
        assert_eq!(
            sichuan.iter().cloned().collect::<Vec<_>>(),
            vec!["九州通好药师".to_string(), "老百姓大药房".to_string()]
        );
        assert!(!sichuan.contains("海王星辰"));
        assert!(!sichuan.contains("草稿药房"));
    }

    #[tokio::test]
    async fn test_unknown_province_is_empty() {
        let (_pool, library) = library().await;
        assert!(library.load("宁夏", false).await.unwrap().is_empty());
        assert_eq!(library.cached_provinces().await, vec!["宁夏".to_string()]);
    }

    #[tokio::test]
    async fn test_cached_until_refresh() {
        let (pool, library) = library().await;

        let before = library.load("四川", false).await.unwrap();
        add_candidate(&pool, &NewCandidate::validated("一心堂", "四川")).await.unwrap();

        let cached = library.load("四川", false).await.unwrap();
        assert!(Arc::ptr_eq(&before, &cached));
        assert!(!cached.contains("一心堂"));

        let refreshed = library.load("四川", true).await.unwrap();
        assert!(refreshed.contains("一心堂"));
        // old handle unchanged
        assert!(!before.contains("一心堂"));
    }

    #[tokio::test]
    async fn test_load_count_skips_cache_hits() {
        let (_pool, library) = library().await;

        library.load("四川", false).await.unwrap();
        library.load("四川", false).await.unwrap();
        library.load("广东", false).await.unwrap();
        assert_eq!(library.load_count(), 2);

        library.load("四川", true).await.unwrap();
        assert_eq!(library.load_count(), 3);
    }

    #[tokio::test]
    async fn test_invalidate() {
        let (_pool, library) = library().await;
        library.load("四川", false).await.unwrap();
        library.load("广东", false).await.unwrap();

        assert!(library.invalidate("四川").await);
        assert!(!library.invalidate("四川").await);
        assert_eq!(library.cached_provinces().await, vec!["广东".to_string()]);

        library.invalidate_all().await;
        assert!(library.cached_snapshot().await.is_empty());
    }
}
