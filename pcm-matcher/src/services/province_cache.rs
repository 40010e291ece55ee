//! Per-province cache with fill generations
//!
//! Fills read the database without holding the lock. A fill takes a
//! [`FillTicket`] before its query and the result is stored only if no
//! invalidation touched that province in the meantime; otherwise the caller
//! still gets its value but the cache stays empty for the next reader.

use std::collections::HashMap;
use tokio::sync::RwLock;

/// Generation observed when a fill started
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket {
    epoch: u64,
    generation: u64,
}

struct Slots<T> {
    entries: HashMap<String, T>,
    /// Bumped by `invalidate(province)`
    generations: HashMap<String, u64>,
    /// Bumped by `invalidate_all`
    epoch: u64,
}

impl<T> Slots<T> {
    fn ticket(&self, province: &str) -> FillTicket {
        FillTicket {
            epoch: self.epoch,
            generation: self.generations.get(province).copied().unwrap_or(0),
        }
    }
}

pub struct ProvinceCache<T> {
    slots: RwLock<Slots<T>>,
}

impl<T: Clone> ProvinceCache<T> {
    pub fn new() -> Self {
        Self {
            slots: RwLock::new(Slots {
                entries: HashMap::new(),
                generations: HashMap::new(),
                epoch: 0,
            }),
        }
    }

    pub async fn get(&self, province: &str) -> Option<T> {
        self.slots.read().await.entries.get(province).cloned()
    }

    /// Take before querying the database for `province`
    pub async fn begin_fill(&self, province: &str) -> FillTicket {
        self.slots.read().await.ticket(province)
    }

    /// Store `value` unless `province` was invalidated since `ticket`
    ///
    /// Returns whether the value was cached.
    pub async fn finish_fill(&self, province: &str, ticket: FillTicket, value: T) -> bool {
        let mut slots = self.slots.write().await;
        if slots.ticket(province) != ticket {
            return false;
        }
        slots.entries.insert(province.to_string(), value);
        true
    }

    /// Drop one province; returns whether it was cached
    pub async fn invalidate(&self, province: &str) -> bool {
        let mut slots = self.slots.write().await;
        *slots.generations.entry(province.to_string()).or_insert(0) += 1;
        slots.entries.remove(province).is_some()
    }

    /// Drop everything; returns how many provinces were cached
    pub async fn invalidate_all(&self) -> usize {
        let mut slots = self.slots.write().await;
        slots.epoch += 1;
        let count = slots.entries.len();
        slots.entries.clear();
        count
    }

    pub async fn snapshot(&self) -> Vec<(String, T)> {
        self.slots
            .read()
            .await
            .entries
            .iter()
            .map(|(province, value)| (province.clone(), value.clone()))
            .collect()
    }

    /// Cached provinces, sorted
    pub async fn provinces(&self) -> Vec<String> {
        let mut provinces: Vec<String> = self.slots.read().await.entries.keys().cloned().collect();
        provinces.sort();
        provinces
    }
}

impl<T: Clone> Default for ProvinceCache<T> {
    fn default() -> Self {
        Self::new()
    }
}
