//! In-memory cost-bounded asset storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use moka::sync::Cache;
use tracing::{debug, trace};

use crate::domain::entities::{Asset, AssetKey};
use crate::domain::ports::Storage;

/// Default cost budget: 64 Mi pixel units.
pub const DEFAULT_COST_BUDGET: u64 = 64 * 1024 * 1024;

/// In-memory cache for decoded assets, bounded by total pixel cost.
/// Thread-safe; eviction is left to the weighted cache. A single asset
/// costing more than the budget, or more than `u32::MAX`, is never resident.
pub struct MemoryStorage {
    cache: Cache<AssetKey, Arc<Asset>>,
    budget: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl MemoryStorage {
    /// Creates a storage that keeps total cost under `budget`.
    #[must_use]
    pub fn new(budget: u64) -> Self {
        Self::named("default", budget)
    }

    /// Creates a named storage that keeps total cost under `budget`.
    #[must_use]
    pub fn named(name: &str, budget: u64) -> Self {
        let cache = Cache::builder()
            .name(&format!("assets.{name}"))
            .max_capacity(budget)
            .weigher(|_key: &AssetKey, asset: &Arc<Asset>| {
                // `store` rejects anything wider than u32.
                u32::try_from(asset.cost()).unwrap_or(u32::MAX)
            })
            .build();

        Self {
            cache,
            budget,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Creates a storage with the default budget.
    #[must_use]
    pub fn with_default_budget() -> Self {
        Self::new(DEFAULT_COST_BUDGET)
    }

    /// The configured cost budget.
    #[must_use]
    pub const fn budget(&self) -> u64 {
        self.budget
    }

    /// Total cost of resident entries, after applying pending evictions.
    #[must_use]
    pub fn total_cost(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.weighted_size()
    }

    /// Number of resident entries, after applying pending evictions.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Returns true if nothing is resident.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns cache statistics.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        let hit_rate = if total > 0 {
            (hits as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        CacheStats {
            hits,
            misses,
            hit_rate,
            entries: self.len(),
            total_cost: self.total_cost(),
        }
    }

    fn lookup(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        if let Some(asset) = self.cache.get(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory storage hit");
            Some(asset)
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(key = %key, "Memory storage miss");
            None
        }
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::with_default_budget()
    }
}

impl std::fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("budget", &self.budget)
            .finish_non_exhaustive()
    }
}

/// Statistics about cache performance.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Hit rate as a percentage.
    pub hit_rate: f64,
    /// Current number of resident assets.
    pub entries: u64,
    /// Current total cost of resident assets.
    pub total_cost: u64,
}

impl std::fmt::Display for CacheStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Memory: {} assets, cost {}, {:.1}% hit rate ({} hits, {} misses)",
            self.entries, self.total_cost, self.hit_rate, self.hits, self.misses
        )
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn store(&self, key: &AssetKey, asset: Arc<Asset>) {
        let cost = asset.cost();
        if cost > self.budget || cost > u64::from(u32::MAX) {
            debug!(
                key = %key,
                cost,
                budget = self.budget,
                "Asset exceeds memory budget, not storing"
            );
            self.cache.invalidate(key);
            return;
        }
        debug!(key = %key, cost, "Storing asset in memory");
        self.cache.insert(key.clone(), asset);
    }

    fn retrieve(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        self.lookup(key)
    }

    fn peek(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        self.lookup(key)
    }

    fn remove(&self, key: &AssetKey) {
        self.cache.invalidate(key);
        debug!(key = %key, "Removed asset from memory");
    }

    fn clear(&self) {
        self.cache.invalidate_all();
        debug!("Cleared memory storage");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::DynamicImage;

    fn asset(width: u32, height: u32) -> Arc<Asset> {
        Arc::new(Asset::new(DynamicImage::new_rgb8(width, height)))
    }

    #[test]
    fn test_store_and_retrieve() {
        let storage = MemoryStorage::new(10_000);
        let key = AssetKey::new("test1");

        storage.store(&key, asset(10, 10));
        let retrieved = storage.retrieve(&key);

        assert!(retrieved.is_some());
        assert_eq!(retrieved.unwrap().width(), 10);
    }

    #[test]
    fn test_miss() {
        let storage = MemoryStorage::new(10_000);
        assert!(storage.retrieve(&AssetKey::new("nonexistent")).is_none());
    }

    #[test]
    fn test_total_cost_never_exceeds_budget() {
        let storage = MemoryStorage::new(10_000);

        for i in 0..8 {
            storage.store(&AssetKey::new(format!("k{i}")), asset(50, 50));
        }

        assert!(storage.total_cost() <= 10_000);
        assert!(storage.len() <= 4);
    }

    #[test]
    fn test_oversized_asset_is_not_resident() {
        let storage = MemoryStorage::new(1_000);
        let key = AssetKey::new("huge");

        storage.store(&key, asset(100, 100));

        assert_eq!(storage.total_cost(), 0);
        assert!(storage.retrieve(&key).is_none());
    }

    #[test]
    fn test_asset_wider_than_weigher_is_rejected() {
        let budget = 16 * 1024 * 1024 * 1024;
        let storage = MemoryStorage::new(budget);
        let key = AssetKey::new("wide");
        let wide = Asset::new(DynamicImage::new_rgb8(1, 1)).with_scale(70_000.0);
        assert!(wide.cost() > u64::from(u32::MAX));
        assert!(wide.cost() < budget);

        storage.store(&key, Arc::new(wide));

        assert!(storage.retrieve(&key).is_none());
        assert_eq!(storage.total_cost(), 0);
    }

    #[test]
    fn test_rejected_store_drops_previous_entry() {
        let storage = MemoryStorage::new(1_000);
        let key = AssetKey::new("k");
        storage.store(&key, asset(10, 10));
        assert!(storage.retrieve(&key).is_some());

        storage.store(&key, asset(100, 100));

        assert!(storage.retrieve(&key).is_none());
    }

    #[test]
    fn test_animated_asset_charges_per_frame() {
        let storage = MemoryStorage::new(100_000);
        let frame = DynamicImage::new_rgb8(10, 10);
        let animated = Asset::animated(vec![frame.clone(), frame.clone(), frame]).unwrap();

        storage.store(&AssetKey::new("gif"), Arc::new(animated));
        storage.store(&AssetKey::new("png"), asset(10, 10));

        assert_eq!(storage.total_cost(), 400);
    }

    #[test]
    fn test_remove_and_clear() {
        let storage = MemoryStorage::new(10_000);
        let a = AssetKey::new("a");
        let b = AssetKey::new("b");
        storage.store(&a, asset(5, 5));
        storage.store(&b, asset(5, 5));

        storage.remove(&a);
        assert!(storage.retrieve(&a).is_none());
        assert!(storage.retrieve(&b).is_some());

        storage.clear();
        assert!(storage.retrieve(&b).is_none());
        assert!(storage.is_empty());
    }

    #[test]
    fn test_stats() {
        let storage = MemoryStorage::new(10_000);
        let key = AssetKey::new("test1");
        storage.store(&key, asset(10, 10));

        let _ = storage.retrieve(&key);
        let _ = storage.retrieve(&AssetKey::new("missing"));

        let stats = storage.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.total_cost, 100);
    }
}
