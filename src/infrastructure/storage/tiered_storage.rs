//! Memory-then-disk storage used by default.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use crate::domain::entities::{Asset, AssetKey};
use crate::domain::ports::Storage;
use crate::infrastructure::config::CacheConfig;

use super::disk_storage::DiskStorage;
use super::memory_storage::MemoryStorage;

/// Two-tier storage: a cost-bounded memory tier in front of a disk tier.
#[derive(Debug, Clone)]
pub struct TieredStorage {
    memory: Arc<MemoryStorage>,
    disk: Arc<DiskStorage>,
}

impl TieredStorage {
    /// Combines existing tiers.
    #[must_use]
    pub const fn new(memory: Arc<MemoryStorage>, disk: Arc<DiskStorage>) -> Self {
        Self { memory, disk }
    }

    /// Builds both tiers from configuration.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn from_config(config: &CacheConfig) -> Self {
        let memory = MemoryStorage::named(&config.namespace, config.memory_budget);
        let disk = match &config.directory {
            Some(root) => DiskStorage::with_root(root, &config.namespace),
            None => DiskStorage::new(&config.namespace),
        };
        disk.set_max_age(config.max_age());
        Self::new(Arc::new(memory), Arc::new(disk))
    }

    /// The memory tier.
    #[must_use]
    pub const fn memory(&self) -> &Arc<MemoryStorage> {
        &self.memory
    }

    /// The disk tier.
    #[must_use]
    pub const fn disk(&self) -> &Arc<DiskStorage> {
        &self.disk
    }
}

#[async_trait]
impl Storage for TieredStorage {
    fn store(&self, key: &AssetKey, asset: Arc<Asset>) {
        self.memory.store(key, Arc::clone(&asset));
        self.disk.store(key, asset);
    }

    fn retrieve(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        if let Some(asset) = self.memory.retrieve(key) {
            return Some(asset);
        }
        let asset = self.disk.retrieve(key)?;
        trace!(key = %key, "Promoting disk hit into memory");
        self.memory.store(key, Arc::clone(&asset));
        Some(asset)
    }

    fn remove(&self, key: &AssetKey) {
        self.memory.remove(key);
        self.disk.remove(key);
    }

    fn clear(&self) {
        self.memory.clear();
        self.disk.clear();
    }

    fn peek(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        self.memory.peek(key)
    }

    async fn flush(&self) {
        self.disk.flush().await;
    }
}
