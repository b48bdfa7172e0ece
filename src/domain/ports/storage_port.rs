//! Port definition for asset storage tiers.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::entities::{Asset, AssetKey};

/// A storage tier capable of holding decoded assets.
///
/// Implementations must be thread-safe. Failures never surface through this
/// interface: a tier that cannot read or write behaves like an empty tier.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Stores an asset. Raw bytes carried by the asset are persisted as-is.
    fn store(&self, key: &AssetKey, asset: Arc<Asset>);

    /// Looks up an asset. May block on slow media.
    fn retrieve(&self, key: &AssetKey) -> Option<Arc<Asset>>;

    /// Removes a single asset.
    fn remove(&self, key: &AssetKey);

    /// Removes every asset.
    fn clear(&self);

    /// Looks up an asset without touching slow media.
    /// Tiers that cannot answer cheaply return `None`.
    fn peek(&self, _key: &AssetKey) -> Option<Arc<Asset>> {
        None
    }

    /// Waits until previously issued writes are visible to `retrieve`.
    async fn flush(&self) {}
}
