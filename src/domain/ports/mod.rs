mod asset_fetcher_port;
mod storage_port;

pub use asset_fetcher_port::AssetFetcher;
pub use storage_port::Storage;

#[cfg(test)]
pub mod mocks {
    pub use super::asset_fetcher_port::MockAssetFetcher;
    pub use super::asset_fetcher_port::mock::GatedFetcher;
    pub use super::storage_port::mock::MockSlowStorage;
}
