//! Domain entity definitions.

mod asset;

pub use asset::{Asset, AssetKey, AssetState, LoadedAsset};
