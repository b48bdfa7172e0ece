//! Domain layer with core entities, errors and port definitions.

/// Entity definitions.
pub mod entities;
/// Error types.
pub mod errors;
/// Port definitions.
pub mod ports;

pub use entities::{Asset, AssetKey, AssetState, LoadedAsset};
pub use errors::{AssetError, StorageError};
pub use ports::{AssetFetcher, Storage};
