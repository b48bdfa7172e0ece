//! Domain error types.

mod asset_error;
mod storage_error;

pub use asset_error::AssetError;
pub use storage_error::StorageError;
