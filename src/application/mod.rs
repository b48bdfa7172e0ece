//! Application layer with the download coordination services.

/// Download coordination services.
pub mod services;

pub use services::{AssetRequest, AssetResult, DownloadOperation, ImageManager, OperationHandle};
