//! Application services coordinating downloads across storage tiers.

pub mod asset_request;
pub mod download_operation;
pub mod image_manager;

pub use asset_request::AssetRequest;
pub use download_operation::{AssetResult, DownloadOperation, OperationHandle};
pub use image_manager::ImageManager;
