//! Storage tier error types.
//!
//! These never leave a storage tier: they are logged, counted and turned
//! into a cache miss.

use std::path::PathBuf;

use thiserror::Error;

/// Storage tier failure.
#[derive(Debug, Error)]
#[allow(missing_docs)]
pub enum StorageError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode asset: {0}")]
    Encode(#[from] super::AssetError),
}

impl StorageError {
    /// Creates io error bound to a path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
