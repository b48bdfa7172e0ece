//! Port definition for the fetch primitive.

use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::errors::AssetError;

/// Fetches the raw bytes behind a resource identifier.
/// Invoked once per new download operation; reports success or failure exactly once.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetches the payload at `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes, AssetError>;
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::Semaphore;

    /// Fetcher that blocks every call until the test releases it.
    pub struct GatedFetcher {
        payload: Result<Bytes, AssetError>,
        gate: Semaphore,
        opened: AtomicBool,
        calls: AtomicUsize,
    }

    impl GatedFetcher {
        /// Creates a closed gate that answers with `payload` once opened.
        pub fn new(payload: Result<Bytes, AssetError>) -> Self {
            Self {
                payload,
                gate: Semaphore::new(0),
                opened: AtomicBool::new(false),
                calls: AtomicUsize::new(0),
            }
        }

        /// Creates an already open gate.
        pub fn open(payload: Result<Bytes, AssetError>) -> Self {
            let fetcher = Self::new(payload);
            fetcher.release();
            fetcher
        }

        /// Lets every pending and future fetch through.
        pub fn release(&self) {
            if !self.opened.swap(true, Ordering::SeqCst) {
                self.gate.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        }

        /// Number of fetches issued so far.
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl AssetFetcher for GatedFetcher {
        async fn fetch(&self, _url: &str) -> Result<Bytes, AssetError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _permit = self
                .gate
                .acquire()
                .await
                .map_err(AssetError::fetch)?;
            self.payload.clone()
        }
    }
}
