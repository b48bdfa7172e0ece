//! Request coordinator: storage first, then at most one fetch per key.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};

use crate::domain::entities::{Asset, AssetKey, AssetState, LoadedAsset};
use crate::domain::errors::AssetError;
use crate::domain::ports::{AssetFetcher, Storage};

use super::asset_request::AssetRequest;
use super::download_operation::{AssetResult, DownloadOperation, OperationHandle};

type InFlightMap = HashMap<AssetKey, Arc<DownloadOperation>>;

/// Deduplicates concurrent requests for the same asset and fans the result
/// out to everyone who asked.
///
/// Construct one per cache hierarchy and share it by cloning; clones share
/// the in-flight map.
#[derive(Clone)]
pub struct ImageManager {
    fetcher: Arc<dyn AssetFetcher>,
    storage: Arc<dyn Storage>,
    in_flight: Arc<Mutex<InFlightMap>>,
}

impl std::fmt::Debug for ImageManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageManager")
            .field("in_flight", &self.in_flight.lock().len())
            .finish_non_exhaustive()
    }
}

impl ImageManager {
    /// Creates a manager that fetches with `fetcher` and caches into `storage`
    /// unless a request names another storage.
    #[must_use]
    pub fn new(fetcher: Arc<dyn AssetFetcher>, storage: Arc<dyn Storage>) -> Self {
        Self {
            fetcher,
            storage,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// The default storage.
    #[must_use]
    pub const fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    /// Requests the asset at `url` through the default storage.
    pub async fn request(&self, url: &str) -> AssetRequest {
        self.request_with_storage(url, Arc::clone(&self.storage)).await
    }

    /// Requests the asset at `url`, looking it up in and storing it into `storage`.
    ///
    /// A storage hit resolves `Cached` with no handle. Otherwise the caller
    /// joins an in-flight operation for the same key, or starts one. The
    /// storage only applies to the caller that starts the operation.
    pub async fn request_with_storage(&self, url: &str, storage: Arc<dyn Storage>) -> AssetRequest {
        let key = AssetKey::from_url(url);

        if let Some(request) = self.join_or_peek(&key, url, storage.as_ref()) {
            return request;
        }

        let lookup = {
            let storage = Arc::clone(&storage);
            let key = key.clone();
            tokio::task::spawn_blocking(move || storage.retrieve(&key)).await
        };
        match lookup {
            Ok(Some(asset)) => {
                trace!(key = %key, "Storage hit");
                return AssetRequest::ready(LoadedAsset {
                    key,
                    asset,
                    state: AssetState::Cached,
                });
            }
            Ok(None) => trace!(key = %key, "Storage miss"),
            Err(e) => error!(key = %key, error = %e, "Storage lookup task panicked"),
        }

        self.join_or_start(key, url, storage)
    }

    /// Requests the asset at `url` and waits for the result.
    ///
    /// # Errors
    /// Returns the fetch or decode failure shared by every waiter of the operation.
    pub async fn load(&self, url: &str) -> AssetResult {
        self.request(url).await.await
    }

    /// Requests every URL and lets the results land in storage without a caller.
    pub fn prefetch<I, S>(&self, urls: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for url in urls {
            let manager = self.clone();
            let url = url.as_ref().to_string();
            tokio::spawn(async move {
                if let Err(e) = manager.load(&url).await {
                    debug!(url, error = %e, "Prefetch failed");
                }
            });
        }
    }

    /// Returns true while any operation is unresolved.
    #[must_use]
    pub fn has_in_flight_requests(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }

    /// Number of unresolved operations.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    fn join_or_peek(
        &self,
        key: &AssetKey,
        url: &str,
        storage: &dyn Storage,
    ) -> Option<AssetRequest> {
        let mut in_flight = self.in_flight.lock();
        if let Some(request) = Self::join(&mut in_flight, key, url) {
            return Some(request);
        }

        let asset = storage.peek(key)?;
        trace!(key = %key, "Memory hit");
        Some(AssetRequest::ready(LoadedAsset {
            key: key.clone(),
            asset,
            state: AssetState::Cached,
        }))
    }

    fn join_or_start(&self, key: AssetKey, url: &str, storage: Arc<dyn Storage>) -> AssetRequest {
        let mut in_flight = self.in_flight.lock();
        if let Some(request) = Self::join(&mut in_flight, &key, url) {
            return request;
        }

        let (operation, waiter, rx) = DownloadOperation::open(key.clone(), url);
        in_flight.insert(key.clone(), Arc::clone(&operation));
        drop(in_flight);

        debug!(key = %key, url, "Starting download operation");
        tokio::spawn(self.clone().run(Arc::clone(&operation), storage));

        let handle = OperationHandle::new(operation, waiter);
        AssetRequest::pending(key, AssetState::New, rx, handle)
    }

    fn join(in_flight: &mut InFlightMap, key: &AssetKey, url: &str) -> Option<AssetRequest> {
        let operation = in_flight.get(key)?;
        if let Some((waiter, rx)) = operation.attach(AssetState::Downloading) {
            debug!(key = %key, url, "Joining in-flight download");
            let handle = OperationHandle::new(Arc::clone(operation), waiter);
            return Some(AssetRequest::pending(
                key.clone(),
                AssetState::Downloading,
                rx,
                handle,
            ));
        }
        // Terminal operations leave the map under this lock, so this entry is stale.
        in_flight.remove(key);
        None
    }

    async fn run(self, operation: Arc<DownloadOperation>, storage: Arc<dyn Storage>) {
        let key = operation.key().clone();
        operation.start();

        let fetched = AssertUnwindSafe(self.fetcher.fetch(operation.url()))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(AssetError::fetch("fetch task panicked")));

        let decoded = match fetched {
            Ok(data) => tokio::task::spawn_blocking(move || Asset::decode(data))
                .await
                .unwrap_or_else(|e| Err(AssetError::decode(format!("decode task panicked: {e}"))))
                .map(Arc::new),
            Err(e) => Err(e),
        };

        let result = match decoded {
            Ok(asset) => {
                if self.discard_if_abandoned(&operation, &asset) {
                    return;
                }
                storage.store(&key, Arc::clone(&asset));
                storage.flush().await;
                Ok(asset)
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Asset download failed");
                Err(e)
            }
        };

        self.finish(&operation, result);
    }

    /// Resolves `Cancelled` without storing when nobody is left waiting.
    ///
    /// Joiners attach under the in-flight lock, so once this returns false
    /// every later joiner is served after the payload is stored.
    fn discard_if_abandoned(&self, operation: &Arc<DownloadOperation>, asset: &Arc<Asset>) -> bool {
        let mut in_flight = self.in_flight.lock();
        if operation.has_live_waiters() {
            return false;
        }
        Self::unregister(&mut in_flight, operation);
        operation.resolve(Ok(Arc::clone(asset)));
        drop(in_flight);

        debug!(key = %operation.key(), "All waiters withdrew, discarding payload");
        true
    }

    fn finish(&self, operation: &Arc<DownloadOperation>, result: Result<Arc<Asset>, AssetError>) {
        let mut in_flight = self.in_flight.lock();
        Self::unregister(&mut in_flight, operation);
        let state = operation.resolve(result);
        drop(in_flight);

        if let Some(state) = state {
            debug!(key = %operation.key(), state = %state, "Download operation finished");
        }
    }

    fn unregister(in_flight: &mut InFlightMap, operation: &Arc<DownloadOperation>) {
        if in_flight
            .get(operation.key())
            .is_some_and(|current| Arc::ptr_eq(current, operation))
        {
            in_flight.remove(operation.key());
        }
    }
}
