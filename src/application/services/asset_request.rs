//! The caller-side view of a request.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::domain::entities::{AssetKey, AssetState, LoadedAsset};
use crate::domain::errors::AssetError;

use super::download_operation::{AssetResult, OperationHandle};

/// A pending asset request.
///
/// Await it to receive the result. Dropping it withdraws the caller just
/// like [`AssetRequest::cancel`]: if nobody else is waiting when the fetch
/// completes, the payload is discarded.
#[derive(Debug)]
#[must_use = "dropping a request withdraws it"]
pub struct AssetRequest {
    key: AssetKey,
    state: AssetState,
    rx: oneshot::Receiver<AssetResult>,
    handle: Option<OperationHandle>,
}

impl AssetRequest {
    pub(crate) fn ready(loaded: LoadedAsset) -> Self {
        let (tx, rx) = oneshot::channel();
        let key = loaded.key.clone();
        let state = loaded.state;
        let _ = tx.send(Ok(loaded));
        Self {
            key,
            state,
            rx,
            handle: None,
        }
    }

    pub(crate) const fn pending(
        key: AssetKey,
        state: AssetState,
        rx: oneshot::Receiver<AssetResult>,
        handle: OperationHandle,
    ) -> Self {
        Self {
            key,
            state,
            rx,
            handle: Some(handle),
        }
    }

    /// The asset key.
    #[must_use]
    pub const fn key(&self) -> &AssetKey {
        &self.key
    }

    /// What this caller observed when asking: `New` if it started the
    /// download, `Downloading` if it joined one, `Cached` on a storage hit.
    #[must_use]
    pub const fn state(&self) -> AssetState {
        self.state
    }

    /// The cancellation handle, absent when served straight from storage.
    #[must_use]
    pub const fn handle(&self) -> Option<&OperationHandle> {
        self.handle.as_ref()
    }

    /// Withdraws this caller from the underlying operation.
    pub fn cancel(&self) -> bool {
        self.handle.as_ref().is_some_and(OperationHandle::cancel)
    }
}

impl Future for AssetRequest {
    type Output = AssetResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        Pin::new(&mut this.rx)
            .poll(cx)
            .map(|received| received.unwrap_or(Err(AssetError::Cancelled)))
    }
}
