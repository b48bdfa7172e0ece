//! A single in-flight fetch and the callers waiting on it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::domain::entities::{Asset, AssetKey, AssetState, LoadedAsset};
use crate::domain::errors::AssetError;

/// Result delivered to each waiter.
pub type AssetResult = Result<LoadedAsset, AssetError>;

#[derive(Debug)]
struct Waiter {
    id: u64,
    tag: AssetState,
    tx: oneshot::Sender<AssetResult>,
}

#[derive(Debug)]
struct OperationInner {
    state: AssetState,
    waiters: Vec<Waiter>,
    outcome: Option<Result<Arc<Asset>, AssetError>>,
}

/// One fetch for one key, shared by every caller that asked for it while
/// it was running.
///
/// Waiters are served in registration order, exactly once, when the
/// operation reaches a terminal state. Terminal operations accept no new
/// waiters.
#[derive(Debug)]
pub struct DownloadOperation {
    key: AssetKey,
    url: String,
    inner: Mutex<OperationInner>,
    next_waiter: AtomicU64,
    cancelled: AtomicBool,
}

impl DownloadOperation {
    /// Creates an operation in state `New` with its first waiter registered.
    ///
    /// Storage hits never get an operation, so `Cached` is only ever a
    /// caller tag here.
    pub(crate) fn open(
        key: AssetKey,
        url: &str,
    ) -> (Arc<Self>, u64, oneshot::Receiver<AssetResult>) {
        let (tx, rx) = oneshot::channel();
        let operation = Self {
            key,
            url: url.to_string(),
            inner: Mutex::new(OperationInner {
                state: AssetState::New,
                waiters: vec![Waiter {
                    id: 0,
                    tag: AssetState::New,
                    tx,
                }],
                outcome: None,
            }),
            next_waiter: AtomicU64::new(1),
            cancelled: AtomicBool::new(false),
        };
        (Arc::new(operation), 0, rx)
    }

    /// The asset key.
    #[must_use]
    pub const fn key(&self) -> &AssetKey {
        &self.key
    }

    /// The source URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> AssetState {
        self.inner.lock().state
    }

    /// Number of callers still waiting.
    #[must_use]
    pub fn waiter_count(&self) -> usize {
        self.inner.lock().waiters.len()
    }

    /// Returns true once every waiter has withdrawn.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// The resolved payload or error, once terminal.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<Arc<Asset>, AssetError>> {
        self.inner.lock().outcome.clone()
    }

    /// Registers another waiter. Returns `None` if the operation is already terminal.
    pub(crate) fn attach(&self, tag: AssetState) -> Option<(u64, oneshot::Receiver<AssetResult>)> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            return None;
        }

        let id = self.next_waiter.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        inner.waiters.push(Waiter { id, tag, tx });
        self.cancelled.store(false, Ordering::Release);
        Some((id, rx))
    }

    /// Withdraws one waiter. The fetch keeps running for the others.
    pub(crate) fn detach(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.waiters.len();
        inner.waiters.retain(|waiter| waiter.id != id);
        let removed = inner.waiters.len() != before;

        if removed {
            debug!(key = %self.key, waiter = id, remaining = inner.waiters.len(), "Waiter withdrew");
            if inner.waiters.is_empty() && !inner.state.is_terminal() {
                self.cancelled.store(true, Ordering::Release);
            }
        }
        removed
    }

    /// Moves from `New` to `Downloading`.
    pub(crate) fn start(&self) -> bool {
        let mut inner = self.inner.lock();
        self.transition(&mut inner, AssetState::Downloading)
    }

    /// Returns true if at least one waiter would still receive a result.
    pub(crate) fn has_live_waiters(&self) -> bool {
        self.inner
            .lock()
            .waiters
            .iter()
            .any(|waiter| !waiter.tx.is_closed())
    }

    /// Fires the single terminal transition and fans the result out.
    ///
    /// Waiters whose receiver is gone count as withdrawn; with none left the
    /// operation ends `Cancelled` and nothing is delivered. Returns the
    /// terminal state, or `None` if the operation had already resolved.
    pub(crate) fn resolve(&self, result: Result<Arc<Asset>, AssetError>) -> Option<AssetState> {
        let mut inner = self.inner.lock();
        if inner.state.is_terminal() {
            warn!(key = %self.key, state = %inner.state, "Operation already resolved");
            return None;
        }

        inner.waiters.retain(|waiter| !waiter.tx.is_closed());

        let next = match &result {
            _ if inner.waiters.is_empty() => AssetState::Cancelled,
            Ok(_) => AssetState::Downloaded,
            Err(_) => AssetState::Failed,
        };
        if !self.transition(&mut inner, next) {
            return None;
        }
        if next == AssetState::Cancelled {
            self.cancelled.store(true, Ordering::Release);
        }

        for waiter in inner.waiters.drain(..) {
            let delivered = match &result {
                Ok(asset) => Ok(LoadedAsset {
                    key: self.key.clone(),
                    asset: Arc::clone(asset),
                    state: waiter.tag,
                }),
                Err(e) => Err(e.clone()),
            };
            let _ = waiter.tx.send(delivered);
        }
        inner.outcome = Some(result);

        Some(next)
    }

    fn transition(&self, inner: &mut OperationInner, next: AssetState) -> bool {
        if !inner.state.can_transition_to(next) {
            warn!(key = %self.key, from = %inner.state, to = %next, "Rejected state transition");
            return false;
        }
        debug!(key = %self.key, from = %inner.state, to = %next, "Operation state changed");
        inner.state = next;
        true
    }
}

/// A caller's stake in a running operation.
///
/// Cancelling withdraws only this caller; other callers joined to the same
/// operation still receive the result.
#[derive(Debug, Clone)]
pub struct OperationHandle {
    operation: Arc<DownloadOperation>,
    waiter: u64,
}

impl OperationHandle {
    pub(crate) const fn new(operation: Arc<DownloadOperation>, waiter: u64) -> Self {
        Self { operation, waiter }
    }

    /// Withdraws this caller. Returns false if it was already served or withdrawn.
    pub fn cancel(&self) -> bool {
        self.operation.detach(self.waiter)
    }

    /// Current state of the underlying operation.
    #[must_use]
    pub fn state(&self) -> AssetState {
        self.operation.state()
    }

    /// Key of the underlying operation.
    #[must_use]
    pub fn key(&self) -> &AssetKey {
        self.operation.key()
    }

    /// The underlying operation.
    #[must_use]
    pub const fn operation(&self) -> &Arc<DownloadOperation> {
        &self.operation
    }
}
