//! Disk-based asset storage for persistence across sessions.
//!
//! Every mutation runs on one background worker per instance, so writes,
//! removals and sweeps within a namespace never interleave. Reads go
//! straight to the filesystem. Failures are logged, counted and otherwise
//! treated as a cache miss.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tokio::fs;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::domain::entities::{Asset, AssetKey};
use crate::domain::errors::{AssetError, StorageError};
use crate::domain::ports::Storage;

/// Namespace used when none is given.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Entries older than this are removed by a sweep (7 days).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(60 * 60 * 24 * 7);

const NAMESPACE_PREFIX: &str = "assets";

#[derive(Debug)]
enum DiskJob {
    Store { key: AssetKey, asset: Arc<Asset> },
    Remove { key: AssetKey },
    Clear,
    Prune,
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct DiskCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    read_failures: AtomicU64,
    write_failures: AtomicU64,
    delete_failures: AtomicU64,
    decode_failures: AtomicU64,
}

impl DiskCounters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of disk storage health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct DiskStats {
    /// Successful reads.
    pub hits: u64,
    /// Reads that found no file.
    pub misses: u64,
    /// Reads that failed for another reason.
    pub read_failures: u64,
    /// Directory creation, encode or write failures.
    pub write_failures: u64,
    /// Removals that failed during remove, clear or prune.
    pub delete_failures: u64,
    /// Files that could not be decoded.
    pub decode_failures: u64,
}

impl DiskStats {
    /// Total swallowed failures of any kind.
    #[must_use]
    pub const fn failures(&self) -> u64 {
        self.read_failures + self.write_failures + self.delete_failures + self.decode_failures
    }
}

impl std::fmt::Display for DiskStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Disk: {} hits, {} misses, {} failures",
            self.hits,
            self.misses,
            self.failures()
        )
    }
}

/// Persistent asset storage rooted at a per-namespace directory.
pub struct DiskStorage {
    name: String,
    root: PathBuf,
    max_age: Arc<RwLock<Duration>>,
    counters: Arc<DiskCounters>,
    jobs: mpsc::UnboundedSender<DiskJob>,
}

impl DiskStorage {
    /// Creates the storage for namespace `name` under the platform cache directory.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self::with_root(default_cache_root(), name)
    }

    /// Creates the storage for namespace `name` under `cache_root`.
    ///
    /// A directory that cannot be created is logged and retried before every
    /// write.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn with_root(cache_root: impl AsRef<Path>, name: &str) -> Self {
        let root = cache_root
            .as_ref()
            .join(format!("{NAMESPACE_PREFIX}.{name}"));
        let counters = Arc::new(DiskCounters::default());

        if let Err(e) = std::fs::create_dir_all(&root) {
            DiskCounters::bump(&counters.write_failures);
            warn!(
                path = %root.display(),
                error = %e,
                "Failed to create storage directory, retrying on next write"
            );
        }

        let max_age = Arc::new(RwLock::new(DEFAULT_MAX_AGE));
        let (jobs, rx) = mpsc::unbounded_channel();

        let worker = DiskWorker {
            root: root.clone(),
            max_age: Arc::clone(&max_age),
            counters: Arc::clone(&counters),
            jobs: rx,
        };
        tokio::spawn(worker.run());

        debug!(name, path = %root.display(), "Opened disk storage");

        Self {
            name: name.to_string(),
            root,
            max_age,
            counters,
            jobs,
        }
    }

    /// Namespace name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Namespace directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File that holds the entry for `key`.
    #[must_use]
    pub fn path_for(&self, key: &AssetKey) -> PathBuf {
        entry_path(&self.root, key)
    }

    /// Checks whether an entry exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &AssetKey) -> bool {
        self.path_for(key).is_file()
    }

    /// Current expiry age.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        *self.max_age.read()
    }

    /// Changes the expiry age; applies from the next sweep.
    pub fn set_max_age(&self, max_age: Duration) {
        *self.max_age.write() = max_age;
        debug!(name = %self.name, max_age_secs = max_age.as_secs(), "Updated max age");
    }

    /// Queues a sweep removing entries older than the max age.
    pub fn prune_storage(&self) {
        self.submit(DiskJob::Prune);
    }

    /// Returns a snapshot of the health counters.
    #[must_use]
    pub fn stats(&self) -> DiskStats {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        DiskStats {
            hits: load(&self.counters.hits),
            misses: load(&self.counters.misses),
            read_failures: load(&self.counters.read_failures),
            write_failures: load(&self.counters.write_failures),
            delete_failures: load(&self.counters.delete_failures),
            decode_failures: load(&self.counters.decode_failures),
        }
    }

    fn submit(&self, job: DiskJob) {
        if self.jobs.send(job).is_err() {
            warn!(name = %self.name, "Disk storage worker is gone, dropping job");
        }
    }
}

impl std::fmt::Debug for DiskStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskStorage")
            .field("name", &self.name)
            .field("root", &self.root)
            .field("max_age", &self.max_age())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Storage for DiskStorage {
    fn store(&self, key: &AssetKey, asset: Arc<Asset>) {
        self.submit(DiskJob::Store {
            key: key.clone(),
            asset,
        });
    }

    fn retrieve(&self, key: &AssetKey) -> Option<Arc<Asset>> {
        let path = self.path_for(key);
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                DiskCounters::bump(&self.counters.misses);
                trace!(key = %key, "Disk storage miss");
                return None;
            }
            Err(e) => {
                DiskCounters::bump(&self.counters.read_failures);
                warn!(key = %key, path = %path.display(), error = %e, "Failed to read cached asset");
                return None;
            }
        };

        match Asset::decode(Bytes::from(data)) {
            Ok(asset) => {
                DiskCounters::bump(&self.counters.hits);
                trace!(key = %key, path = %path.display(), "Disk storage hit");
                Some(Arc::new(asset))
            }
            Err(e) => {
                DiskCounters::bump(&self.counters.decode_failures);
                warn!(key = %key, error = %e, "Failed to decode cached asset");
                None
            }
        }
    }

    fn remove(&self, key: &AssetKey) {
        self.submit(DiskJob::Remove { key: key.clone() });
    }

    fn clear(&self) {
        self.submit(DiskJob::Clear);
    }

    async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        self.submit(DiskJob::Flush(tx));
        let _ = rx.await;
    }
}

/// The serial queue behind one [`DiskStorage`].
struct DiskWorker {
    root: PathBuf,
    max_age: Arc<RwLock<Duration>>,
    counters: Arc<DiskCounters>,
    jobs: mpsc::UnboundedReceiver<DiskJob>,
}

impl DiskWorker {
    async fn run(mut self) {
        while let Some(job) = self.jobs.recv().await {
            match job {
                DiskJob::Store { key, asset } => {
                    match self.write(&key, &asset).await {
                        Ok(path) => {
                            debug!(key = %key, path = %path.display(), "Stored asset on disk");
                        }
                        Err(e) => {
                            DiskCounters::bump(&self.counters.write_failures);
                            warn!(key = %key, error = %e, "Failed to store asset on disk");
                        }
                    }
                    self.prune().await;
                }
                DiskJob::Remove { key } => self.remove(&key).await,
                DiskJob::Clear => self.clear().await,
                DiskJob::Prune => self.prune().await,
                DiskJob::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        debug!(path = %self.root.display(), "Disk storage worker stopped");
    }

    async fn write(&self, key: &AssetKey, asset: &Arc<Asset>) -> Result<PathBuf, StorageError> {
        let data = if let Some(data) = asset.data() {
            data.clone()
        } else {
            let asset = Arc::clone(asset);
            tokio::task::spawn_blocking(move || asset.encode())
                .await
                .map_err(|e| AssetError::decode(format!("encode task panicked: {e}")))??
        };

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))?;

        let path = entry_path(&self.root, key);
        let staging = staging_path(&path);
        fs::write(&staging, &data)
            .await
            .map_err(|e| StorageError::io(&staging, e))?;
        fs::rename(&staging, &path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        Ok(path)
    }

    async fn remove(&self, key: &AssetKey) {
        let path = entry_path(&self.root, key);
        match fs::remove_file(&path).await {
            Ok(()) => debug!(key = %key, "Removed asset from disk"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                DiskCounters::bump(&self.counters.delete_failures);
                warn!(key = %key, error = %e, "Failed to remove asset from disk");
            }
        }
    }

    async fn clear(&self) {
        if let Err(e) = fs::remove_dir_all(&self.root).await
            && e.kind() != std::io::ErrorKind::NotFound
        {
            DiskCounters::bump(&self.counters.delete_failures);
            warn!(path = %self.root.display(), error = %e, "Failed to clear disk storage");
        }
        if let Err(e) = fs::create_dir_all(&self.root).await {
            DiskCounters::bump(&self.counters.write_failures);
            warn!(path = %self.root.display(), error = %e, "Failed to recreate storage directory");
        }
        debug!(path = %self.root.display(), "Cleared disk storage");
    }

    async fn prune(&self) {
        let max_age = *self.max_age.read();
        let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
            return;
        };

        let Ok(mut entries) = fs::read_dir(&self.root).await else {
            return;
        };

        let mut expired = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if meta.is_dir() {
                continue;
            }
            if meta.modified().is_ok_and(|modified| modified <= cutoff) {
                expired.push(entry.path());
            }
        }

        let mut removed = 0usize;
        for path in expired {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    DiskCounters::bump(&self.counters.delete_failures);
                    warn!(path = %path.display(), error = %e, "Failed to remove expired asset");
                }
            }
        }

        if removed > 0 {
            debug!(
                removed,
                max_age_secs = max_age.as_secs(),
                "Pruned expired assets"
            );
        }
    }
}

fn entry_path(root: &Path, key: &AssetKey) -> PathBuf {
    use sha2::{Digest, Sha256};
    root.join(hex::encode(Sha256::digest(key.as_str().as_bytes())))
}

/// Staging file next to `path`. Not hidden, so sweeps reach it.
fn staging_path(path: &Path) -> PathBuf {
    path.with_extension("tmp")
}

/// Returns the default cache root directory.
#[must_use]
pub fn default_cache_root() -> PathBuf {
    directories::ProjectDirs::from("com", "linuxmobile", "asset-cache").map_or_else(
        || std::env::temp_dir().join("asset-cache").join("cache"),
        |dirs| dirs.cache_dir().to_path_buf(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat};
    use tempfile::TempDir;

    const HOUR: Duration = Duration::from_secs(60 * 60);

    fn create_test_storage() -> (DiskStorage, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::with_root(temp_dir.path(), "test");
        (storage, temp_dir)
    }

    fn png_asset() -> Arc<Asset> {
        let data = Asset::new(DynamicImage::new_rgb8(4, 4)).encode().unwrap();
        Arc::new(Asset::decode(data).unwrap())
    }

    fn backdate(path: &Path, age: Duration) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - age).unwrap();
    }

    #[tokio::test]
    async fn test_store_and_retrieve() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("test1");
        let asset = png_asset();

        storage.store(&key, asset.clone());
        storage.flush().await;

        let retrieved = storage.retrieve(&key).unwrap();
        assert_eq!(retrieved.width(), 4);
        assert_eq!(
            std::fs::read(storage.path_for(&key)).unwrap(),
            asset.data().unwrap().as_ref()
        );
        assert_eq!(storage.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_miss() {
        let (storage, _temp) = create_test_storage();
        assert!(storage.retrieve(&AssetKey::new("nonexistent")).is_none());
        assert_eq!(storage.stats().misses, 1);
        assert_eq!(storage.stats().failures(), 0);
    }

    #[tokio::test]
    async fn test_namespace_layout() {
        let temp_dir = TempDir::new().unwrap();
        let storage = DiskStorage::with_root(temp_dir.path(), DEFAULT_NAMESPACE);

        assert_eq!(storage.name(), "default");
        assert_eq!(storage.root(), temp_dir.path().join("assets.default"));
        assert!(storage.root().is_dir());
        assert_eq!(storage.max_age(), DEFAULT_MAX_AGE);

        let file_name = storage.path_for(&AssetKey::new("k"));
        let file_name = file_name.file_name().unwrap().to_string_lossy();
        assert_eq!(file_name.len(), 64);
    }

    #[tokio::test]
    async fn test_store_without_data_reencodes_png() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("raw");

        storage.store(&key, Arc::new(Asset::new(DynamicImage::new_rgb8(3, 2))));
        storage.flush().await;

        let bytes = std::fs::read(storage.path_for(&key)).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Png);
        assert_eq!(storage.retrieve(&key).unwrap().height(), 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("test1");

        storage.store(&key, png_asset());
        storage.flush().await;
        assert!(storage.contains(&key));

        storage.remove(&key);
        storage.flush().await;
        assert!(!storage.contains(&key));
    }

    #[tokio::test]
    async fn test_clear_recreates_directory() {
        let (storage, _temp) = create_test_storage();
        storage.store(&AssetKey::new("a"), png_asset());
        storage.store(&AssetKey::new("b"), png_asset());
        storage.flush().await;

        storage.clear();
        storage.flush().await;

        assert!(storage.root().is_dir());
        assert!(storage.retrieve(&AssetKey::new("a")).is_none());
        assert!(storage.retrieve(&AssetKey::new("b")).is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("corrupt");
        std::fs::write(storage.path_for(&key), b"not an image").unwrap();

        assert!(storage.retrieve(&key).is_none());
        assert_eq!(storage.stats().decode_failures, 1);
    }

    #[tokio::test]
    async fn test_prune_removes_only_expired_files() {
        let (storage, _temp) = create_test_storage();
        let old = AssetKey::new("old");
        let fresh = AssetKey::new("fresh");
        storage.store(&old, png_asset());
        storage.store(&fresh, png_asset());
        storage.flush().await;

        backdate(&storage.path_for(&old), 2 * HOUR);
        backdate(&storage.path_for(&fresh), HOUR / 2);
        storage.set_max_age(HOUR);
        storage.prune_storage();
        storage.flush().await;

        assert!(!storage.contains(&old));
        assert!(storage.contains(&fresh));
    }

    #[tokio::test]
    async fn test_prune_skips_directories_and_hidden_files() {
        let (storage, _temp) = create_test_storage();
        let nested_dir = storage.root().join("nested");
        std::fs::create_dir(&nested_dir).unwrap();
        let nested_file = nested_dir.join("inner");
        std::fs::write(&nested_file, b"x").unwrap();
        backdate(&nested_file, 30 * 24 * HOUR);
        let hidden = storage.root().join(".keep");
        std::fs::write(&hidden, b"x").unwrap();
        backdate(&hidden, 30 * 24 * HOUR);

        storage.prune_storage();
        storage.flush().await;

        assert!(nested_file.exists());
        assert!(hidden.exists());
    }

    #[tokio::test]
    async fn test_prune_removes_stale_staging_files() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("interrupted");
        let staging = staging_path(&storage.path_for(&key));
        std::fs::write(&staging, b"partial").unwrap();
        backdate(&staging, 8 * 24 * HOUR);

        storage.prune_storage();
        storage.flush().await;

        assert!(!staging.exists());
        assert!(!staging.file_name().unwrap().to_string_lossy().starts_with('.'));
    }

    #[tokio::test]
    async fn test_store_leaves_no_staging_file() {
        let (storage, _temp) = create_test_storage();
        let key = AssetKey::new("k");

        storage.store(&key, png_asset());
        storage.flush().await;

        assert!(storage.contains(&key));
        assert!(!staging_path(&storage.path_for(&key)).exists());
    }

    #[tokio::test]
    async fn test_store_triggers_prune() {
        let (storage, _temp) = create_test_storage();
        let stale = AssetKey::new("stale");
        std::fs::write(storage.path_for(&stale), b"old bytes").unwrap();
        backdate(&storage.path_for(&stale), 8 * 24 * HOUR);

        storage.store(&AssetKey::new("new"), png_asset());
        storage.flush().await;

        assert!(!storage.contains(&stale));
        assert!(storage.contains(&AssetKey::new("new")));
    }

    #[tokio::test]
    async fn test_namespaces_are_independent() {
        let temp_dir = TempDir::new().unwrap();
        let first = DiskStorage::with_root(temp_dir.path(), "first");
        let second = DiskStorage::with_root(temp_dir.path(), "second");
        let key = AssetKey::new("shared");

        first.store(&key, png_asset());
        first.flush().await;

        assert!(first.retrieve(&key).is_some());
        assert!(second.retrieve(&key).is_none());
    }

    #[tokio::test]
    async fn test_unusable_directory_degrades_then_recovers() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"a file where a directory should be").unwrap();

        let storage = DiskStorage::with_root(&blocker, "test");
        assert_eq!(storage.stats().write_failures, 1);

        let key = AssetKey::new("k");
        storage.store(&key, png_asset());
        storage.flush().await;
        assert!(storage.retrieve(&key).is_none());
        assert_eq!(storage.stats().write_failures, 2);

        std::fs::remove_file(&blocker).unwrap();
        storage.store(&key, png_asset());
        storage.flush().await;
        assert!(storage.retrieve(&key).is_some());
    }
}
