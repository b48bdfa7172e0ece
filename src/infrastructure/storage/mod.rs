//! Asset storage tiers.
//!
//! This module provides:
//! - Memory storage bounded by pixel cost
//! - Disk storage with age-based expiry
//! - The tiered combination used by default

pub mod disk_storage;
pub mod memory_storage;
pub mod tiered_storage;

pub use disk_storage::{
    DEFAULT_MAX_AGE, DEFAULT_NAMESPACE, DiskStats, DiskStorage, default_cache_root,
};
pub use memory_storage::{CacheStats, DEFAULT_COST_BUDGET, MemoryStorage};
pub use tiered_storage::TieredStorage;
