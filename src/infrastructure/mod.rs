//! Infrastructure layer with storage, network and configuration adapters.

/// Application configuration.
pub mod config;
/// Fetch primitive adapters.
pub mod network;
/// Storage tiers.
pub mod storage;

pub use config::{AppConfig, CacheConfig, CliArgs, Command, LogLevel, NetworkConfig};
pub use network::HttpFetcher;
pub use storage::{CacheStats, DiskStats, DiskStorage, MemoryStorage, TieredStorage};
