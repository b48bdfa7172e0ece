//! Application configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::args::CliArgs;
use crate::infrastructure::storage::{DEFAULT_COST_BUDGET, DEFAULT_MAX_AGE, DEFAULT_NAMESPACE};

/// Log level configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Trace level.
    Trace,
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    #[default]
    Warn,
    /// Error level.
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Trace => write!(f, "trace"),
            Self::Debug => write!(f, "debug"),
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// Application configuration.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Log file path. Logs go to stderr when unset.
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Network configuration.
    #[serde(default)]
    pub network: NetworkConfig,
}

/// Storage tier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Disk namespace, also names the memory tier.
    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Cache root override. Defaults to the platform cache directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,

    /// Memory tier budget in pixel-cost units.
    #[serde(default = "default_memory_budget")]
    pub memory_budget: u64,

    /// Disk entries older than this many seconds are pruned.
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,
}

impl CacheConfig {
    /// Disk expiry age.
    #[must_use]
    pub const fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            directory: None,
            memory_budget: default_memory_budget(),
            max_age_secs: default_max_age_secs(),
        }
    }
}

/// Network configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// User agent sent with every request.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

const fn default_memory_budget() -> u64 {
    DEFAULT_COST_BUDGET
}

const fn default_max_age_secs() -> u64 {
    DEFAULT_MAX_AGE.as_secs()
}

const fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("{}/{}", crate::NAME, crate::VERSION)
}

impl AppConfig {
    /// Applies command-line overrides on top of file values.
    pub fn merge_args(&mut self, args: &CliArgs) {
        if let Some(log_path) = &args.log_path {
            self.log_path = Some(log_path.clone());
        }
        if let Some(log_level) = args.log_level {
            self.log_level = log_level;
        }
        if let Some(namespace) = &args.namespace {
            self.cache.namespace.clone_from(namespace);
        }
        if let Some(directory) = &args.cache_dir {
            self.cache.directory = Some(directory.clone());
        }
        if let Some(memory_budget) = args.memory_budget {
            self.cache.memory_budget = memory_budget;
        }
        if let Some(max_age_secs) = args.max_age_secs {
            self.cache.max_age_secs = max_age_secs;
        }
        if let Some(timeout_secs) = args.timeout_secs {
            self.network.timeout_secs = timeout_secs;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_parse_partial_config() {
        let toml_content = r#"
            log_level = "debug"

            [cache]
            namespace = "thumbnails"
            max_age_secs = 3600

            [network]
            timeout_secs = 5
        "#;

        let config: AppConfig = toml::from_str(toml_content).expect("Failed to parse config");

        assert_eq!(config.log_level, LogLevel::Debug);
        assert_eq!(config.cache.namespace, "thumbnails");
        assert_eq!(config.cache.max_age(), Duration::from_secs(3600));
        assert_eq!(config.cache.memory_budget, DEFAULT_COST_BUDGET);
        assert!(config.cache.directory.is_none());
        assert_eq!(config.network.timeout_secs, 5);
        assert!(config.network.user_agent.starts_with(crate::NAME));
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();

        assert_eq!(config.log_level, LogLevel::Warn);
        assert_eq!(config.cache.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.cache.max_age(), DEFAULT_MAX_AGE);
        assert_eq!(config.network.timeout_secs, 30);
    }

    #[test]
    fn test_args_override_file_values() {
        let mut config: AppConfig = toml::from_str("[cache]\nnamespace = \"file\"").unwrap();
        let args = CliArgs::parse_from([
            "asset-cache",
            "--namespace",
            "cli",
            "--max-age-secs",
            "60",
            "--log-level",
            "trace",
            "prune",
        ]);

        config.merge_args(&args);

        assert_eq!(config.cache.namespace, "cli");
        assert_eq!(config.cache.max_age_secs, 60);
        assert_eq!(config.log_level, LogLevel::Trace);
        assert_eq!(config.network.timeout_secs, 30);
    }
}
