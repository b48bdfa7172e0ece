//! Command-line arguments.

use super::app_config::LogLevel;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(
    name = "asset-cache",
    version,
    about = "Fetch remote images through a deduplicating memory + disk cache",
    long_about = None
)]
pub struct CliArgs {
    /// Configuration file path.
    #[arg(short, long, value_name = "PATH", env = "ASSET_CACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log file path.
    #[arg(long, value_name = "PATH")]
    pub log_path: Option<PathBuf>,

    /// Log verbosity level.
    #[arg(long, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Disk namespace.
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Cache root directory.
    #[arg(long, value_name = "PATH")]
    pub cache_dir: Option<PathBuf>,

    /// Memory tier budget in pixel-cost units.
    #[arg(long)]
    pub memory_budget: Option<u64>,

    /// Disk entry lifetime in seconds.
    #[arg(long)]
    pub max_age_secs: Option<u64>,

    /// Request timeout in seconds.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// What to do.
    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fetch assets through the cache and report where each came from.
    Fetch {
        /// Asset URLs.
        #[arg(required = true)]
        urls: Vec<String>,

        /// Print one JSON object per asset.
        #[arg(long)]
        json: bool,
    },
    /// Print the cache key and disk path for URLs.
    Key {
        /// Asset URLs.
        #[arg(required = true)]
        urls: Vec<String>,
    },
    /// Remove expired entries from the disk namespace.
    Prune,
    /// Remove every entry from the disk namespace.
    Clear,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let args = CliArgs::parse_from([
            "asset-cache",
            "fetch",
            "--json",
            "https://example.com/a.png",
            "https://example.com/b.png",
        ]);

        match args.command {
            Command::Fetch { urls, json } => {
                assert_eq!(urls.len(), 2);
                assert!(json);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_fetch_requires_url() {
        assert!(CliArgs::try_parse_from(["asset-cache", "fetch"]).is_err());
    }
}
