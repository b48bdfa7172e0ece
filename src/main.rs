use std::sync::Arc;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use futures_util::future::join_all;
use serde_json::json;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use asset_cache::application::ImageManager;
use asset_cache::domain::{AssetKey, Storage};
use asset_cache::infrastructure::config::ConfigLoader;
use asset_cache::infrastructure::{AppConfig, CliArgs, Command, HttpFetcher, TieredStorage};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let loader = ConfigLoader::new(args.config.as_deref())
        .wrap_err("Failed to locate configuration file")?;
    let mut config = loader.load().wrap_err("Failed to load configuration")?;
    config.merge_args(args);
    Ok(config)
}

async fn fetch(manager: &ImageManager, urls: &[String], as_json: bool) -> bool {
    let results = join_all(urls.iter().map(|url| manager.load(url))).await;
    let mut all_ok = true;

    for (url, result) in urls.iter().zip(results) {
        match result {
            Ok(loaded) => {
                let asset = &loaded.asset;
                if as_json {
                    println!(
                        "{}",
                        json!({
                            "url": url,
                            "key": loaded.key.as_str(),
                            "state": loaded.state,
                            "width": asset.width(),
                            "height": asset.height(),
                            "frames": asset.frame_count(),
                            "cost": asset.cost(),
                        })
                    );
                } else {
                    println!(
                        "{} {} {}x{} frames={} cost={} {}",
                        loaded.key,
                        loaded.state,
                        asset.width(),
                        asset.height(),
                        asset.frame_count(),
                        asset.cost(),
                        url
                    );
                }
            }
            Err(e) => {
                all_ok = false;
                if as_json {
                    println!("{}", json!({ "url": url, "error": e.to_string() }));
                } else {
                    eprintln!("{url}: {e}");
                }
            }
        }
    }

    all_ok
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = CliArgs::parse();
    let config = load_config(&args)?;

    init_logging(&config).wrap_err("Failed to initialize logging")?;

    info!(version = asset_cache::VERSION, "Starting {}", asset_cache::NAME);

    let storage = Arc::new(TieredStorage::from_config(&config.cache));

    match &args.command {
        Command::Fetch { urls, json } => {
            let fetcher = Arc::new(
                HttpFetcher::new(&config.network).wrap_err("Failed to create HTTP client")?,
            );
            let manager = ImageManager::new(fetcher, storage.clone());

            let ok = fetch(&manager, urls, *json).await;
            info!(stats = %storage.disk().stats(), "Fetch finished");

            if !ok {
                std::process::exit(1);
            }
        }
        Command::Key { urls } => {
            for url in urls {
                let key = AssetKey::from_url(url);
                println!("{key} {}", storage.disk().path_for(&key).display());
            }
        }
        Command::Prune => {
            storage.disk().prune_storage();
            storage.flush().await;
            info!(root = %storage.disk().root().display(), "Pruned expired entries");
        }
        Command::Clear => {
            storage.clear();
            storage.flush().await;
            info!(root = %storage.disk().root().display(), "Cleared storage");
        }
    }

    Ok(())
}
