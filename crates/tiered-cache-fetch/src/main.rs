//! Tiered cache fetch - command-line front end for the tiered cache
//!
//! Fetches URLs and files through a byte cache, reads cached keys back and
//! reports or clears what is stored on disk. Configuration comes from the
//! environment (`CACHE_DIR`, `CACHE_NAME`, `MAX_DISK_SIZE`, ...).

mod commands;
mod error;
mod types;

use crate::error::Result;
use crate::types::FetchConfig;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tiered_cache::{Cache, CacheConfig};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

/// Fetch values through a two-tier (memory + disk) cache.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Pretty-print JSON output
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch HTTP(S) URLs or file paths, storing them in the cache on a miss
    Fetch {
        #[arg(required = true)]
        sources: Vec<String>,
    },
    /// Read cached keys without fetching
    Get {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Remove keys from the cache
    Remove {
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Print entry counts and sizes
    Stats,
    /// Remove everything from the cache
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("tiered_cache=info".parse()?)
        .add_directive("tiered_cache_fetch=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();

    let config = load_config();
    info!("Cache: {} at {:?}", config.cache.name, config.cache.root_dir);
    info!("Max disk size: {} MB", config.max_disk_size / (1024 * 1024));

    let cache = Cache::<Vec<u8>>::with_config(config.cache_config())?;

    match cli.command {
        Command::Fetch { sources } => {
            let reports = commands::fetch_sources(&cache, &sources).await;
            // Let queued disk writes land before exiting
            cache.flush().await?;
            for report in &reports {
                print_json(report, cli.pretty)?;
            }
            commands::check_reports(&reports)?;
        }
        Command::Get { keys } => {
            let reports = commands::get_keys(&cache, &keys).await;
            for report in &reports {
                print_json(report, cli.pretty)?;
            }
            commands::check_reports(&reports)?;
        }
        Command::Remove { keys } => commands::remove_keys(&cache, &keys).await?,
        Command::Stats => {
            let report = commands::stats(&cache).await?;
            print_json(&report, cli.pretty)?;
        }
        Command::Clear => {
            commands::clear(&cache).await;
            info!("Cache cleared");
        }
    }

    Ok(())
}

fn load_config() -> FetchConfig {
    let max_disk_size = std::env::var("MAX_DISK_SIZE")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(1024 * 1024 * 1024); // 1GB default

    FetchConfig {
        cache: CacheConfig::from_env(),
        max_disk_size,
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let line = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", line);
    Ok(())
}
