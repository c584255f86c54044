//! Tiered Cache console
//!
//! Drives a string cache from stdin, one command per line:
//!
//! ```text
//! set <key> <value>   save a value
//! get <key>           fetch a value
//! del <key>           evict a key
//! trim <secs>         evict everything idle for longer than <secs>
//! purge               simulate a memory-pressure signal
//! clear               empty both tiers
//! stats               print counters as JSON
//! quit
//! ```

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tiered_cache::cache::expiry_cutoff;
use tiered_cache::{spawn_trim_task, CacheConfig, MemoryPressure, TieredCache, Utf8Codec};

/// Interval for the background trim sweep when a max age is configured.
const TRIM_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tiered_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: directory={}, max_age={:?}, max_disk_bytes={}, max_disk_records={}",
        config.directory.display(),
        config.max_age,
        config.max_disk_bytes,
        config.max_disk_records
    );

    let cache = TieredCache::open(config, Utf8Codec).context("failed to open cache")?;
    let pressure = MemoryPressure::new();
    let _subscription = cache.subscribe_memory_pressure(&pressure);
    let trim_handle = spawn_trim_task(&cache, TRIM_INTERVAL);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = tokio::select! {
            line = lines.next_line() => line.context("failed to read stdin")?,
            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        };
        let Some(line) = line else {
            break;
        };
        if !run_command(&cache, &pressure, line.trim()).await {
            break;
        }
    }

    trim_handle.abort();
    cache.flush().await;
    info!("Shutdown complete");
    Ok(())
}

/// Executes one console command. Returns false on `quit`.
async fn run_command(
    cache: &TieredCache<String, Utf8Codec>,
    pressure: &MemoryPressure,
    line: &str,
) -> bool {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "set" => match rest.split_once(' ') {
            Some((key, value)) => {
                let saved = cache.save(key, value.to_string()).await;
                println!("{}", if saved { "OK" } else { "NOT SAVED" });
            }
            None => println!("usage: set <key> <value>"),
        },
        "get" => match cache.fetch(rest).await {
            Some(value) => println!("{value}"),
            None => println!("(nil)"),
        },
        "del" => {
            cache.evict_object(rest).await;
            println!("OK");
        }
        "trim" => match rest
            .parse()
            .ok()
            .and_then(|secs| expiry_cutoff(Duration::from_secs(secs), Utc::now()))
        {
            Some(cutoff) => println!("removed {}", cache.trim_cache(cutoff).await),
            None => println!("usage: trim <secs>"),
        },
        "purge" => {
            pressure.notify();
            println!("OK");
        }
        "clear" => println!("removed {}", cache.clear().await),
        "stats" => match serde_json::to_string_pretty(&cache.stats()) {
            Ok(json) => println!("{json}"),
            Err(e) => warn!("Failed to render stats: {}", e),
        },
        "quit" | "exit" => return false,
        other => println!("unknown command: {other}"),
    }
    true
}
