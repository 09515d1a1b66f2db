//! PodCache - Tiered Memory/Disk Key-Value Cache
//!
//! Main entry point for the PodCache server.
//!
//! This application wires together:
//! - Environment-driven configuration
//! - `P` independently-locked in-memory LRU partitions
//! - A content-addressable disk overflow tier
//! - A RESP-subset TCP front end, one thread per connection
//! - A background status reporter
//! - Graceful shutdown on SIGINT/SIGTERM

use std::panic;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use podcache::config::Config;
use podcache::disk::DiskStore;
use podcache::memory::MemoryPartition;
use podcache::status::StatusReporter;
use podcache::tiered::TieredCache;

fn main() -> anyhow::Result<()> {
    panic::set_hook(Box::new(|panic_info| {
        eprintln!("PodCache Fatal Error:");
        eprintln!("{panic_info}");

        if let Some(location) = panic_info.location() {
            eprintln!(
                "Location: {}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            );
        }
    }));

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("  PodCache - Tiered Memory/Disk Key-Value Cache");
    log::info!("  Version: {}", podcache::VERSION);
    log::info!("═══════════════════════════════════════════════════════════");
    log::info!("Platform: {}", std::env::consts::OS);
    log::info!("Architecture: {}", std::env::consts::ARCH);

    let config = Config::from_env();
    log::info!(
        "configuration: {} MiB total, {} partitions, port {}, fsroot {:?}",
        config.total_capacity_bytes / (1024 * 1024),
        config.partitions,
        config.server_port,
        config.fsroot
    );

    let per_partition = config.per_partition_capacity_bytes();
    let partitions = (0..config.partitions)
        .map(|_| MemoryPartition::new(per_partition))
        .collect();
    let disk = DiskStore::new(&config.fsroot)?;
    log::info!("disk tier base directory: {:?}", disk.base_dir());
    let cache = Arc::new(TieredCache::new(partitions, disk));

    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_handler = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::info!("shutdown signal received");
        stop_for_handler.store(true, Ordering::Relaxed);
    })?;

    let reporter = StatusReporter::spawn(Arc::clone(&cache));

    log::info!("accepting connections...");
    let result = podcache::server::serve(config.server_port, Arc::clone(&cache), Arc::clone(&stop));

    reporter.shutdown();
    cache.shutdown();

    match &result {
        Ok(_) => {
            log::info!("═══════════════════════════════════════════════════════════");
            log::info!("  PodCache shutdown complete");
            log::info!("═══════════════════════════════════════════════════════════");
        }
        Err(e) => {
            log::error!("server error: {e}");
        }
    }

    Ok(result?)
}
