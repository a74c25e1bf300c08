//! Cache Health Demo Application
//!
//! Stores and reads entries through both tiers, then forces the warm tier's
//! breaker open to show degraded, memory-only operation.
//!
//! Usage:
//!   cargo run --example cache_health_demo
//!
//! Environment variables (a `.env` file is honored):
//!   OUROBOROS_CACHE_WARM_DIR       - warm tier directory (default: ./data/cache)
//!   OUROBOROS_CACHE_HOT_SIZE_BYTES - hot tier budget in bytes
//!   OUROBOROS_CACHE_COMPRESSION    - `none` or `gzip`
//!   RUST_LOG                       - log filter (default: info)

use ouroboros_cache::{EngineConfig, ResilientCacheEngine};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("=== Resilient Cache Health Demo ===");

    let config = EngineConfig::from_env()?;
    info!(
        "Warm dir: {} (hot budget: {} bytes, compression: {:?})",
        config.warm_dir.display(),
        config.hot_size_bytes,
        config.compression
    );

    let cache: Arc<ResilientCacheEngine<String>> = Arc::new(ResilientCacheEngine::new(config).await?);
    let _maintenance = cache.spawn_maintenance();

    info!("\n--- Populating cache ---");
    for i in 0..5 {
        let key = format!("demo:response:{}", i);
        let tier = cache
            .store(key.as_str(), format!("answer number {}", i), Duration::from_secs(600))
            .await;
        info!("Stored {} in {}", key, tier);
    }

    info!("\n--- Reading back ---");
    for i in 0..6 {
        let key = format!("demo:response:{}", i);
        match cache.get(&key).await {
            Some(value) => info!("✓ {} -> {}", key, value),
            None => info!("✗ {} missed", key),
        }
    }

    let report = cache.health_check();
    info!("Health: {:?} at {}", report.status, report.timestamp);
    info!("{}", report.metrics);

    info!("\n--- Simulating a failing disk ---");
    cache.circuit_breaker().force_open();

    let tier = cache
        .store("demo:degraded", "memory only".to_string(), Duration::from_secs(600))
        .await;
    info!("Stored demo:degraded in {}", tier);
    info!("Read back: {:?}", cache.get("demo:degraded").await);

    let report = cache.health_check();
    info!("Health: {:?}", report.status);
    info!("Warm operations bypassed: {}", report.metrics.warm_bypassed);

    cache.circuit_breaker().reset();
    info!("Breaker reset, health: {:?}", cache.health_check().status);

    info!("\n--- Final metrics (JSON) ---");
    info!("{}", serde_json::to_string_pretty(&cache.metrics())?);

    Ok(())
}
