// EsoxSolutions.ResourcePool
// Bounded async resource pool with health checks and metrics

// This is just a binary wrapper - the actual library is in lib.rs
// Run demos with: cargo run --example basic

use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== EsoxSolutions.ResourcePool ===");
    println!("See the demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let counter = Arc::new(AtomicUsize::new(0));
    let next = Arc::clone(&counter);
    let manager = FnManager::new(move || {
        let id = next.fetch_add(1, Ordering::SeqCst);
        async move { Ok::<_, io::Error>(format!("session-{id}")) }
    });
    let pool = ResourcePool::new(manager, PoolConfig::new().with_min_size(2).with_max_size(4)).await?;

    {
        let session = pool.acquire().await?;
        println!("  Got resource: {}", *session);
    }

    let metrics = pool.metrics();
    println!("  Idle after return: {}", metrics.idle);
    println!("  Created so far: {}", counter.load(Ordering::SeqCst));

    pool.shutdown().await;
    Ok(())
}
