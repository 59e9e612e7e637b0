//! Basic usage examples for ResourcePool

use esox_resourcepool::{FnManager, PoolConfig, PoolError, ResourcePool};
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn counting_manager() -> FnManager<u32, io::Error> {
    let counter = Arc::new(AtomicU32::new(1));
    FnManager::new(move || {
        let id = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(id) }
    })
}

#[tokio::main]
async fn main() {
    println!("=== EsoxSolutions.ResourcePool - Basic Examples ===\n");

    // Example 1: Simple pool
    simple_pool().await;

    // Example 2: Waiting at capacity
    waiting_at_capacity().await;

    // Example 3: Try methods
    try_methods().await;

    // Example 4: Metrics and health
    metrics_and_health().await;
}

async fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = ResourcePool::new(counting_manager(), PoolConfig::new().with_min_size(2))
        .await
        .unwrap();

    {
        let resource = pool.acquire().await.unwrap();
        println!("   Got resource: {}", *resource);
        // Resource automatically returned when dropped
    }

    println!("   Idle after return: {}\n", pool.metrics().idle);
    pool.shutdown().await;
}

async fn waiting_at_capacity() {
    println!("2. Waiting at Capacity:");

    let config = PoolConfig::new()
        .with_max_size(1)
        .with_acquire_timeout(Duration::from_millis(100));
    let pool = ResourcePool::new(counting_manager(), config).await.unwrap();

    let held = pool.acquire().await.unwrap();
    match pool.acquire().await {
        Ok(_) => println!("   Got resource"),
        Err(PoolError::AcquireTimeout(waited)) => println!("   Timed out after {:?}", waited),
        Err(e) => println!("   Error: {}", e),
    }

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { *pool.acquire().await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;
    drop(held);
    println!("   Waiter received resource {}\n", waiter.await.unwrap());

    pool.shutdown().await;
}

async fn try_methods() {
    println!("3. Try Methods:");
    let pool = ResourcePool::new(counting_manager(), PoolConfig::new().with_max_size(1))
        .await
        .unwrap();

    // Take the only slot
    let first = pool.try_acquire().await.unwrap();
    assert!(first.is_some());
    println!("   First try: Success");

    // Try again while it is borrowed
    let second = pool.try_acquire().await.unwrap();
    assert!(second.is_none());
    println!("   Second try: None (pool at capacity)");

    drop(first);

    let third = pool.try_acquire().await.unwrap();
    assert!(third.is_some());
    println!("   Third try: Success\n");
}

async fn metrics_and_health() {
    println!("4. Metrics and Health:");
    let pool = ResourcePool::new(counting_manager(), PoolConfig::new().with_max_size(5))
        .await
        .unwrap();

    {
        let _first = pool.acquire().await.unwrap();
        let _second = pool.acquire().await.unwrap();

        let health = pool.health_status();
        println!("   Health: {}", if health.is_healthy { "Healthy" } else { "Unhealthy" });
        println!("   Utilization: {:.1}%", health.utilization * 100.0);
        println!("   Active: {}, Idle: {}", health.active_members, health.idle_members);
    }

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }

    pool.shutdown().await;
}
