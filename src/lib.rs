//! # EsoxSolutions.ResourcePool
//!
//! Bounded, async pool for expensive stateful resources such as database
//! clients and socket connections.
//!
//! ## Features
//!
//! - Hard capacity limit, with a warm set created up front
//! - Automatic return of resources via RAII (Drop trait)
//! - FIFO waiting with a per-caller timeout
//! - Maximum lifetime and idle eviction
//! - Background health checks through a pluggable validator
//! - Health status and metrics, with Prometheus export
//! - Graceful shutdown
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
//! use std::io;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let manager = FnManager::new(|| async { Ok::<_, io::Error>(vec![0u8; 16]) });
//! let pool = ResourcePool::new(manager, PoolConfig::new().with_max_size(8))
//!     .await
//!     .unwrap();
//! {
//!     let buffer = pool.acquire().await.unwrap();
//!     println!("Got {} bytes", buffer.len());
//!     // Returned to the pool when `buffer` goes out of scope
//! }
//! pool.shutdown().await;
//! # }
//! ```

mod pool;
mod config;
mod metrics;
mod health;
mod eviction;
mod errors;
mod manager;
mod member;

pub use pool::{PoolBuilder, PooledResource, ResourcePool};
pub use config::PoolConfig;
pub use metrics::PoolMetrics;
#[cfg(feature = "prometheus")]
pub use metrics::MetricsExporter;
pub use health::HealthStatus;
pub use eviction::{EvictionReason, SweepReport};
pub use manager::{FnManager, ResourceManager};
pub use errors::{PoolError, PoolResult};
