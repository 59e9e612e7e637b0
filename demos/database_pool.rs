//! A pool of transactional data-store clients
//!
//! The client here is an in-memory stand-in; a real driver would open a
//! network session in `create` and ping it in `validate`.

use async_trait::async_trait;
use esox_resourcepool::{PoolConfig, ResourceManager, ResourcePool};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
enum ClientError {
    #[error("session {0} is closed")]
    Closed(u64),

    #[error("no transaction is open")]
    NoTransaction,
}

/// A data-store session with simple transaction support
#[derive(Debug)]
struct Client {
    session: u64,
    open: bool,
    committed: HashMap<String, String>,
    pending: Option<HashMap<String, String>>,
}

impl Client {
    fn begin(&mut self) -> Result<(), ClientError> {
        if !self.open {
            return Err(ClientError::Closed(self.session));
        }
        self.pending = Some(HashMap::new());
        Ok(())
    }

    fn put(&mut self, key: &str, value: &str) -> Result<(), ClientError> {
        let pending = self.pending.as_mut().ok_or(ClientError::NoTransaction)?;
        pending.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn commit(&mut self) -> Result<usize, ClientError> {
        let pending = self.pending.take().ok_or(ClientError::NoTransaction)?;
        let written = pending.len();
        self.committed.extend(pending);
        Ok(written)
    }

    async fn ping(&self) -> Result<(), ClientError> {
        tokio::time::sleep(Duration::from_millis(1)).await;
        if self.open {
            Ok(())
        } else {
            Err(ClientError::Closed(self.session))
        }
    }
}

struct ClientManager {
    sessions: AtomicU64,
}

#[async_trait]
impl ResourceManager for ClientManager {
    type Resource = Client;
    type Error = ClientError;

    async fn create(&self) -> Result<Client, ClientError> {
        // Simulated connect latency
        tokio::time::sleep(Duration::from_millis(5)).await;
        let session = self.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Client {
            session,
            open: true,
            committed: HashMap::new(),
            pending: None,
        })
    }

    async fn validate(&self, client: &mut Client) -> Result<bool, ClientError> {
        // A client left mid-transaction is not reusable
        if client.pending.is_some() {
            return Ok(false);
        }
        client.ping().await.map(|_| true)
    }

    async fn destroy(&self, mut client: Client) -> Result<(), ClientError> {
        client.open = false;
        tracing::info!(session = client.session, "closed data-store session");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== EsoxSolutions.ResourcePool - Data-store Client Pool ===\n");

    let config = PoolConfig::new()
        .with_min_size(2)
        .with_max_size(5)
        .with_acquire_timeout(Duration::from_secs(2))
        .with_max_lifetime(Duration::from_secs(300))
        .with_health_check(Duration::from_millis(200));
    let pool = ResourcePool::builder(ClientManager {
        sessions: AtomicU64::new(1),
    })
    .config(config)
    .build()
    .await?;

    // Many concurrent writers share at most five sessions
    let written = Arc::new(AtomicU64::new(0));
    let mut tasks = Vec::new();
    for worker in 0..20 {
        let pool = pool.clone();
        let written = Arc::clone(&written);
        tasks.push(tokio::spawn(async move {
            let mut client = pool.acquire().await?;
            client.begin()?;
            client.put(&format!("worker:{worker}"), "done")?;
            let count = client.commit()?;
            written.fetch_add(count as u64, Ordering::SeqCst);
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(client.session)
        }));
    }

    for task in tasks {
        match task.await? {
            Ok(session) => println!("   Write committed on session {}", session),
            Err(e) => println!("   Write failed: {}", e),
        }
    }
    println!("\n   Rows written: {}", written.load(Ordering::SeqCst));

    let metrics = pool.metrics();
    println!("   Sessions created: {}", metrics.total_created);
    println!("   Average acquire time: {:?}", metrics.average_acquire_time);
    println!("   Success rate: {:.1}%", metrics.success_rate() * 100.0);

    // Leave one session mid-transaction so the next health check drops it
    {
        let mut client = pool.acquire().await?;
        client.begin()?;
    }
    let report = pool.run_health_check().await;
    println!(
        "\n   Health check: validated {}, evicted {}, replenished {}",
        report.validated,
        report.evicted(),
        report.replenished
    );

    pool.shutdown().await;
    Ok(())
}
