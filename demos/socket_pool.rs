//! A pool of persistent TCP connections
//!
//! Starts a local echo server, then shares a handful of connections to it
//! between many concurrent requests.

use async_trait::async_trait;
use esox_resourcepool::{PoolConfig, ResourceManager, ResourcePool};
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing_subscriber::EnvFilter;

struct SocketManager {
    addr: SocketAddr,
}

#[async_trait]
impl ResourceManager for SocketManager {
    type Resource = TcpStream;
    type Error = io::Error;

    async fn create(&self) -> io::Result<TcpStream> {
        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(stream)
    }

    async fn validate(&self, stream: &mut TcpStream) -> io::Result<bool> {
        // A closed peer reads as zero bytes; unsolicited data means a
        // desynchronised stream. Either way the connection is unusable.
        let mut peek = [0u8; 1];
        match stream.try_read(&mut peek) {
            Ok(_) => Ok(false),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(stream.peer_addr().is_ok()),
            Err(e) => Err(e),
        }
    }

    async fn destroy(&self, mut stream: TcpStream) -> io::Result<()> {
        stream.shutdown().await
    }
}

async fn run_echo_server(listener: TcpListener) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => {
                        if socket.write_all(&buf[..n]).await.is_err() {
                            return;
                        }
                    }
                }
            }
        });
    }
}

async fn echo(stream: &mut TcpStream, message: &str) -> io::Result<String> {
    stream.write_all(message.as_bytes()).await?;
    let mut buf = vec![0u8; message.len()];
    stream.read_exact(&mut buf).await?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("=== EsoxSolutions.ResourcePool - Socket Pool ===\n");

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(run_echo_server(listener));

    let config = PoolConfig::new()
        .with_min_size(1)
        .with_max_size(3)
        .with_acquire_timeout(Duration::from_secs(1))
        .with_idle_timeout(Duration::from_secs(30))
        .with_health_check(Duration::from_secs(5));
    let pool = ResourcePool::new(SocketManager { addr }, config).await?;

    let mut tasks = Vec::new();
    for request in 0..10 {
        let pool = pool.clone();
        tasks.push(tokio::spawn(async move {
            let mut stream = pool.acquire().await?;
            let reply = echo(&mut stream, &format!("request {request}")).await?;
            Ok::<_, Box<dyn std::error::Error + Send + Sync>>(reply)
        }));
    }

    for task in tasks {
        match task.await? {
            Ok(reply) => println!("   Echoed: {}", reply),
            Err(e) => println!("   Request failed: {}", e),
        }
    }

    let metrics = pool.metrics();
    println!("\n   Connections opened: {}", metrics.total_created);
    println!("   Max size: {}", metrics.max_size);

    #[cfg(feature = "prometheus")]
    println!("\n{}", pool.export_metrics_prometheus("echo_sockets", None)?);

    pool.shutdown().await;
    Ok(())
}
