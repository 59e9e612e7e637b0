//! Error types for the resource pool

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by [`ResourcePool`](crate::ResourcePool).
///
/// Only acquiring can fail in a way callers must handle. Release, metrics and
/// shutdown absorb their internal failures and log them instead.
#[derive(Error, Debug, Clone)]
pub enum PoolError {
    #[error("Timed out after {0:?} waiting for a pooled resource")]
    AcquireTimeout(Duration),

    #[error("Failed to create a new resource: {0}")]
    AcquireFailed(#[source] Arc<dyn std::error::Error + Send + Sync>),

    #[error("Pool is shutting down")]
    ShuttingDown,

    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to export metrics: {0}")]
    MetricsExport(String),
}

impl PoolError {
    pub(crate) fn acquire_failed<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PoolError::AcquireFailed(Arc::new(err))
    }

    /// Whether the caller may reasonably retry the operation.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PoolError::AcquireTimeout(_) | PoolError::AcquireFailed(_))
    }
}

#[cfg(feature = "prometheus")]
impl From<prometheus::Error> for PoolError {
    fn from(err: prometheus::Error) -> Self {
        PoolError::MetricsExport(err.to_string())
    }
}

pub type PoolResult<T> = Result<T, PoolError>;
