//! Pool configuration options

use crate::errors::{PoolError, PoolResult};
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for resource pool behavior
///
/// Every option has a default, so configs can be built from
/// `PoolConfig::default()` or deserialized from partial input.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_min_size(2)
///     .with_max_size(20)
///     .with_acquire_timeout(Duration::from_secs(5))
///     .with_max_lifetime(Duration::from_secs(1800));
///
/// assert_eq!(config.min_size, 2);
/// assert_eq!(config.max_size, 20);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfig {
    /// Number of members created at construction and kept warm
    pub min_size: usize,

    /// Maximum number of members, borrowed or idle
    pub max_size: usize,

    /// How long a caller may wait in the queue for a member
    pub acquire_timeout: Duration,

    /// How long a member may sit idle (above `min_size`) before eviction
    pub idle_timeout: Duration,

    /// Absolute age limit for any member
    pub max_lifetime: Duration,

    /// Whether the background health-check task runs
    pub health_check_enabled: bool,

    /// Interval between health-check sweeps
    pub health_check_interval: Duration,

    /// Whether cumulative counters and averages are recorded
    pub metrics_enabled: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(3600),
            health_check_enabled: true,
            health_check_interval: Duration::from_secs(30),
            metrics_enabled: true,
        }
    }
}

impl PoolConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the warm set size
    pub fn with_min_size(mut self, size: usize) -> Self {
        self.min_size = size;
        self
    }

    /// Set the maximum pool size
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_max_size(50);
    /// assert_eq!(config.max_size, 50);
    /// ```
    pub fn with_max_size(mut self, size: usize) -> Self {
        self.max_size = size;
        self
    }

    /// Set how long `acquire` may wait for a member
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Set idle timeout for members
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum lifetime of a member
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = lifetime;
        self
    }

    /// Enable the background health check with the given interval
    pub fn with_health_check(mut self, interval: Duration) -> Self {
        self.health_check_enabled = true;
        self.health_check_interval = interval;
        self
    }

    /// Disable the background health check entirely
    pub fn without_health_check(mut self) -> Self {
        self.health_check_enabled = false;
        self
    }

    /// Turn metric recording on or off
    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    /// Check the configuration for contradictory settings
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_min_size(5).with_max_size(2);
    /// assert!(config.validate().is_err());
    /// ```
    pub fn validate(&self) -> PoolResult<()> {
        if self.max_size == 0 {
            return Err(PoolError::InvalidConfig(
                "max_size must be greater than 0".to_string(),
            ));
        }
        if self.min_size > self.max_size {
            return Err(PoolError::InvalidConfig(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        if self.max_lifetime.is_zero() {
            return Err(PoolError::InvalidConfig(
                "max_lifetime must be greater than zero".to_string(),
            ));
        }
        if self.idle_timeout.is_zero() {
            return Err(PoolError::InvalidConfig(
                "idle_timeout must be greater than zero".to_string(),
            ));
        }
        if self.health_check_enabled && self.health_check_interval.is_zero() {
            return Err(PoolError::InvalidConfig(
                "health_check_interval must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
