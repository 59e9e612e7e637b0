//! Health monitoring for resource pools

use crate::member::MemberCounts;

/// Health status of a resource pool
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
/// use std::io;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = FnManager::new(|| async { Ok::<_, io::Error>(0u8) });
/// let pool = ResourcePool::new(manager, PoolConfig::new().with_min_size(2))
///     .await
///     .unwrap();
///
/// let health = pool.health_status();
/// assert!(health.is_healthy());
/// assert_eq!(health.idle_members, 2);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Whether the pool is healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Current pool utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Idle members
    pub idle_members: usize,

    /// Borrowed members
    pub active_members: usize,

    /// Callers waiting for a member
    pub waiting_callers: usize,

    /// Total capacity
    pub max_size: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl HealthStatus {
    pub(crate) fn new(
        counts: MemberCounts,
        min_size: usize,
        max_size: usize,
        shutting_down: bool,
    ) -> Self {
        let utilization = if max_size > 0 {
            counts.active as f64 / max_size as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if shutting_down {
            warnings.push("Pool is shutting down".to_string());
            is_healthy = false;
        }

        if utilization > 0.9 {
            warnings.push(format!("High utilization: {:.1}%", utilization * 100.0));
            is_healthy = false;
        }

        if counts.waiting > 0 {
            warnings.push(format!("{} callers waiting for a member", counts.waiting));
            is_healthy = false;
        }

        if !shutting_down && counts.total < min_size {
            warnings.push(format!(
                "Below minimum size: {} of {} members",
                counts.total, min_size
            ));
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            idle_members: counts.idle,
            active_members: counts.active,
            waiting_callers: counts.waiting,
            max_size,
            warnings,
        }
    }

    /// Check if the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(active: usize, idle: usize, waiting: usize) -> MemberCounts {
        MemberCounts {
            active,
            idle,
            total: active + idle,
            waiting,
        }
    }

    #[test]
    fn test_quiet_pool_is_healthy() {
        let status = HealthStatus::new(counts(1, 3, 0), 2, 10, false);
        assert!(status.is_healthy());
        assert_eq!(status.warning_count, 0);
    }

    #[test]
    fn test_saturated_pool_warns() {
        let status = HealthStatus::new(counts(10, 0, 3), 0, 10, false);
        assert!(!status.is_healthy());
        assert_eq!(status.warning_count, 2);
        assert!(status.warnings[0].starts_with("High utilization"));
    }

    #[test]
    fn test_below_minimum_is_a_warning_only() {
        let status = HealthStatus::new(counts(0, 1, 0), 3, 10, false);
        assert!(status.is_healthy());
        assert_eq!(status.warning_count, 1);
    }

    #[test]
    fn test_shutting_down_is_unhealthy() {
        let status = HealthStatus::new(counts(0, 0, 0), 3, 10, true);
        assert!(!status.is_healthy());
        assert_eq!(status.warnings, vec!["Pool is shutting down".to_string()]);
    }
}
