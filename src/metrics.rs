//! Metrics collection and export for resource pools

use crate::member::MemberCounts;
use std::collections::HashMap;
use std::time::Duration;

#[cfg(feature = "serde")]
use serde::Serialize;

/// Point-in-time view of a pool
///
/// Built fresh on every call to [`ResourcePool::metrics`] and never updated
/// afterwards.
///
/// [`ResourcePool::metrics`]: crate::ResourcePool::metrics
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
/// use std::io;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = FnManager::new(|| async { Ok::<_, io::Error>(42u32) });
/// let pool = ResourcePool::new(manager, PoolConfig::new().with_max_size(4))
///     .await
///     .unwrap();
///
/// let conn = pool.acquire().await.unwrap();
/// let metrics = pool.metrics();
/// assert_eq!(metrics.total_requests, 1);
/// assert_eq!(metrics.active, 1);
/// assert_eq!(metrics.total, 1);
/// # drop(conn);
/// # }
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct PoolMetrics {
    /// Members currently borrowed
    pub active: usize,

    /// Members held by the pool
    pub idle: usize,

    /// All members
    pub total: usize,

    /// Callers queued for a member
    pub waiting: usize,

    /// Configured capacity
    pub max_size: usize,

    /// Acquire attempts since the pool was built
    pub total_requests: u64,

    /// Acquire attempts that timed out or whose factory call failed
    pub total_failures: u64,

    /// Members created by the factory
    pub total_created: u64,

    /// Members removed and passed to the destroyer
    pub total_destroyed: u64,

    /// Running average of successful acquire latency
    pub average_acquire_time: Duration,

    /// Average age of members at destruction
    pub average_lifetime: Duration,

    /// Active members relative to capacity (0.0 to 1.0)
    pub utilization: f64,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("active".to_string(), self.active.to_string());
        metrics.insert("idle".to_string(), self.idle.to_string());
        metrics.insert("total".to_string(), self.total.to_string());
        metrics.insert("waiting".to_string(), self.waiting.to_string());
        metrics.insert("max_size".to_string(), self.max_size.to_string());
        metrics.insert("total_requests".to_string(), self.total_requests.to_string());
        metrics.insert("total_failures".to_string(), self.total_failures.to_string());
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_destroyed".to_string(), self.total_destroyed.to_string());
        metrics.insert(
            "average_acquire_ms".to_string(),
            format!("{:.3}", self.average_acquire_time.as_secs_f64() * 1000.0),
        );
        metrics.insert(
            "average_lifetime_ms".to_string(),
            format!("{:.3}", self.average_lifetime.as_secs_f64() * 1000.0),
        );
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics
    }

    /// Fraction of acquire attempts that succeeded (1.0 when idle)
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 1.0;
        }
        let failures = self.total_failures.min(self.total_requests);
        (self.total_requests - failures) as f64 / self.total_requests as f64
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "prometheus")]
pub struct MetricsExporter;

#[cfg(feature = "prometheus")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus the given tags.
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
    /// use std::collections::HashMap;
    /// use std::io;
    ///
    /// # #[tokio::main]
    /// # async fn main() {
    /// let manager = FnManager::new(|| async { Ok::<_, io::Error>(1u8) });
    /// let pool = ResourcePool::new(manager, PoolConfig::default()).await.unwrap();
    ///
    /// let mut tags = HashMap::new();
    /// tags.insert("service".to_string(), "api".to_string());
    ///
    /// let output = pool.export_metrics_prometheus("my_pool", Some(&tags)).unwrap();
    /// assert!(output.contains("resourcepool_members_active"));
    /// assert!(output.contains("service=\"api\""));
    /// # }
    /// ```
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::errors::PoolResult<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Opts, Registry, TextEncoder};

        let mut labels = HashMap::new();
        labels.insert("pool".to_string(), pool_name.to_string());
        if let Some(tags) = tags {
            labels.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let opts = |name: &str, help: &str| {
            Opts::new(name, help)
                .namespace("resourcepool")
                .const_labels(labels.clone())
        };
        let registry = Registry::new();

        let gauges = [
            ("members_active", "Members currently borrowed", metrics.active),
            ("members_idle", "Members held by the pool", metrics.idle),
            ("members_total", "All pool members", metrics.total),
            ("waiters", "Callers queued for a member", metrics.waiting),
            ("max_size", "Configured pool capacity", metrics.max_size),
        ];
        for (name, help, value) in gauges {
            let gauge = IntGauge::with_opts(opts(name, help))?;
            gauge.set(i64::try_from(value).unwrap_or(i64::MAX));
            registry.register(Box::new(gauge))?;
        }

        let counters = [
            ("requests_total", "Acquire attempts", metrics.total_requests),
            ("failures_total", "Failed acquire attempts", metrics.total_failures),
            ("created_total", "Members created", metrics.total_created),
            ("destroyed_total", "Members destroyed", metrics.total_destroyed),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::with_opts(opts(name, help))?;
            counter.inc_by(value);
            registry.register(Box::new(counter))?;
        }

        let ratios = [
            ("utilization", "Active members relative to capacity", metrics.utilization),
            (
                "acquire_seconds_avg",
                "Average successful acquire latency",
                metrics.average_acquire_time.as_secs_f64(),
            ),
            (
                "lifetime_seconds_avg",
                "Average member age at destruction",
                metrics.average_lifetime.as_secs_f64(),
            ),
        ];
        for (name, help, value) in ratios {
            let gauge = Gauge::with_opts(opts(name, help))?;
            gauge.set(value);
            registry.register(Box::new(gauge))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| crate::errors::PoolError::MetricsExport(e.to_string()))
    }
}

/// Cumulative counters, kept inside the pool state
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    enabled: bool,
    total_requests: u64,
    total_failures: u64,
    total_created: u64,
    total_destroyed: u64,
    acquire_count: u64,
    acquire_time: Duration,
    lifetime_total: Duration,
}

impl MetricsTracker {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            ..Self::default()
        }
    }

    pub fn record_request(&mut self) {
        if self.enabled {
            self.total_requests += 1;
        }
    }

    pub fn record_failure(&mut self) {
        if self.enabled {
            self.total_failures += 1;
        }
    }

    pub fn record_acquired(&mut self, latency: Duration) {
        if self.enabled {
            self.acquire_count += 1;
            self.acquire_time += latency;
        }
    }

    pub fn record_created(&mut self) {
        if self.enabled {
            self.total_created += 1;
        }
    }

    pub fn record_destroyed(&mut self, lifetime: Duration) {
        if self.enabled {
            self.total_destroyed += 1;
            self.lifetime_total += lifetime;
        }
    }

    pub fn snapshot(&self, counts: MemberCounts, max_size: usize) -> PoolMetrics {
        let utilization = if max_size > 0 {
            counts.active as f64 / max_size as f64
        } else {
            0.0
        };

        PoolMetrics {
            active: counts.active,
            idle: counts.idle,
            total: counts.total,
            waiting: counts.waiting,
            max_size,
            total_requests: self.total_requests,
            total_failures: self.total_failures,
            total_created: self.total_created,
            total_destroyed: self.total_destroyed,
            average_acquire_time: average(self.acquire_time, self.acquire_count),
            average_lifetime: average(self.lifetime_total, self.total_destroyed),
            utilization,
        }
    }
}

fn average(total: Duration, count: u64) -> Duration {
    match u32::try_from(count) {
        Ok(0) => Duration::ZERO,
        Ok(count) => total / count,
        Err(_) => total.div_f64(count as f64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(active: usize, idle: usize) -> MemberCounts {
        MemberCounts {
            active,
            idle,
            total: active + idle,
            waiting: 0,
        }
    }

    #[test]
    fn test_averages() {
        let mut tracker = MetricsTracker::new(true);
        tracker.record_request();
        tracker.record_request();
        tracker.record_acquired(Duration::from_millis(10));
        tracker.record_acquired(Duration::from_millis(30));
        tracker.record_destroyed(Duration::from_secs(4));

        let metrics = tracker.snapshot(counts(1, 1), 4);
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.average_acquire_time, Duration::from_millis(20));
        assert_eq!(metrics.average_lifetime, Duration::from_secs(4));
        assert_eq!(metrics.total_destroyed, 1);
        assert!((metrics.utilization - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disabled_tracker_records_nothing() {
        let mut tracker = MetricsTracker::new(false);
        tracker.record_request();
        tracker.record_failure();
        tracker.record_created();

        let metrics = tracker.snapshot(counts(2, 0), 2);
        assert_eq!(metrics.total_requests, 0);
        assert_eq!(metrics.total_failures, 0);
        assert_eq!(metrics.total_created, 0);
        assert_eq!(metrics.active, 2);
    }

    #[test]
    fn test_success_rate() {
        let mut tracker = MetricsTracker::new(true);
        for _ in 0..4 {
            tracker.record_request();
        }
        tracker.record_failure();
        let metrics = tracker.snapshot(counts(0, 0), 1);
        assert!((metrics.success_rate() - 0.75).abs() < f64::EPSILON);
    }

    #[test]
    fn test_export_map() {
        let metrics = MetricsTracker::new(true).snapshot(counts(1, 2), 4);
        let exported = metrics.export();
        assert_eq!(exported.get("active"), Some(&"1".to_string()));
        assert_eq!(exported.get("idle"), Some(&"2".to_string()));
        assert_eq!(exported.get("utilization"), Some(&"0.25".to_string()));
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_prometheus_export() {
        let metrics = MetricsTracker::new(true).snapshot(counts(1, 0), 2);
        let output = MetricsExporter::export_prometheus(&metrics, "db", None).unwrap();
        assert!(output.contains("# TYPE resourcepool_members_active gauge"));
        assert!(output.contains("# TYPE resourcepool_requests_total counter"));
        assert!(output.contains("resourcepool_members_active{pool=\"db\"} 1"));
    }

    #[cfg(feature = "prometheus")]
    #[test]
    fn test_prometheus_rejects_bad_label() {
        let metrics = MetricsTracker::new(true).snapshot(counts(0, 0), 1);
        let mut tags = HashMap::new();
        tags.insert("not-a-label".to_string(), "x".to_string());
        let result = MetricsExporter::export_prometheus(&metrics, "db", Some(&tags));
        assert!(matches!(result, Err(crate::errors::PoolError::MetricsExport(_))));
    }
}
