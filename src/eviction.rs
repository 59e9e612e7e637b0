//! Background health checks and eviction of idle members

use crate::manager::ResourceManager;
use crate::member::{CheckIn, MemberId, Verdict};
use crate::pool::PoolInner;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

/// Why the health check removed a member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EvictionReason {
    /// The validator rejected it or failed
    Unhealthy,

    /// Older than `max_lifetime`
    Expired,

    /// Idle longer than `idle_timeout` while the pool was above `min_size`
    Idle,
}

/// Outcome of one health-check sweep
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
/// use std::io;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = FnManager::new(|| async { Ok::<_, io::Error>(0u8) })
///     .with_validator(|_: &u8| false);
/// let config = PoolConfig::new().with_min_size(2).without_health_check();
/// let pool = ResourcePool::new(manager, config).await.unwrap();
///
/// let report = pool.run_health_check().await;
/// assert_eq!(report.validated, 2);
/// assert_eq!(report.unhealthy, 2);
/// // The warm set is refilled after eviction
/// assert_eq!(report.replenished, 2);
/// # }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Idle members passed to the validator
    pub validated: usize,

    /// Members evicted because they failed validation
    pub unhealthy: usize,

    /// Members evicted for exceeding their lifetime
    pub expired: usize,

    /// Members evicted for sitting idle
    pub idle: usize,

    /// Members created to restore the warm set
    pub replenished: usize,
}

impl SweepReport {
    /// Total members evicted
    pub fn evicted(&self) -> usize {
        self.unhealthy + self.expired + self.idle
    }

    fn record(&mut self, reason: EvictionReason) {
        match reason {
            EvictionReason::Unhealthy => self.unhealthy += 1,
            EvictionReason::Expired => self.expired += 1,
            EvictionReason::Idle => self.idle += 1,
        }
    }
}

/// An idle member taken out for validation. If the sweep is dropped midway,
/// the member goes back to the pool unjudged.
struct Inspection<'a, M: ResourceManager> {
    pool: &'a Arc<PoolInner<M>>,
    id: MemberId,
    handle: Option<M::Resource>,
}

impl<M: ResourceManager> Inspection<'_, M> {
    async fn validate(&mut self) -> bool {
        let Some(handle) = self.handle.as_mut() else {
            return false;
        };
        match self.pool.manager.validate(handle).await {
            Ok(healthy) => healthy,
            Err(err) => {
                warn!(member_id = self.id, error = %err, "validation failed, treating member as unhealthy");
                false
            }
        }
    }

    fn finish(mut self, healthy: bool) -> Option<Verdict<M::Resource>> {
        let handle = self.handle.take()?;
        let verdict = self.pool.state.lock().finish_inspection(
            self.id,
            handle,
            healthy,
            Instant::now(),
            &self.pool.config,
        );
        Some(verdict)
    }
}

impl<M: ResourceManager> Drop for Inspection<'_, M> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            let outcome = self.pool.state.lock().restore(self.id, handle, Instant::now());
            if let CheckIn::Unknown(handle) = outcome {
                self.pool.spawn_destroy(vec![(self.id, handle)]);
            }
        }
    }
}

impl<M: ResourceManager> PoolInner<M> {
    /// Validate every idle member once, evict what should go, then refill
    /// the warm set. One member's failure never stops the sweep.
    pub(crate) async fn sweep(self: &Arc<Self>) -> SweepReport {
        let mut report = SweepReport::default();
        let ids = self.state.lock().idle_ids();

        for id in ids {
            let handle = self.state.lock().begin_inspection(id);
            let Some(handle) = handle else {
                continue;
            };

            let mut inspection = Inspection {
                pool: self,
                id,
                handle: Some(handle),
            };
            let healthy = inspection.validate().await;
            report.validated += 1;

            match inspection.finish(healthy) {
                Some(Verdict::Evicted(reason, retired)) => {
                    report.record(reason);
                    debug!(
                        member_id = id,
                        ?reason,
                        lifetime = ?retired.lifetime,
                        "evicting pool member"
                    );
                    if let Some((id, handle)) = retired.into_parts() {
                        self.destroy(id, handle).await;
                    }
                }
                Some(Verdict::Orphaned(handle)) => self.destroy(id, handle).await,
                Some(Verdict::Kept) | None => {}
            }
        }

        report.replenished = self.replenish().await;
        report
    }
}

/// Handle to the periodic health-check task
pub(crate) struct HealthCheckTask {
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl HealthCheckTask {
    /// The task holds only a weak reference and ends on its own once the
    /// pool is gone.
    pub fn spawn<M: ResourceManager>(
        pool: Weak<PoolInner<M>>,
        interval: Duration,
        runtime: &Handle,
    ) -> Self {
        let (stop, mut stopped) = watch::channel(false);

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    changed = stopped.changed() => {
                        if changed.is_err() || *stopped.borrow() {
                            break;
                        }
                    }
                }

                let Some(pool) = pool.upgrade() else {
                    break;
                };
                let report = tokio::select! {
                    report = pool.sweep() => report,
                    _ = stopped.changed() => break,
                };
                if report.evicted() > 0 || report.replenished > 0 {
                    debug!(
                        validated = report.validated,
                        unhealthy = report.unhealthy,
                        expired = report.expired,
                        idle = report.idle,
                        replenished = report.replenished,
                        "health check evicted members"
                    );
                } else {
                    trace!(validated = report.validated, "health check completed");
                }
            }
            trace!("health check task stopped");
        });

        Self { stop, handle }
    }

    pub async fn stop(self) {
        let _ = self.stop.send(true);
        if let Err(err) = self.handle.await
            && err.is_panic()
        {
            warn!(error = %err, "health check task panicked");
        }
    }
}
