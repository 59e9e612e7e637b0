//! Core resource pool implementation

use crate::config::PoolConfig;
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{HealthCheckTask, SweepReport};
use crate::health::HealthStatus;
use crate::manager::ResourceManager;
use crate::member::{CheckIn, Checkout, Grant, GrantReceiver, MemberId, PoolState, Retired};
use crate::metrics::PoolMetrics;

#[cfg(feature = "prometheus")]
use crate::metrics::MetricsExporter;

use parking_lot::{Mutex, MutexGuard};
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// A borrowed resource that returns to the pool when dropped
pub struct PooledResource<M: ResourceManager> {
    resource: Option<M::Resource>,
    member_id: MemberId,
    created_at: Instant,
    pool: Arc<PoolInner<M>>,
}

impl<M: ResourceManager> PooledResource<M> {
    fn new(checkout: Checkout<M::Resource>, pool: Arc<PoolInner<M>>) -> Self {
        Self {
            resource: Some(checkout.handle),
            member_id: checkout.id,
            created_at: checkout.created_at,
            pool,
        }
    }

    /// Time since the underlying resource was created
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// Take the resource out of the pool for good.
    ///
    /// Its slot is freed, so the pool may create a replacement. The caller
    /// becomes responsible for closing it.
    pub fn detach(mut self) -> M::Resource {
        let resource = self.resource.take().expect("Value already taken");
        self.pool.detach_member(self.member_id);
        resource
    }
}

impl<M: ResourceManager> Deref for PooledResource<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        self.resource.as_ref().expect("Value already taken")
    }
}

impl<M: ResourceManager> DerefMut for PooledResource<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.resource.as_mut().expect("Value already taken")
    }
}

impl<M: ResourceManager> Drop for PooledResource<M> {
    fn drop(&mut self) {
        if let Some(resource) = self.resource.take() {
            self.pool.release_member(self.member_id, resource);
        }
    }
}

impl<M> fmt::Debug for PooledResource<M>
where
    M: ResourceManager,
    M::Resource: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledResource")
            .field("member_id", &self.member_id)
            .field("resource", &self.resource)
            .finish()
    }
}

/// Bounded pool of resources created on demand by a [`ResourceManager`]
///
/// Cloning is cheap; clones share the same members and wait queue.
///
/// # Examples
///
/// ```
/// use esox_resourcepool::{FnManager, PoolConfig, ResourcePool};
/// use std::io;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = FnManager::new(|| async { Ok::<_, io::Error>(String::from("connection")) });
/// let config = PoolConfig::new()
///     .with_min_size(1)
///     .with_max_size(4)
///     .with_acquire_timeout(Duration::from_secs(1));
///
/// let pool = ResourcePool::new(manager, config).await.unwrap();
/// {
///     let conn = pool.acquire().await.unwrap();
///     assert_eq!(conn.as_str(), "connection");
///     // Returned to the pool when `conn` goes out of scope
/// }
/// assert_eq!(pool.metrics().idle, 1);
///
/// pool.shutdown().await;
/// # }
/// ```
pub struct ResourcePool<M: ResourceManager> {
    inner: Arc<PoolInner<M>>,
}

impl<M: ResourceManager> Clone for ResourcePool<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: ResourceManager> fmt::Debug for ResourcePool<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourcePool")
            .field("config", &self.inner.config)
            .field("metrics", &self.metrics())
            .finish()
    }
}

impl<M: ResourceManager> ResourcePool<M> {
    /// Start configuring a pool around `manager`
    pub fn builder(manager: M) -> PoolBuilder<M> {
        PoolBuilder::new(manager)
    }

    /// Build a pool and warm it up to `config.min_size`
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub async fn new(manager: M, config: PoolConfig) -> PoolResult<Self> {
        Self::builder(manager).config(config).build().await
    }

    /// Borrow a resource, waiting up to `acquire_timeout` if the pool is at
    /// capacity
    ///
    /// # Errors
    ///
    /// - [`PoolError::ShuttingDown`] once [`shutdown`](Self::shutdown) began
    /// - [`PoolError::AcquireFailed`] when the factory fails
    /// - [`PoolError::AcquireTimeout`] when no member frees up in time
    pub async fn acquire(&self) -> PoolResult<PooledResource<M>> {
        let checkout = self.inner.acquire().await?;
        Ok(PooledResource::new(checkout, Arc::clone(&self.inner)))
    }

    /// Borrow a resource without queueing
    ///
    /// Returns `Ok(None)` when every member is borrowed and the pool is at
    /// capacity.
    pub async fn try_acquire(&self) -> PoolResult<Option<PooledResource<M>>> {
        let checkout = self.inner.try_acquire().await?;
        Ok(checkout.map(|checkout| PooledResource::new(checkout, Arc::clone(&self.inner))))
    }

    /// Return a borrowed resource. Equivalent to dropping it.
    pub fn release(&self, resource: PooledResource<M>) {
        if !Arc::ptr_eq(&resource.pool, &self.inner) {
            warn!(
                member_id = resource.member_id,
                "resource released through a pool that does not own it"
            );
        }
        drop(resource);
    }

    /// Snapshot of counts and timings
    pub fn metrics(&self) -> PoolMetrics {
        let state = self.inner.state.lock();
        state
            .metrics
            .snapshot(state.counts(), self.inner.config.max_size)
    }

    /// Get health status
    pub fn health_status(&self) -> HealthStatus {
        let state = self.inner.state.lock();
        HealthStatus::new(
            state.counts(),
            self.inner.config.min_size,
            self.inner.config.max_size,
            state.is_shutting_down(),
        )
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus format
    #[cfg(feature = "prometheus")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Run one health-check sweep now, independent of the background task
    pub async fn run_health_check(&self) -> SweepReport {
        self.inner.sweep().await
    }

    /// Fail all waiters, destroy every member and stop the health check.
    ///
    /// Members borrowed at this point are destroyed as soon as their
    /// borrowers release them. Calling this more than once is harmless.
    pub async fn shutdown(&self) {
        let drained = self.inner.state.lock().begin_shutdown(Instant::now());
        let Some(drained) = drained else {
            debug!("resource pool already shutting down");
            return;
        };

        info!(members = drained.len(), "shutting down resource pool");
        let mut borrowed = 0usize;
        for retired in drained {
            match retired.into_parts() {
                Some((id, handle)) => self.inner.destroy(id, handle).await,
                None => borrowed += 1,
            }
        }
        if borrowed > 0 {
            debug!(borrowed, "borrowed members will be destroyed on release");
        }

        let task = self.inner.health_task.lock().take();
        if let Some(task) = task {
            task.stop().await;
        }
        info!("resource pool shut down");
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        self.inner.state.lock().is_shutting_down()
    }

    /// The pool's configuration
    pub fn config(&self) -> &PoolConfig {
        &self.inner.config
    }

    /// The manager creating this pool's resources
    pub fn manager(&self) -> &M {
        &self.inner.manager
    }
}

/// Builder for [`ResourcePool`]
pub struct PoolBuilder<M: ResourceManager> {
    manager: M,
    config: PoolConfig,
}

impl<M: ResourceManager> PoolBuilder<M> {
    /// Create a builder with the default configuration
    pub fn new(manager: M) -> Self {
        Self {
            manager,
            config: PoolConfig::default(),
        }
    }

    /// Set the pool configuration
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate the configuration, warm up to `min_size` and start the
    /// health check.
    ///
    /// Factory failures during warm-up are logged; the pool is still built
    /// and creates members lazily.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime.
    pub async fn build(self) -> PoolResult<ResourcePool<M>> {
        self.config.validate()?;

        let runtime = Handle::current();
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState::new(&self.config)),
            manager: self.manager,
            config: self.config,
            runtime,
            health_task: Mutex::new(None),
        });

        let warmed = inner.replenish().await;

        if inner.config.health_check_enabled {
            let task = HealthCheckTask::spawn(
                Arc::downgrade(&inner),
                inner.config.health_check_interval,
                &inner.runtime,
            );
            *inner.health_task.lock() = Some(task);
        }

        info!(
            min_size = inner.config.min_size,
            max_size = inner.config.max_size,
            warmed,
            "resource pool created"
        );
        Ok(ResourcePool { inner })
    }
}

pub(crate) struct PoolInner<M: ResourceManager> {
    pub(crate) manager: M,
    pub(crate) config: PoolConfig,
    pub(crate) state: Mutex<PoolState<M::Resource>>,
    runtime: Handle,
    health_task: Mutex<Option<HealthCheckTask>>,
}

enum Step<M: ResourceManager> {
    Ready(Checkout<M::Resource>),
    Create(MemberId),
    Wait(Ticket<M>),
}

type Claim<M> = (Option<Step<M>>, Vec<Retired<<M as ResourceManager>::Resource>>);

impl<M: ResourceManager> PoolInner<M> {
    async fn acquire(self: &Arc<Self>) -> PoolResult<Checkout<M::Resource>> {
        let started = Instant::now();
        let (step, retired) = {
            let mut state = self.admit()?;
            let (step, retired) = self.claim(&mut state, started);
            let step = step.unwrap_or_else(|| {
                let (id, rx) = state.enqueue(started);
                Step::Wait(Ticket::new(self, id, rx))
            });
            (step, retired)
        };
        self.destroy_in_background(retired);

        let result = self.complete(step).await;
        self.record_outcome(started, &result);
        result
    }

    async fn try_acquire(self: &Arc<Self>) -> PoolResult<Option<Checkout<M::Resource>>> {
        let started = Instant::now();
        let (step, retired) = {
            let mut state = self.admit()?;
            self.claim(&mut state, started)
        };
        self.destroy_in_background(retired);

        let Some(step) = step else {
            return Ok(None);
        };
        let result = self.complete(step).await;
        self.record_outcome(started, &result);
        result.map(Some)
    }

    /// Count the request and lock the state, unless the pool is shutting down.
    fn admit(&self) -> PoolResult<MutexGuard<'_, PoolState<M::Resource>>> {
        let mut state = self.state.lock();
        state.metrics.record_request();
        if state.is_shutting_down() {
            return Err(PoolError::ShuttingDown);
        }
        Ok(state)
    }

    /// Take an idle member or spare capacity. `None` means the pool is full.
    fn claim(&self, state: &mut PoolState<M::Resource>, now: Instant) -> Claim<M> {
        let (checkout, retired) = state.checkout_idle(now, self.config.max_lifetime);
        let step = match checkout {
            Some(checkout) => Some(Step::Ready(checkout)),
            None => state.reserve_slot(now).map(Step::Create),
        };
        (step, retired)
    }

    async fn complete(self: &Arc<Self>, step: Step<M>) -> PoolResult<Checkout<M::Resource>> {
        match step {
            Step::Ready(checkout) => Ok(checkout),
            Step::Create(id) => self.create_member(id).await,
            Step::Wait(ticket) => self.wait(ticket).await,
        }
    }

    fn record_outcome(&self, started: Instant, result: &PoolResult<Checkout<M::Resource>>) {
        let mut state = self.state.lock();
        match result {
            Ok(checkout) => {
                state.metrics.record_acquired(started.elapsed());
                trace!(member_id = checkout.id, "resource acquired");
            }
            Err(PoolError::AcquireTimeout(_) | PoolError::AcquireFailed(_)) => {
                state.metrics.record_failure();
            }
            Err(_) => {}
        }
    }

    async fn wait(self: &Arc<Self>, mut ticket: Ticket<M>) -> PoolResult<Checkout<M::Resource>> {
        let timeout = self.config.acquire_timeout;
        trace!(waiter_id = ticket.id, "pool at capacity, waiting for a member");

        let grant = match tokio::time::timeout(timeout, &mut ticket.rx).await {
            Ok(Ok(grant)) => {
                ticket.armed = false;
                grant
            }
            Ok(Err(_)) => {
                ticket.armed = false;
                return Err(PoolError::ShuttingDown);
            }
            Err(_) => ticket.cancel(timeout)?,
        };

        match grant {
            Grant::Resource(checkout) => Ok(checkout),
            Grant::Slot(id) => self.create_member(id).await,
        }
    }

    async fn create_member(self: &Arc<Self>, id: MemberId) -> PoolResult<Checkout<M::Resource>> {
        let reservation = Reservation {
            pool: self,
            id,
            armed: true,
        };

        let handle = match self.manager.create().await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(member_id = id, error = %err, "resource factory failed");
                return Err(PoolError::acquire_failed(err));
            }
        };
        reservation.disarm();

        let created_at = self.state.lock().complete_creation(id, Instant::now());
        match created_at {
            Some(created_at) => {
                debug!(member_id = id, "created pool member");
                Ok(Checkout {
                    id,
                    handle,
                    created_at,
                })
            }
            None => {
                debug!(member_id = id, "pool shut down during creation, destroying new member");
                self.destroy(id, handle).await;
                Err(PoolError::ShuttingDown)
            }
        }
    }

    /// Create members until the pool holds `min_size` of them, making at
    /// most `min_size` attempts.
    pub(crate) async fn replenish(self: &Arc<Self>) -> usize {
        let mut created = 0;
        for _ in 0..self.config.min_size {
            let slot = {
                let mut state = self.state.lock();
                if state.len() >= self.config.min_size {
                    None
                } else {
                    state.reserve_slot(Instant::now())
                }
            };
            let Some(id) = slot else {
                break;
            };

            match self.create_member(id).await {
                Ok(checkout) => {
                    created += 1;
                    self.release_member(checkout.id, checkout.handle);
                }
                Err(err) => {
                    debug!(error = %err, "stopped filling warm set");
                    break;
                }
            }
        }
        created
    }

    pub(crate) fn release_member(self: &Arc<Self>, id: MemberId, handle: M::Resource) {
        let outcome = self
            .state
            .lock()
            .check_in(id, handle, Instant::now(), self.config.max_lifetime);

        match outcome {
            CheckIn::Idle => trace!(member_id = id, "member returned to pool"),
            CheckIn::HandedOff { waited } => {
                trace!(member_id = id, ?waited, "member handed to waiting caller");
            }
            CheckIn::Retired(retired) => {
                debug!(
                    member_id = id,
                    lifetime = ?retired.lifetime,
                    "member exceeded max lifetime"
                );
                self.destroy_in_background(vec![retired]);
            }
            CheckIn::Unknown(handle) => {
                warn!(member_id = id, "released resource is no longer a pool member, destroying it");
                self.spawn_destroy(vec![(id, handle)]);
            }
        }
    }

    fn detach_member(self: &Arc<Self>, id: MemberId) {
        self.state.lock().forget(id, Instant::now());
        debug!(member_id = id, "member detached from pool");
    }

    /// Run the destroyer, logging instead of propagating failures.
    pub(crate) async fn destroy(&self, id: MemberId, handle: M::Resource) {
        if let Err(err) = self.manager.destroy(handle).await {
            warn!(member_id = id, error = %err, "failed to destroy resource");
        }
    }

    fn destroy_in_background(self: &Arc<Self>, retired: Vec<Retired<M::Resource>>) {
        let doomed: Vec<_> = retired.into_iter().filter_map(Retired::into_parts).collect();
        self.spawn_destroy(doomed);
    }

    pub(crate) fn spawn_destroy(self: &Arc<Self>, doomed: Vec<(MemberId, M::Resource)>) {
        if doomed.is_empty() {
            return;
        }
        let pool = Arc::clone(self);
        drop(self.runtime.spawn(async move {
            for (id, handle) in doomed {
                pool.destroy(id, handle).await;
            }
        }));
    }
}

/// A queued acquire. Dropping it before it is served removes it from the
/// queue; a grant that raced the drop goes back to the pool.
struct Ticket<M: ResourceManager> {
    pool: Arc<PoolInner<M>>,
    id: u64,
    rx: GrantReceiver<M::Resource>,
    armed: bool,
}

impl<M: ResourceManager> Ticket<M> {
    fn new(pool: &Arc<PoolInner<M>>, id: u64, rx: GrantReceiver<M::Resource>) -> Self {
        Self {
            pool: Arc::clone(pool),
            id,
            rx,
            armed: true,
        }
    }

    /// Leave the queue after the deadline passed. A grant sent just before
    /// the waiter was removed is still honoured.
    fn cancel(&mut self, timeout: Duration) -> PoolResult<Grant<M::Resource>> {
        self.armed = false;
        if self.pool.state.lock().remove_waiter(self.id) {
            debug!(waiter_id = self.id, ?timeout, "acquire timed out");
            return Err(PoolError::AcquireTimeout(timeout));
        }
        self.rx.try_recv().map_err(|_| PoolError::ShuttingDown)
    }
}

impl<M: ResourceManager> Drop for Ticket<M> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let removed = self.pool.state.lock().remove_waiter(self.id);
        if !removed && let Ok(grant) = self.rx.try_recv() {
            match grant {
                Grant::Resource(checkout) => self.pool.release_member(checkout.id, checkout.handle),
                Grant::Slot(id) => self.pool.state.lock().forget(id, Instant::now()),
            }
        }
    }
}

/// Capacity held while the factory runs; released if creation does not
/// complete.
struct Reservation<'a, M: ResourceManager> {
    pool: &'a Arc<PoolInner<M>>,
    id: MemberId,
    armed: bool,
}

impl<M: ResourceManager> Reservation<'_, M> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl<M: ResourceManager> Drop for Reservation<'_, M> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.state.lock().forget(self.id, Instant::now());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::FnManager;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_manager(created: Arc<AtomicUsize>) -> FnManager<usize, io::Error> {
        FnManager::new(move || {
            let created = Arc::clone(&created);
            async move { Ok(created.fetch_add(1, Ordering::SeqCst)) }
        })
    }

    fn quiet_config() -> PoolConfig {
        PoolConfig::new().without_health_check()
    }

    #[tokio::test]
    async fn test_warm_up_creates_min_size() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(
            counting_manager(Arc::clone(&created)),
            quiet_config().with_min_size(3).with_max_size(5),
        )
        .await
        .unwrap();

        assert_eq!(created.load(Ordering::SeqCst), 3);
        let metrics = pool.metrics();
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.idle, 3);
        assert_eq!(metrics.total_created, 3);
    }

    #[tokio::test]
    async fn test_released_member_is_reused() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(counting_manager(Arc::clone(&created)), quiet_config())
            .await
            .unwrap();

        let first = *pool.acquire().await.unwrap();
        let second = *pool.acquire().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_acquire_does_not_queue() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(counting_manager(created), quiet_config().with_max_size(1))
            .await
            .unwrap();

        let held = pool.try_acquire().await.unwrap();
        assert!(held.is_some());
        assert!(pool.try_acquire().await.unwrap().is_none());

        let metrics = pool.metrics();
        assert_eq!(metrics.waiting, 0);
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.total_failures, 0);
    }

    #[tokio::test]
    async fn test_short_lifetime_does_not_stall_warm_up() {
        let created = Arc::new(AtomicUsize::new(0));
        let config = quiet_config()
            .with_min_size(2)
            .with_max_size(2)
            .with_max_lifetime(Duration::from_nanos(1));

        let pool = tokio::time::timeout(
            Duration::from_secs(1),
            ResourcePool::new(counting_manager(Arc::clone(&created)), config),
        )
        .await
        .expect("warm-up stalled")
        .unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 2);

        let report = tokio::time::timeout(Duration::from_secs(1), pool.run_health_check())
            .await
            .expect("sweep stalled");
        assert!(report.replenished <= 2);
        assert_eq!(created.load(Ordering::SeqCst), 2 + report.replenished);
    }

    #[tokio::test]
    async fn test_zero_lifetime_is_rejected() {
        let created = Arc::new(AtomicUsize::new(0));
        let config = quiet_config().with_min_size(1).with_max_lifetime(Duration::ZERO);
        let result = ResourcePool::new(counting_manager(created), config).await;
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let created = Arc::new(AtomicUsize::new(0));
        let result = ResourcePool::new(counting_manager(created), quiet_config().with_max_size(0)).await;
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_factory_failure_frees_slot() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let manager = FnManager::new(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"))
                } else {
                    Ok(attempt)
                }
            }
        });
        let pool = ResourcePool::new(manager, quiet_config().with_max_size(1))
            .await
            .unwrap();

        assert!(matches!(pool.acquire().await, Err(PoolError::AcquireFailed(_))));
        assert_eq!(pool.metrics().total, 0);

        let resource = pool.acquire().await.unwrap();
        assert_eq!(*resource, 1);

        let metrics = pool.metrics();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.total_failures, 1);
    }

    #[tokio::test]
    async fn test_detach_frees_capacity() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(
            counting_manager(Arc::clone(&created)),
            quiet_config().with_max_size(1),
        )
        .await
        .unwrap();

        let resource = pool.acquire().await.unwrap();
        let value = resource.detach();
        assert_eq!(value, 0);
        assert_eq!(pool.metrics().total, 0);

        let replacement = pool.acquire().await.unwrap();
        assert_eq!(*replacement, 1);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_queue() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(
            counting_manager(created),
            quiet_config()
                .with_max_size(1)
                .with_acquire_timeout(Duration::from_secs(5)),
        )
        .await
        .unwrap();

        let held = pool.acquire().await.unwrap();
        let waiting = tokio::time::timeout(Duration::from_millis(20), pool.acquire()).await;
        assert!(waiting.is_err());
        assert_eq!(pool.metrics().waiting, 0);

        drop(held);
        assert_eq!(pool.metrics().idle, 1);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let created = Arc::new(AtomicUsize::new(0));
        let pool = ResourcePool::new(counting_manager(created), quiet_config())
            .await
            .unwrap();

        let resource = pool.acquire().await.unwrap();
        assert_eq!(pool.metrics().active, 1);
        pool.release(resource);
        assert_eq!(pool.metrics().active, 0);
        assert_eq!(pool.metrics().idle, 1);
    }
}
