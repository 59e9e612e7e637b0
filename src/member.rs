//! Member bookkeeping and the state shared behind the pool's lock

use crate::config::PoolConfig;
use crate::eviction::EvictionReason;
use crate::metrics::MetricsTracker;
use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

pub(crate) type MemberId = u64;

/// One pooled resource plus its bookkeeping.
///
/// `handle` is `None` whenever something outside the lock owns the resource:
/// a borrower, the health check, or a factory call still in flight.
#[derive(Debug)]
pub(crate) struct Member<T> {
    pub id: MemberId,
    handle: Option<T>,
    pub created_at: Instant,
    pub last_used: Instant,
    pub in_use: bool,
    pub inspecting: bool,
    pub healthy: bool,
    /// Reserved for a factory call that has not returned yet
    pub pending: bool,
}

impl<T> Member<T> {
    fn reserved(id: MemberId, now: Instant) -> Self {
        Self {
            id,
            handle: None,
            created_at: now,
            last_used: now,
            in_use: true,
            inspecting: false,
            healthy: true,
            pending: true,
        }
    }

    pub fn is_available(&self) -> bool {
        !self.in_use && self.healthy && self.handle.is_some()
    }

    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used)
    }

    pub fn is_past_lifetime(&self, max_lifetime: Duration, now: Instant) -> bool {
        self.age(now) > max_lifetime
    }
}

/// A resource leaving the lock for a borrower.
#[derive(Debug)]
pub(crate) struct Checkout<T> {
    pub id: MemberId,
    pub handle: T,
    pub created_at: Instant,
}

/// What a queued waiter receives.
#[derive(Debug)]
pub(crate) enum Grant<T> {
    /// A released member, handed over without ever becoming idle.
    Resource(Checkout<T>),
    /// Capacity freed by a destruction; the waiter creates the member itself.
    Slot(MemberId),
}

/// Dropping the sender without a grant tells the waiter the pool shut down.
pub(crate) type GrantReceiver<T> = oneshot::Receiver<Grant<T>>;

struct Waiter<T> {
    id: u64,
    arrived_at: Instant,
    tx: oneshot::Sender<Grant<T>>,
}

/// A member removed from the set, to be passed to the destroyer.
#[derive(Debug)]
pub(crate) struct Retired<T> {
    pub id: MemberId,
    pub handle: Option<T>,
    pub lifetime: Duration,
}

impl<T> Retired<T> {
    /// Placeholders still being created or borrowed elsewhere have no handle.
    pub fn into_parts(self) -> Option<(MemberId, T)> {
        let id = self.id;
        self.handle.map(|handle| (id, handle))
    }
}

#[derive(Debug)]
pub(crate) enum CheckIn<T> {
    Idle,
    HandedOff { waited: Duration },
    Retired(Retired<T>),
    /// The member no longer exists, e.g. after shutdown.
    Unknown(T),
}

#[derive(Debug)]
pub(crate) enum Verdict<T> {
    Kept,
    Evicted(EvictionReason, Retired<T>),
    Orphaned(T),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct MemberCounts {
    pub active: usize,
    pub idle: usize,
    pub total: usize,
    pub waiting: usize,
}

pub(crate) struct PoolState<T> {
    members: HashMap<MemberId, Member<T>>,
    waiters: VecDeque<Waiter<T>>,
    max_size: usize,
    next_member_id: MemberId,
    next_waiter_id: u64,
    shutting_down: bool,
    /// Creation times of members drained at shutdown while borrowed
    departed: HashMap<MemberId, Instant>,
    pub metrics: MetricsTracker,
}

impl<T> PoolState<T> {
    pub fn new(config: &PoolConfig) -> Self {
        Self {
            members: HashMap::with_capacity(config.max_size),
            waiters: VecDeque::new(),
            max_size: config.max_size,
            next_member_id: 0,
            next_waiter_id: 0,
            shutting_down: false,
            departed: HashMap::new(),
            metrics: MetricsTracker::new(config.metrics_enabled),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn counts(&self) -> MemberCounts {
        let active = self
            .members
            .values()
            .filter(|m| m.in_use && !m.inspecting)
            .count();
        MemberCounts {
            active,
            idle: self.members.len() - active,
            total: self.members.len(),
            waiting: self.waiters.len(),
        }
    }

    /// Hand out any idle healthy member. Idle members that are unhealthy or
    /// past their lifetime are removed on the way and returned for teardown.
    pub fn checkout_idle(
        &mut self,
        now: Instant,
        max_lifetime: Duration,
    ) -> (Option<Checkout<T>>, Vec<Retired<T>>) {
        let stale: Vec<MemberId> = self
            .members
            .values()
            .filter(|m| {
                !m.in_use
                    && m.handle.is_some()
                    && (!m.healthy || m.is_past_lifetime(max_lifetime, now))
            })
            .map(|m| m.id)
            .collect();
        let mut retired = Vec::with_capacity(stale.len());
        for id in stale {
            if let Some(member) = self.members.remove(&id) {
                retired.push(self.retire(member, None, now));
            }
        }
        if !retired.is_empty() {
            self.grant_slots(now);
        }

        let checkout = self
            .members
            .values_mut()
            .find(|m| m.is_available())
            .and_then(|member| {
                let handle = member.handle.take()?;
                member.in_use = true;
                member.last_used = now;
                Some(Checkout {
                    id: member.id,
                    handle,
                    created_at: member.created_at,
                })
            });

        (checkout, retired)
    }

    /// Claim capacity for a member that is about to be created.
    pub fn reserve_slot(&mut self, now: Instant) -> Option<MemberId> {
        if self.shutting_down || self.members.len() >= self.max_size {
            return None;
        }
        Some(self.insert_reserved(now))
    }

    fn insert_reserved(&mut self, now: Instant) -> MemberId {
        let id = self.next_member_id;
        self.next_member_id += 1;
        self.members.insert(id, Member::reserved(id, now));
        id
    }

    /// Returns the creation timestamp, or `None` if the slot vanished
    /// (the pool shut down while the factory was running).
    pub fn complete_creation(&mut self, id: MemberId, now: Instant) -> Option<Instant> {
        let member = self.members.get_mut(&id)?;
        member.created_at = now;
        member.last_used = now;
        member.pending = false;
        self.metrics.record_created();
        Some(now)
    }

    /// Give up a slot whose member was never created or was detached.
    pub fn forget(&mut self, id: MemberId, now: Instant) {
        if self.members.remove(&id).is_some() {
            self.grant_slots(now);
        }
    }

    pub fn enqueue(&mut self, now: Instant) -> (u64, GrantReceiver<T>) {
        let (tx, rx) = oneshot::channel();
        let id = self.next_waiter_id;
        self.next_waiter_id += 1;
        self.waiters.push_back(Waiter {
            id,
            arrived_at: now,
            tx,
        });
        (id, rx)
    }

    /// Returns `false` if the waiter was already served.
    pub fn remove_waiter(&mut self, id: u64) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Return a borrowed member to the pool.
    pub fn check_in(
        &mut self,
        id: MemberId,
        handle: T,
        now: Instant,
        max_lifetime: Duration,
    ) -> CheckIn<T> {
        let Some(member) = self.members.get_mut(&id) else {
            self.orphan(id, now);
            return CheckIn::Unknown(handle);
        };
        member.in_use = false;
        member.last_used = now;

        let expired = member.is_past_lifetime(max_lifetime, now);
        if expired && let Some(member) = self.members.remove(&id) {
            let retired = self.retire(member, Some(handle), now);
            self.grant_slots(now);
            return CheckIn::Retired(retired);
        }

        self.park(id, handle, now)
    }

    /// Pass the member to the oldest live waiter, or leave it idle.
    fn park(&mut self, id: MemberId, handle: T, now: Instant) -> CheckIn<T> {
        let Some(created_at) = self.members.get(&id).map(|m| m.created_at) else {
            return CheckIn::Unknown(handle);
        };

        let grant = Grant::Resource(Checkout {
            id,
            handle,
            created_at,
        });
        let outcome = self.offer(grant, now);

        let Some(member) = self.members.get_mut(&id) else {
            return CheckIn::Idle;
        };
        match outcome {
            Ok(waited) => {
                member.in_use = true;
                member.last_used = now;
                CheckIn::HandedOff { waited }
            }
            Err(grant) => {
                if let Grant::Resource(checkout) = grant {
                    member.handle = Some(checkout.handle);
                }
                member.in_use = false;
                CheckIn::Idle
            }
        }
    }

    /// Offer a grant to waiters in arrival order. Hands the grant back if
    /// nobody is left to take it.
    fn offer(&mut self, mut grant: Grant<T>, now: Instant) -> Result<Duration, Grant<T>> {
        while let Some(waiter) = self.waiters.pop_front() {
            match waiter.tx.send(grant) {
                Ok(()) => return Ok(now.saturating_duration_since(waiter.arrived_at)),
                Err(rejected) => grant = rejected,
            }
        }
        Err(grant)
    }

    /// Turn free capacity into creation slots for queued waiters.
    fn grant_slots(&mut self, now: Instant) {
        while !self.shutting_down
            && !self.waiters.is_empty()
            && self.members.len() < self.max_size
        {
            let id = self.insert_reserved(now);
            if self.offer(Grant::Slot(id), now).is_err() {
                self.members.remove(&id);
                break;
            }
        }
    }

    /// Turn a removed member into a teardown job. Only members that still
    /// have a handle count as destroyed here.
    fn retire(&mut self, member: Member<T>, returning: Option<T>, now: Instant) -> Retired<T> {
        let lifetime = member.age(now);
        let handle = member.handle.or(returning);
        if handle.is_some() {
            self.metrics.record_destroyed(lifetime);
        }
        Retired {
            id: member.id,
            handle,
            lifetime,
        }
    }

    /// A handle came back for a member that no longer exists. If it was
    /// drained at shutdown while borrowed, its destruction is counted now.
    fn orphan(&mut self, id: MemberId, now: Instant) {
        if let Some(created_at) = self.departed.remove(&id) {
            self.metrics
                .record_destroyed(now.saturating_duration_since(created_at));
        }
    }

    /// Ids of members idle right now, for the health check to visit.
    pub fn idle_ids(&self) -> Vec<MemberId> {
        self.members
            .values()
            .filter(|m| !m.in_use && m.handle.is_some())
            .map(|m| m.id)
            .collect()
    }

    /// Take an idle member's handle for validation. Acquirers skip it until
    /// it is finished or restored.
    pub fn begin_inspection(&mut self, id: MemberId) -> Option<T> {
        let member = self.members.get_mut(&id)?;
        if member.in_use {
            return None;
        }
        let handle = member.handle.take()?;
        member.in_use = true;
        member.inspecting = true;
        Some(handle)
    }

    pub fn finish_inspection(
        &mut self,
        id: MemberId,
        handle: T,
        healthy: bool,
        now: Instant,
        config: &PoolConfig,
    ) -> Verdict<T> {
        let above_floor = self.members.len() > config.min_size;
        let Some(member) = self.members.get_mut(&id) else {
            self.orphan(id, now);
            return Verdict::Orphaned(handle);
        };
        member.in_use = false;
        member.inspecting = false;
        member.healthy = healthy;

        let reason = if !healthy {
            Some(EvictionReason::Unhealthy)
        } else if member.is_past_lifetime(config.max_lifetime, now) {
            Some(EvictionReason::Expired)
        } else if above_floor && member.idle_for(now) > config.idle_timeout {
            Some(EvictionReason::Idle)
        } else {
            None
        };

        match reason {
            Some(reason) => match self.members.remove(&id) {
                Some(member) => {
                    let retired = self.retire(member, Some(handle), now);
                    self.grant_slots(now);
                    Verdict::Evicted(reason, retired)
                }
                None => Verdict::Orphaned(handle),
            },
            None => match self.restore(id, handle, now) {
                CheckIn::Unknown(handle) => Verdict::Orphaned(handle),
                _ => Verdict::Kept,
            },
        }
    }

    /// Put an inspected member back without judging it.
    pub fn restore(&mut self, id: MemberId, handle: T, now: Instant) -> CheckIn<T> {
        match self.members.get_mut(&id) {
            Some(member) => {
                member.inspecting = false;
                member.in_use = false;
            }
            None => {
                self.orphan(id, now);
                return CheckIn::Unknown(handle);
            }
        }
        self.park(id, handle, now)
    }

    /// Flip into shutdown. Drops every waiter's sender and drains the member
    /// set. Returns `None` if shutdown already began.
    pub fn begin_shutdown(&mut self, now: Instant) -> Option<Vec<Retired<T>>> {
        if self.shutting_down {
            return None;
        }
        self.shutting_down = true;
        self.waiters.clear();

        let drained: Vec<Member<T>> = self.members.drain().map(|(_, member)| member).collect();
        let mut retired = Vec::with_capacity(drained.len());
        for member in drained {
            if member.handle.is_none() && !member.pending {
                self.departed.insert(member.id, member.created_at);
            }
            retired.push(self.retire(member, None, now));
        }
        Some(retired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(max_size: usize) -> PoolState<&'static str> {
        PoolState::new(&PoolConfig::new().with_max_size(max_size))
    }

    fn add_idle(state: &mut PoolState<&'static str>, handle: &'static str, now: Instant) -> MemberId {
        let id = state.reserve_slot(now).unwrap();
        state.complete_creation(id, now).unwrap();
        assert!(matches!(
            state.check_in(id, handle, now, Duration::from_secs(60)),
            CheckIn::Idle
        ));
        id
    }

    #[test]
    fn test_reserve_respects_capacity() {
        let mut state = state(2);
        let now = Instant::now();
        assert!(state.reserve_slot(now).is_some());
        assert!(state.reserve_slot(now).is_some());
        assert!(state.reserve_slot(now).is_none());
        assert_eq!(state.counts().total, 2);
        assert_eq!(state.counts().active, 2);
    }

    #[test]
    fn test_checkout_marks_member_in_use() {
        let mut state = state(2);
        let now = Instant::now();
        let id = add_idle(&mut state, "a", now);

        let (checkout, retired) = state.checkout_idle(now, Duration::from_secs(60));
        let checkout = checkout.unwrap();
        assert_eq!(checkout.id, id);
        assert_eq!(checkout.handle, "a");
        assert!(retired.is_empty());

        let (again, _) = state.checkout_idle(now, Duration::from_secs(60));
        assert!(again.is_none());
    }

    #[test]
    fn test_checkout_skips_expired_members() {
        let mut state = state(2);
        let start = Instant::now();
        add_idle(&mut state, "old", start);

        let later = start + Duration::from_secs(10);
        let (checkout, retired) = state.checkout_idle(later, Duration::from_secs(5));
        assert!(checkout.is_none());
        assert_eq!(retired.len(), 1);
        assert_eq!(retired[0].handle, Some("old"));
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_release_hands_off_to_oldest_waiter() {
        let mut state = state(1);
        let now = Instant::now();
        let id = state.reserve_slot(now).unwrap();
        state.complete_creation(id, now);

        let (_, mut first) = state.enqueue(now);
        let (_, mut second) = state.enqueue(now);

        let outcome = state.check_in(id, "a", now, Duration::from_secs(60));
        assert!(matches!(outcome, CheckIn::HandedOff { .. }));
        assert!(matches!(first.try_recv(), Ok(Grant::Resource(c)) if c.handle == "a"));
        assert!(second.try_recv().is_err());
        assert_eq!(state.counts().active, 1);
        assert_eq!(state.counts().idle, 0);
    }

    #[test]
    fn test_dropped_waiter_is_skipped() {
        let mut state = state(1);
        let now = Instant::now();
        let id = state.reserve_slot(now).unwrap();
        state.complete_creation(id, now);

        let (_, gone) = state.enqueue(now);
        drop(gone);

        let outcome = state.check_in(id, "a", now, Duration::from_secs(60));
        assert!(matches!(outcome, CheckIn::Idle));
        assert_eq!(state.counts().idle, 1);
    }

    #[test]
    fn test_expired_release_grants_slot_to_waiter() {
        let mut state = state(1);
        let start = Instant::now();
        let id = state.reserve_slot(start).unwrap();
        state.complete_creation(id, start);
        let (_, mut waiter) = state.enqueue(start);

        let later = start + Duration::from_secs(10);
        let outcome = state.check_in(id, "a", later, Duration::from_secs(5));
        assert!(matches!(outcome, CheckIn::Retired(ref r) if r.handle == Some("a")));
        assert!(matches!(waiter.try_recv(), Ok(Grant::Slot(slot)) if slot != id));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_remove_waiter() {
        let mut state = state(1);
        let now = Instant::now();
        let (first, _rx1) = state.enqueue(now);
        let (second, _rx2) = state.enqueue(now);

        assert!(state.remove_waiter(first));
        assert!(!state.remove_waiter(first));
        assert_eq!(state.counts().waiting, 1);
        assert!(state.remove_waiter(second));
    }

    #[test]
    fn test_inspection_respects_min_size() {
        let config = PoolConfig::new()
            .with_min_size(1)
            .with_max_size(2)
            .with_idle_timeout(Duration::from_secs(1));
        let mut state: PoolState<&'static str> = PoolState::new(&config);
        let start = Instant::now();
        let a = add_idle(&mut state, "a", start);
        let b = add_idle(&mut state, "b", start);

        let later = start + Duration::from_secs(5);
        let handle = state.begin_inspection(a).unwrap();
        let verdict = state.finish_inspection(a, handle, true, later, &config);
        assert!(matches!(verdict, Verdict::Evicted(EvictionReason::Idle, _)));

        let handle = state.begin_inspection(b).unwrap();
        let verdict = state.finish_inspection(b, handle, true, later, &config);
        assert!(matches!(verdict, Verdict::Kept));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_unhealthy_member_is_evicted_regardless_of_floor() {
        let config = PoolConfig::new().with_min_size(1).with_max_size(1);
        let mut state: PoolState<&'static str> = PoolState::new(&config);
        let now = Instant::now();
        let id = add_idle(&mut state, "a", now);

        let handle = state.begin_inspection(id).unwrap();
        let verdict = state.finish_inspection(id, handle, false, now, &config);
        assert!(matches!(verdict, Verdict::Evicted(EvictionReason::Unhealthy, _)));
        assert_eq!(state.len(), 0);
    }

    #[test]
    fn test_shutdown_drains_everything_once() {
        let mut state = state(3);
        let now = Instant::now();
        add_idle(&mut state, "a", now);
        state.reserve_slot(now);
        let (_, mut waiter) = state.enqueue(now);

        let drained = state.begin_shutdown(now).unwrap();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained.iter().filter(|r| r.handle.is_some()).count(), 1);
        assert!(matches!(
            waiter.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
        assert!(state.begin_shutdown(now).is_none());
        assert!(state.reserve_slot(now).is_none());
    }

    #[test]
    fn test_shutdown_counts_only_real_destructions() {
        let mut state = state(3);
        let start = Instant::now();
        add_idle(&mut state, "a", start);
        state.reserve_slot(start);
        let borrowed = state.reserve_slot(start).unwrap();
        state.complete_creation(borrowed, start);

        state.begin_shutdown(start).unwrap();
        let metrics = state.metrics.snapshot(state.counts(), 3);
        assert_eq!(metrics.total_destroyed, 1);

        let later = start + Duration::from_secs(4);
        assert!(matches!(
            state.check_in(borrowed, "b", later, Duration::from_secs(60)),
            CheckIn::Unknown("b")
        ));
        let metrics = state.metrics.snapshot(state.counts(), 3);
        assert_eq!(metrics.total_destroyed, 2);
        assert_eq!(metrics.average_lifetime, Duration::from_secs(2));

        // A second return of the same id is not counted again
        state.check_in(borrowed, "b", later, Duration::from_secs(60));
        assert_eq!(state.metrics.snapshot(state.counts(), 3).total_destroyed, 2);
    }
}
