//! Cooperative mutex implementation

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};

use tracing::{debug, warn};

use crate::domain::ActorId;
use crate::error::SimError;

use super::waiter::{MutexSnapshot, Waiter};

/// Internal state, only touched between suspension points
#[derive(Debug, Default)]
struct MutexState {
    locked: bool,
    owner: Option<ActorId>,

    /// Callers waiting for the lock, FIFO
    acquire_queue: VecDeque<Waiter>,

    /// Callers parked on a named condition, FIFO per condition
    conditions: BTreeMap<String, VecDeque<Waiter>>,

    /// Releases attempted without ownership
    misuse_count: u64,
}

impl MutexState {
    /// Hand the lock to the oldest live acquire-waiter, or mark it free.
    ///
    /// Returns the new owner.
    fn hand_off(&mut self) -> Option<ActorId> {
        while let Some(waiter) = self.acquire_queue.pop_front() {
            let owner = waiter.owner;
            self.locked = true;
            self.owner = Some(owner);
            if waiter.tx.send(()).is_ok() {
                debug!(%owner, "MutexState::hand_off: lock transferred");
                return Some(owner);
            }
            debug!(%owner, "MutexState::hand_off: waiter abandoned, skipping");
        }

        self.locked = false;
        self.owner = None;
        None
    }

    /// Put a woken condition waiter back on the acquire path
    fn enqueue_acquire(&mut self, waiter: Waiter) {
        if self.locked {
            self.acquire_queue.push_back(waiter);
            return;
        }

        let owner = waiter.owner;
        self.locked = true;
        self.owner = Some(owner);
        if waiter.tx.send(()).is_err() {
            debug!(%owner, "MutexState::enqueue_acquire: waiter abandoned on grant");
            self.hand_off();
        }
    }

    /// Pop the oldest live waiter from a condition queue
    fn pop_condition(&mut self, condition: &str) -> Option<Waiter> {
        let queue = self.conditions.get_mut(condition)?;
        while let Some(waiter) = queue.pop_front() {
            if !waiter.is_abandoned() {
                return Some(waiter);
            }
        }
        None
    }

    fn record_misuse(&mut self, by: ActorId) -> SimError {
        self.misuse_count += 1;
        warn!(%by, owner = ?self.owner, locked = self.locked, "Lock misuse: release without ownership");
        SimError::LockMisuse { by, owner: self.owner }
    }
}

/// Binary lock with FIFO hand-off and named condition variables
///
/// Single-threaded and cooperative: every operation completes synchronously
/// except `acquire` and `wait`, which suspend on a oneshot handle until the
/// mutex resolves it.
#[derive(Debug, Default)]
pub struct CooperativeMutex {
    state: RefCell<MutexState>,
}

impl CooperativeMutex {
    /// Create an unlocked mutex with empty queues
    pub fn new() -> Self {
        debug!("CooperativeMutex::new: called");
        Self::default()
    }

    /// Take the lock if it is free. Never suspends.
    pub fn try_acquire(&self, owner: ActorId) -> bool {
        debug!(%owner, "CooperativeMutex::try_acquire: called");
        let mut state = self.state.borrow_mut();
        if state.locked {
            return false;
        }
        state.locked = true;
        state.owner = Some(owner);
        true
    }

    /// Acquire the lock, suspending FIFO behind earlier callers if it is held
    pub async fn acquire(&self, owner: ActorId) -> Result<(), SimError> {
        debug!(%owner, "CooperativeMutex::acquire: called");
        let rx = {
            let mut state = self.state.borrow_mut();
            if !state.locked {
                debug!(%owner, "CooperativeMutex::acquire: free, granted immediately");
                state.locked = true;
                state.owner = Some(owner);
                return Ok(());
            }

            debug!(%owner, position = state.acquire_queue.len() + 1, "CooperativeMutex::acquire: held, queuing");
            let (waiter, rx) = Waiter::new(owner);
            state.acquire_queue.push_back(waiter);
            rx
        };

        rx.await.map_err(|_| SimError::WaitAbandoned { actor: owner })
    }

    /// Release the lock held by `owner`, handing it to the next waiter
    ///
    /// Releasing a lock that is free or held by someone else changes nothing
    /// and returns `LockMisuse`.
    pub fn release(&self, owner: ActorId) -> Result<Option<ActorId>, SimError> {
        debug!(%owner, "CooperativeMutex::release: called");
        let mut state = self.state.borrow_mut();
        if !state.locked || state.owner != Some(owner) {
            return Err(state.record_misuse(owner));
        }
        Ok(state.hand_off())
    }

    /// Release regardless of ownership (failure recovery)
    pub fn force_release(&self) -> Option<ActorId> {
        debug!("CooperativeMutex::force_release: called");
        let mut state = self.state.borrow_mut();
        if !state.locked {
            return None;
        }
        warn!(owner = ?state.owner, "Forcibly releasing mutex");
        state.hand_off()
    }

    /// Atomically release the lock and park on `condition`
    ///
    /// Returns only once the lock has been re-acquired, so callers must
    /// re-check their predicate in a loop.
    pub async fn wait(&self, condition: &str, owner: ActorId) -> Result<(), SimError> {
        debug!(%owner, %condition, "CooperativeMutex::wait: called");
        let rx = {
            let mut state = self.state.borrow_mut();
            if !state.locked || state.owner != Some(owner) {
                return Err(state.record_misuse(owner));
            }

            let (waiter, rx) = Waiter::new(owner);
            state.conditions.entry(condition.to_string()).or_default().push_back(waiter);
            state.hand_off();
            rx
        };

        rx.await.map_err(|_| SimError::WaitAbandoned { actor: owner })
    }

    /// Wake the oldest waiter on `condition` onto the acquire path
    pub fn notify(&self, condition: &str) -> Option<ActorId> {
        debug!(%condition, "CooperativeMutex::notify: called");
        let mut state = self.state.borrow_mut();
        let waiter = state.pop_condition(condition)?;
        let woken = waiter.owner;
        state.enqueue_acquire(waiter);
        debug!(%condition, %woken, "CooperativeMutex::notify: woke waiter");
        Some(woken)
    }

    /// Wake every waiter on `condition`, preserving their order
    pub fn notify_all(&self, condition: &str) -> Vec<ActorId> {
        debug!(%condition, "CooperativeMutex::notify_all: called");
        let mut state = self.state.borrow_mut();
        let mut woken = Vec::new();
        while let Some(waiter) = state.pop_condition(condition) {
            woken.push(waiter.owner);
            state.enqueue_acquire(waiter);
        }
        woken
    }

    /// Drop every queued handle and reset to a fresh, unlocked state
    ///
    /// Suspended futures observe `WaitAbandoned` if they are ever polled again.
    /// Returns how many waiters were discarded.
    pub fn discard(&self) -> usize {
        debug!("CooperativeMutex::discard: called");
        let old = std::mem::take(&mut *self.state.borrow_mut());
        let discarded = old.acquire_queue.len() + old.conditions.values().map(VecDeque::len).sum::<usize>();
        debug!(discarded, "CooperativeMutex::discard: dropped waiters");
        discarded
    }

    pub fn is_locked(&self) -> bool {
        self.state.borrow().locked
    }

    pub fn owner(&self) -> Option<ActorId> {
        self.state.borrow().owner
    }

    /// Number of releases attempted without ownership
    pub fn misuse_count(&self) -> u64 {
        self.state.borrow().misuse_count
    }

    /// Read-only view of lock and queues
    pub fn snapshot(&self) -> MutexSnapshot {
        let state = self.state.borrow();
        MutexSnapshot {
            locked: state.locked,
            owner: state.owner,
            acquire_queue: state.acquire_queue.iter().map(|w| w.owner).collect(),
            conditions: state
                .conditions
                .iter()
                .filter(|(_, queue)| !queue.is_empty())
                .map(|(name, queue)| (name.clone(), queue.iter().map(|w| w.owner).collect()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutex::{NOT_EMPTY, NOT_FULL};
    use futures::FutureExt;
    use futures::executor::LocalPool;
    use futures::task::LocalSpawnExt;
    use std::rc::Rc;

    fn p(i: usize) -> ActorId {
        ActorId::producer(i)
    }

    fn c(i: usize) -> ActorId {
        ActorId::consumer(i)
    }

    #[test]
    fn test_try_acquire() {
        let mutex = CooperativeMutex::new();
        assert!(mutex.try_acquire(p(0)));
        assert!(!mutex.try_acquire(p(1)));
        assert_eq!(mutex.owner(), Some(p(0)));

        mutex.release(p(0)).unwrap();
        assert!(!mutex.is_locked());
        assert!(mutex.try_acquire(p(1)));
    }

    #[test]
    fn test_release_misuse_is_non_fatal() {
        let mutex = CooperativeMutex::new();

        // Release while free
        let err = mutex.release(p(0)).unwrap_err();
        assert!(matches!(err, SimError::LockMisuse { owner: None, .. }));

        // Release by non-owner
        assert!(mutex.try_acquire(p(0)));
        let err = mutex.release(c(0)).unwrap_err();
        assert!(matches!(err, SimError::LockMisuse { owner: Some(o), .. } if o == p(0)));

        // Lock untouched by misuse
        assert_eq!(mutex.owner(), Some(p(0)));
        assert_eq!(mutex.misuse_count(), 2);
    }

    #[test]
    fn test_acquire_fifo_order() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let mutex = Rc::new(CooperativeMutex::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        assert!(mutex.try_acquire(p(9)));

        for id in [p(0), c(0), p(1)] {
            let mutex = mutex.clone();
            let order = order.clone();
            spawner
                .spawn_local(async move {
                    mutex.acquire(id).await.unwrap();
                    order.borrow_mut().push(id);
                })
                .unwrap();
            // Each task queues before the next is spawned
            pool.run_until_stalled();
        }

        assert_eq!(mutex.snapshot().acquire_queue, vec![p(0), c(0), p(1)]);

        mutex.release(p(9)).unwrap();
        pool.run_until_stalled();
        assert_eq!(*order.borrow(), vec![p(0)]);

        mutex.release(p(0)).unwrap();
        mutex.release(c(0)).unwrap();
        pool.run_until_stalled();
        assert_eq!(*order.borrow(), vec![p(0), c(0), p(1)]);
        assert_eq!(mutex.owner(), Some(p(1)));
    }

    #[test]
    fn test_ownership_assigned_on_hand_off() {
        let mut pool = LocalPool::new();
        let mutex = Rc::new(CooperativeMutex::new());
        assert!(mutex.try_acquire(p(0)));

        let m = mutex.clone();
        pool.spawner()
            .spawn_local(async move {
                m.acquire(c(0)).await.unwrap();
            })
            .unwrap();
        pool.run_until_stalled();

        // Newcomers cannot barge in between hand-off and resumption
        assert_eq!(mutex.release(p(0)).unwrap(), Some(c(0)));
        assert!(!mutex.try_acquire(p(1)));
        assert_eq!(mutex.owner(), Some(c(0)));
    }

    #[test]
    fn test_wait_releases_and_reacquires() {
        let mut pool = LocalPool::new();
        let mutex = Rc::new(CooperativeMutex::new());
        let resumed = Rc::new(RefCell::new(false));

        let (m, r) = (mutex.clone(), resumed.clone());
        pool.spawner()
            .spawn_local(async move {
                m.acquire(p(0)).await.unwrap();
                m.wait(NOT_FULL, p(0)).await.unwrap();
                assert_eq!(m.owner(), Some(p(0)));
                *r.borrow_mut() = true;
                m.release(p(0)).unwrap();
            })
            .unwrap();
        pool.run_until_stalled();

        // Waiting released the lock
        assert!(!mutex.is_locked());
        assert_eq!(mutex.snapshot().conditions.get(NOT_FULL), Some(&vec![p(0)]));

        // Consumer takes the lock and signals while holding it
        assert!(mutex.try_acquire(c(0)));
        assert_eq!(mutex.notify(NOT_FULL), Some(p(0)));
        pool.run_until_stalled();
        assert!(!*resumed.borrow(), "must not resume before re-acquiring");
        assert_eq!(mutex.snapshot().acquire_queue, vec![p(0)]);

        mutex.release(c(0)).unwrap();
        pool.run_until_stalled();
        assert!(*resumed.borrow());
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_notify_without_waiters() {
        let mutex = CooperativeMutex::new();
        assert_eq!(mutex.notify(NOT_EMPTY), None);
        assert!(mutex.notify_all(NOT_EMPTY).is_empty());
        assert!(!mutex.is_locked());
    }

    #[test]
    fn test_notify_all_preserves_order() {
        let mut pool = LocalPool::new();
        let spawner = pool.spawner();
        let mutex = Rc::new(CooperativeMutex::new());
        let order = Rc::new(RefCell::new(Vec::new()));

        for id in [c(0), c(1), c(2)] {
            let (m, o) = (mutex.clone(), order.clone());
            spawner
                .spawn_local(async move {
                    m.acquire(id).await.unwrap();
                    m.wait(NOT_EMPTY, id).await.unwrap();
                    o.borrow_mut().push(id);
                    m.release(id).unwrap();
                })
                .unwrap();
            pool.run_until_stalled();
        }

        assert_eq!(mutex.snapshot().waiter_count(), 3);
        assert_eq!(mutex.notify_all(NOT_EMPTY), vec![c(0), c(1), c(2)]);
        pool.run_until_stalled();
        assert_eq!(*order.borrow(), vec![c(0), c(1), c(2)]);
        assert_eq!(mutex.snapshot(), MutexSnapshot::default());
    }

    #[test]
    fn test_abandoned_waiter_is_skipped() {
        let mut pool = LocalPool::new();
        let mutex = Rc::new(CooperativeMutex::new());
        assert!(mutex.try_acquire(p(0)));

        // A waiter whose future is dropped before hand-off
        {
            let mut abandoned = Box::pin(mutex.acquire(p(1)));
            assert!(abandoned.as_mut().now_or_never().is_none());
        }
        assert_eq!(mutex.snapshot().acquire_queue, vec![p(1)]);

        let m = mutex.clone();
        pool.spawner()
            .spawn_local(async move {
                m.acquire(c(0)).await.unwrap();
            })
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(mutex.release(p(0)).unwrap(), Some(c(0)));
    }

    #[test]
    fn test_discard_drops_waiters() {
        let mut pool = LocalPool::new();
        let mutex = Rc::new(CooperativeMutex::new());
        let outcome = Rc::new(RefCell::new(None));
        assert!(mutex.try_acquire(p(0)));

        let (m, o) = (mutex.clone(), outcome.clone());
        pool.spawner()
            .spawn_local(async move {
                let result = m.acquire(c(0)).await;
                *o.borrow_mut() = Some(result);
            })
            .unwrap();
        pool.run_until_stalled();

        assert_eq!(mutex.discard(), 1);
        assert_eq!(mutex.snapshot(), MutexSnapshot::default());

        pool.run_until_stalled();
        assert!(matches!(
            outcome.borrow().as_ref(),
            Some(Err(SimError::WaitAbandoned { .. }))
        ));
    }

    #[test]
    fn test_force_release_when_free_or_held() {
        let mutex = CooperativeMutex::new();
        assert_eq!(mutex.force_release(), None);
        assert!(mutex.try_acquire(p(0)));
        assert_eq!(mutex.force_release(), None);
        assert!(!mutex.is_locked());
    }
}
