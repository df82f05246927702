//! Shared state for one simulation run

use std::cell::{Cell, RefCell};
use std::collections::HashSet;

use tracing::{debug, error, info, warn};

use crate::actor::{Consumer, Producer};
use crate::buffer::CircularBuffer;
use crate::clock::{ClockConfig, SimulationClock};
use crate::config::SimConfig;
use crate::domain::{ActorId, Item, Role, SyncMode};
use crate::error::SimError;
use crate::mutex::CooperativeMutex;
use crate::scheduler::TurnScheduler;

use super::events::{EventLog, SimEvent};

/// Everything one run owns, shared with its actor futures through `Rc`
///
/// Borrows of the `RefCell` fields are always dropped before an `.await`.
#[derive(Debug)]
pub struct SimContext {
    pub(crate) mode: SyncMode,
    pub(crate) seed: u64,
    pub(crate) mutex: CooperativeMutex,
    pub(crate) buffer: RefCell<CircularBuffer>,
    pub(crate) turns: RefCell<TurnScheduler>,
    pub(crate) producers: RefCell<Vec<Producer>>,
    pub(crate) consumers: RefCell<Vec<Consumer>>,
    pub(crate) clock: RefCell<SimulationClock>,
    pub(crate) events: RefCell<EventLog>,
    faults: RefCell<HashSet<ActorId>>,
    transfer_ms: Cell<u64>,
    next_seq: Cell<u64>,
}

impl SimContext {
    /// Build a fresh run: empty buffer, unlocked mutex, idle actors, turns at 0
    pub fn new(config: &SimConfig) -> Self {
        let seed = config.seed.unwrap_or_else(rand::random);
        info!(
            producers = config.producers,
            consumers = config.consumers,
            capacity = config.capacity,
            mode = %config.mode,
            seed,
            "Creating simulation context"
        );

        Self {
            mode: config.mode,
            seed,
            mutex: CooperativeMutex::new(),
            buffer: RefCell::new(CircularBuffer::new(config.capacity)),
            turns: RefCell::new(TurnScheduler::new(config.producers, config.consumers)),
            producers: RefCell::new((0..config.producers).map(Producer::new).collect()),
            consumers: RefCell::new((0..config.consumers).map(Consumer::new).collect()),
            clock: RefCell::new(SimulationClock::new(ClockConfig {
                jitter_ms: config.jitter_ms,
                stagger_fraction: config.stagger_fraction,
                seed,
            })),
            events: RefCell::new(EventLog::new(config.event_log_capacity)),
            faults: RefCell::new(HashSet::new()),
            transfer_ms: Cell::new(config.effective_transfer_ms()),
            next_seq: Cell::new(1),
        }
    }

    pub fn now(&self) -> u64 {
        self.clock.borrow().now()
    }

    pub fn actor_count(&self, role: Role) -> usize {
        match role {
            Role::Producer => self.producers.borrow().len(),
            Role::Consumer => self.consumers.borrow().len(),
        }
    }

    pub fn contains(&self, actor: ActorId) -> bool {
        actor.index < self.actor_count(actor.role)
    }

    /// Stamp an event with the current virtual time
    pub fn record(&self, event: SimEvent) {
        let now = self.now();
        self.events.borrow_mut().push(now, event);
    }

    /// Generate the next item for `producer`
    pub fn next_item(&self, producer: ActorId) -> Item {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        Item::new(producer, seq)
    }

    /// Transfer duration applied to operations that start from now on
    pub fn set_transfer_ms(&self, ms: u64) {
        debug!(ms, "SimContext::set_transfer_ms: called");
        self.transfer_ms.set(ms);
    }

    pub fn transfer_ms(&self) -> u64 {
        self.transfer_ms.get()
    }

    /// Suspend for the configured transfer duration in virtual time
    pub async fn transfer_delay(&self, actor: ActorId) -> Result<(), SimError> {
        let ms = self.transfer_ms.get();
        if ms == 0 {
            return Ok(());
        }
        let rx = self.clock.borrow_mut().sleep(ms);
        rx.await.map_err(|_| SimError::WaitAbandoned { actor })
    }

    /// Release `owner`'s lock, recording a `LockMisuse` event if it did not hold it
    pub fn release(&self, owner: ActorId) -> Result<Option<ActorId>, SimError> {
        self.mutex.release(owner).inspect_err(|err| self.record_misuse(err))
    }

    /// Wait on `condition` through the run's mutex, recording misuse like `release`
    pub async fn wait(&self, condition: &str, owner: ActorId) -> Result<(), SimError> {
        let result = self.mutex.wait(condition, owner).await;
        if let Err(err) = &result {
            self.record_misuse(err);
        }
        result
    }

    fn record_misuse(&self, err: &SimError) {
        if let SimError::LockMisuse { by, owner } = err {
            self.record(SimEvent::LockMisuse {
                actor: *by,
                owner: *owner,
            });
        }
    }

    /// Arm a one-shot failure for `actor`'s next operation
    pub fn arm_fault(&self, actor: ActorId) {
        debug!(%actor, "SimContext::arm_fault: called");
        self.faults.borrow_mut().insert(actor);
    }

    /// Fire an armed fault, if any
    pub fn take_fault(&self, actor: ActorId) -> Result<(), SimError> {
        if self.faults.borrow_mut().remove(&actor) {
            return Err(SimError::CriticalSectionFailure {
                actor,
                reason: "injected fault".to_string(),
            });
        }
        Ok(())
    }

    /// Put a failed actor back on its feet without disturbing anyone else
    ///
    /// A lock held by the actor is force-released first so waiters keep moving.
    pub fn recover(&self, actor: ActorId, err: SimError) {
        if self.mutex.owner() == Some(actor) {
            let next = self.mutex.force_release();
            debug!(%actor, next = ?next, "SimContext::recover: released lock held by failed actor");
        }

        match actor.role {
            Role::Producer => {
                if let Some(producer) = self.producers.borrow_mut().get_mut(actor.index) {
                    producer.reset_idle();
                }
            }
            Role::Consumer => {
                if let Some(consumer) = self.consumers.borrow_mut().get_mut(actor.index) {
                    consumer.reset_idle();
                }
            }
        }

        if err.is_critical() {
            error!(%actor, error = %err, "Critical section failed");
        } else {
            warn!(%actor, error = %err, "Actor operation failed");
        }
        let event = match err {
            // Already in the log from `release` or `wait`
            SimError::LockMisuse { .. } => return,
            SimError::CriticalSectionFailure { reason, .. } => SimEvent::CriticalSectionFailure { actor, reason },
            other => SimEvent::CriticalSectionFailure {
                actor,
                reason: other.to_string(),
            },
        };
        self.record(event);
    }

    /// Drop every waiter, timer and schedule, and idle every actor
    ///
    /// Returns how many mutex waiters were discarded.
    pub fn teardown(&self) -> usize {
        debug!("SimContext::teardown: called");
        let discarded = self.mutex.discard();
        {
            let mut clock = self.clock.borrow_mut();
            clock.cancel_timers();
            clock.unschedule_all();
        }
        self.faults.borrow_mut().clear();
        self.producers.borrow_mut().iter_mut().for_each(Producer::reset_idle);
        self.consumers.borrow_mut().iter_mut().for_each(Consumer::reset_idle);
        discarded
    }
}
