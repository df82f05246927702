//! Per-actor tick scheduling in virtual milliseconds

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::oneshot;
use tracing::debug;

use crate::domain::{ActorId, Role};

use super::timer::TimerQueue;

/// Randomization applied to tick scheduling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockConfig {
    /// Upper bound of the per-tick random extra delay
    pub jitter_ms: u64,
    /// Initial stagger bound as a fraction of the base delay
    pub stagger_fraction: f64,
    /// RNG seed; identical seeds replay identical schedules
    pub seed: u64,
}

/// Virtual clock driving actor ticks and transfer timers
#[derive(Debug)]
pub struct SimulationClock {
    config: ClockConfig,
    now_ms: u64,
    next_fire: BTreeMap<ActorId, u64>,
    timers: TimerQueue,
    rng: StdRng,
}

impl SimulationClock {
    pub fn new(config: ClockConfig) -> Self {
        debug!(?config, "SimulationClock::new: called");
        Self {
            config,
            now_ms: 0,
            next_fire: BTreeMap::new(),
            timers: TimerQueue::new(),
            rng: StdRng::seed_from_u64(config.seed),
        }
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.now_ms
    }

    /// Schedule an actor's first tick after a random stagger
    pub fn stagger(&mut self, actor: ActorId, base_delay_ms: u64) -> u64 {
        let bound = (base_delay_ms as f64 * self.config.stagger_fraction).max(0.0) as u64;
        let at = self.now_ms + self.rng.random_range(0..=bound);
        debug!(%actor, at, "SimulationClock::stagger: first tick scheduled");
        self.next_fire.insert(actor, at);
        at
    }

    /// Schedule an actor's next tick one jittered period from now
    pub fn schedule_next(&mut self, actor: ActorId, base_delay_ms: u64) -> u64 {
        let jitter = self.rng.random_range(0..=self.config.jitter_ms);
        let at = self.now_ms + base_delay_ms + jitter;
        self.next_fire.insert(actor, at);
        at
    }

    /// Re-plan every scheduled actor of `role` with a new base delay
    pub fn reschedule_role(&mut self, role: Role, base_delay_ms: u64) -> usize {
        debug!(%role, base_delay_ms, "SimulationClock::reschedule_role: called");
        let actors: Vec<_> = self.next_fire.keys().filter(|a| a.role == role).copied().collect();
        for actor in &actors {
            self.schedule_next(*actor, base_delay_ms);
        }
        actors.len()
    }

    /// Stop ticking every actor
    pub fn unschedule_all(&mut self) {
        debug!("SimulationClock::unschedule_all: called");
        self.next_fire.clear();
    }

    pub fn next_fire(&self, actor: ActorId) -> Option<u64> {
        self.next_fire.get(&actor).copied()
    }

    /// Earliest pending event: an actor tick or a timer
    pub fn next_deadline(&self) -> Option<u64> {
        let tick = self.next_fire.values().min().copied();
        match (tick, self.next_timer()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Move time forward. Time never goes backwards.
    pub fn advance_to(&mut self, at: u64) {
        if at > self.now_ms {
            self.now_ms = at;
        }
    }

    /// Actors whose tick is due, ordered by (fire time, actor id)
    pub fn due_actors(&self) -> Vec<ActorId> {
        let mut due: Vec<_> = self
            .next_fire
            .iter()
            .filter(|(_, at)| **at <= self.now_ms)
            .map(|(actor, at)| (*at, *actor))
            .collect();
        due.sort();
        due.into_iter().map(|(_, actor)| actor).collect()
    }

    /// Register a virtual sleep of `delay_ms` from now
    pub fn sleep(&mut self, delay_ms: u64) -> oneshot::Receiver<()> {
        self.timers.register(self.now_ms + delay_ms)
    }

    /// Fire every timer due at the current time
    pub fn fire_timers(&mut self) -> usize {
        self.timers.fire_due(self.now_ms)
    }

    /// Drop every pending timer
    pub fn cancel_timers(&mut self) -> usize {
        self.timers.cancel_all()
    }

    /// Deadline of the earliest pending transfer timer
    pub fn next_timer(&self) -> Option<u64> {
        self.timers.next_deadline()
    }
}
