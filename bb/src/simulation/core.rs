//! Simulation driver: lifecycle, clock stepping and live adjustments

use std::rc::Rc;

use futures::executor::LocalPool;
use futures::task::LocalSpawnExt;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::actor::{TickOutcome, begin_consume, begin_produce, run_consume, run_produce};
use crate::config::{MAX_TRANSFER_SPEED, MIN_DELAY_MS, MIN_TRANSFER_SPEED, SimConfig};
use crate::domain::{ActorId, Role, SyncMode};
use crate::error::SimError;

use super::context::SimContext;
use super::events::{EventRecord, SimEvent};
use super::snapshot::SimSnapshot;

/// Whether the clock is allowed to move
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
            Self::Paused => write!(f, "paused"),
        }
    }
}

/// Bounded-buffer simulation
///
/// Owns one `SimContext` and the executor its actor futures run on. Nothing
/// happens between calls: time moves only through `step`, `advance` and
/// `tick`, which makes every run reproducible for a given seed.
pub struct Simulation {
    config: SimConfig,
    run_state: RunState,
    ctx: Rc<SimContext>,
    pool: LocalPool,
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("config", &self.config)
            .field("run_state", &self.run_state)
            .field("now", &self.ctx.now())
            .finish_non_exhaustive()
    }
}

impl Simulation {
    /// Create a stopped simulation with a fresh context
    pub fn new(config: SimConfig) -> Self {
        debug!(?config, "Simulation::new: called");
        let ctx = Rc::new(SimContext::new(&config));
        Self {
            config,
            run_state: RunState::Stopped,
            ctx,
            pool: LocalPool::new(),
        }
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn is_running(&self) -> bool {
        self.run_state == RunState::Running
    }

    /// Current virtual time in milliseconds
    pub fn now(&self) -> u64 {
        self.ctx.now()
    }

    fn base_delay(&self, role: Role) -> u64 {
        self.config.delay_for(role).max(1)
    }

    /// Begin a new run from a fresh context
    ///
    /// Returns false if the simulation was not stopped.
    pub fn start(&mut self) -> bool {
        debug!(run_state = %self.run_state, "Simulation::start: called");
        if self.run_state != RunState::Stopped {
            debug!("Simulation::start: already started");
            return false;
        }

        self.ctx = Rc::new(SimContext::new(&self.config));
        self.pool = LocalPool::new();
        {
            let mut clock = self.ctx.clock.borrow_mut();
            for index in 0..self.config.producers {
                clock.stagger(ActorId::producer(index), self.base_delay(Role::Producer));
            }
            for index in 0..self.config.consumers {
                clock.stagger(ActorId::consumer(index), self.base_delay(Role::Consumer));
            }
        }

        self.run_state = RunState::Running;
        self.ctx.record(SimEvent::Started { mode: self.ctx.mode });
        info!(mode = %self.ctx.mode, seed = self.ctx.seed, "Simulation started");
        true
    }

    /// Freeze the clock; outstanding operations stay exactly where they are
    pub fn pause(&mut self) -> bool {
        debug!(run_state = %self.run_state, "Simulation::pause: called");
        if self.run_state != RunState::Running {
            return false;
        }
        self.run_state = RunState::Paused;
        self.ctx.record(SimEvent::Paused);
        info!(now = self.now(), "Simulation paused");
        true
    }

    pub fn resume(&mut self) -> bool {
        debug!(run_state = %self.run_state, "Simulation::resume: called");
        if self.run_state != RunState::Paused {
            return false;
        }
        self.run_state = RunState::Running;
        self.ctx.record(SimEvent::Resumed);
        info!(now = self.now(), "Simulation resumed");
        true
    }

    /// End the run, cancelling every outstanding operation
    ///
    /// The buffer is left as it was so the final state can still be inspected.
    pub fn stop(&mut self) -> bool {
        debug!(run_state = %self.run_state, "Simulation::stop: called");
        if self.run_state == RunState::Stopped {
            return false;
        }

        // Dropping the pool drops every suspended actor future
        self.pool = LocalPool::new();
        let discarded_waiters = self.ctx.teardown();
        self.run_state = RunState::Stopped;
        self.ctx.record(SimEvent::Stopped { discarded_waiters });
        info!(now = self.now(), discarded_waiters, "Simulation stopped");
        true
    }

    /// Stop and rebuild: empty buffer, idle actors, turns at 0, time 0
    ///
    /// Picks up mode and size changes made since the last start.
    pub fn reset(&mut self) {
        debug!("Simulation::reset: called");
        self.stop();
        self.ctx = Rc::new(SimContext::new(&self.config));
        self.pool = LocalPool::new();
        info!("Simulation reset");
    }

    /// Tick one actor now, outside the clock schedule
    pub fn tick(&mut self, actor: ActorId) -> Result<TickOutcome, SimError> {
        debug!(%actor, "Simulation::tick: called");
        if self.run_state != RunState::Running {
            return Ok(TickOutcome::Suppressed);
        }
        let outcome = self.dispatch(actor)?;
        self.pool.run_until_stalled();
        Ok(outcome)
    }

    fn dispatch(&mut self, actor: ActorId) -> Result<TickOutcome, SimError> {
        let begun = match actor.role {
            Role::Producer => begin_produce(&self.ctx, actor.index).map(|item| {
                item.map(|item| {
                    self.pool
                        .spawner()
                        .spawn_local(run_produce(self.ctx.clone(), actor, item))
                })
            }),
            Role::Consumer => begin_consume(&self.ctx, actor.index).map(|started| {
                started.then(|| {
                    self.pool
                        .spawner()
                        .spawn_local(run_consume(self.ctx.clone(), actor))
                })
            }),
        };

        match begun {
            Ok(Some(Ok(()))) => Ok(TickOutcome::Started),
            Ok(Some(Err(e))) => {
                let reason = e.to_string();
                self.ctx.recover(actor, SimError::Spawn(reason.clone()));
                Err(SimError::Spawn(reason))
            }
            Ok(None) => Ok(TickOutcome::NotTurn),
            Err(SimError::ReentrancyViolation { actor }) => {
                debug!(%actor, "Simulation::dispatch: in flight, ignoring tick");
                Ok(TickOutcome::InFlight)
            }
            Err(e) => Err(e),
        }
    }

    /// Earliest pending actor tick or timer
    pub fn next_deadline(&self) -> Option<u64> {
        self.ctx.clock.borrow().next_deadline()
    }

    /// Jump to the next deadline and process everything due then
    ///
    /// Timers fire first so transfers finishing now complete before new ticks
    /// begin. Returns the time stepped to, or `None` when not running or
    /// nothing is scheduled.
    pub fn step(&mut self) -> Option<u64> {
        if self.run_state != RunState::Running {
            return None;
        }
        let at = self.next_deadline()?;

        let fired = {
            let mut clock = self.ctx.clock.borrow_mut();
            clock.advance_to(at);
            clock.fire_timers()
        };
        self.pool.run_until_stalled();

        let due = self.ctx.clock.borrow().due_actors();
        debug!(at, fired, due = due.len(), "Simulation::step: processing");
        for actor in due {
            let delay = self.base_delay(actor.role);
            self.ctx.clock.borrow_mut().schedule_next(actor, delay);
            match self.dispatch(actor) {
                Ok(_) => {}
                Err(e) => warn!(%actor, error = %e, "Tick failed"),
            }
            self.pool.run_until_stalled();
        }
        Some(at)
    }

    /// Run every step due within the next `ms` milliseconds, then move the
    /// clock to the end of the window. Returns the number of steps taken.
    pub fn advance(&mut self, ms: u64) -> usize {
        debug!(ms, "Simulation::advance: called");
        if self.run_state != RunState::Running {
            return 0;
        }

        let target = self.now().saturating_add(ms);
        let mut steps = 0;
        while self.run_state == RunState::Running {
            match self.next_deadline() {
                Some(at) if at <= target => {
                    self.step();
                    steps += 1;
                }
                _ => break,
            }
        }
        self.ctx.clock.borrow_mut().advance_to(target);
        steps
    }

    /// Change a role's base delay; running actors of that role are
    /// rescheduled from the current time
    pub fn set_delay(&mut self, role: Role, delay_ms: u64) {
        debug!(%role, delay_ms, "Simulation::set_delay: called");
        let delay_ms = if delay_ms < MIN_DELAY_MS {
            warn!(%role, delay_ms, floor = MIN_DELAY_MS, "Delay below floor, clamping");
            MIN_DELAY_MS
        } else {
            delay_ms
        };

        match role {
            Role::Producer => self.config.producer_delay_ms = delay_ms,
            Role::Consumer => self.config.consumer_delay_ms = delay_ms,
        }
        if self.run_state != RunState::Stopped {
            self.ctx.clock.borrow_mut().reschedule_role(role, delay_ms);
        }
    }

    pub fn set_producer_delay(&mut self, delay_ms: u64) {
        self.set_delay(Role::Producer, delay_ms);
    }

    pub fn set_consumer_delay(&mut self, delay_ms: u64) {
        self.set_delay(Role::Consumer, delay_ms);
    }

    /// Change the transfer-speed multiplier for transfers that start afterwards
    pub fn set_transfer_speed(&mut self, speed: f64) {
        debug!(speed, "Simulation::set_transfer_speed: called");
        let speed = if speed.is_finite() {
            speed.clamp(MIN_TRANSFER_SPEED, MAX_TRANSFER_SPEED)
        } else {
            warn!(speed, "Non-finite transfer speed, keeping current");
            self.config.transfer_speed
        };
        self.config.transfer_speed = speed;
        self.ctx.set_transfer_ms(self.config.effective_transfer_ms());
    }

    /// Select the execution mode for the next start or reset
    pub fn set_mode(&mut self, mode: SyncMode) {
        debug!(%mode, "Simulation::set_mode: called");
        if mode != self.ctx.mode && self.run_state != RunState::Stopped {
            info!(%mode, "Mode change takes effect on next start");
        }
        self.config.mode = mode;
    }

    /// Make `actor`'s next critical section fail
    pub fn inject_fault(&mut self, actor: ActorId) -> Result<(), SimError> {
        debug!(%actor, "Simulation::inject_fault: called");
        if !self.ctx.contains(actor) {
            return Err(SimError::UnknownActor(actor));
        }
        self.ctx.arm_fault(actor);
        Ok(())
    }

    pub fn snapshot(&self) -> SimSnapshot {
        let ctx = &self.ctx;
        SimSnapshot {
            time_ms: ctx.now(),
            run_state: self.run_state,
            mode: ctx.mode,
            seed: ctx.seed,
            buffer: ctx.buffer.borrow().snapshot(),
            producers: ctx.producers.borrow().clone(),
            consumers: ctx.consumers.borrow().clone(),
            mutex: ctx.mutex.snapshot(),
            turns: ctx.turns.borrow().snapshot(),
            turn_stats: ctx.turns.borrow().stats(),
            stats: ctx.events.borrow().stats(),
        }
    }

    /// Recent events, oldest first
    pub fn events(&self) -> Vec<EventRecord> {
        self.ctx.events.borrow().entries().cloned().collect()
    }

    /// Take every buffered event, leaving the log empty
    pub fn drain_events(&mut self) -> Vec<EventRecord> {
        self.ctx.events.borrow_mut().drain()
    }
}
