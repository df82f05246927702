//! Round-robin turn tracking per role

use serde::Serialize;
use tracing::debug;

use crate::domain::{ActorId, Role};

/// Current turn indices for presentation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TurnSnapshot {
    pub producer: usize,
    pub consumer: usize,
}

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct TurnStats {
    pub producer_turns_completed: u64,
    pub consumer_turns_completed: u64,
    pub producer_turns_denied: u64,
    pub consumer_turns_denied: u64,
}

/// Independent rotating eligibility index per role
#[derive(Debug, Clone)]
pub struct TurnScheduler {
    producer_count: usize,
    consumer_count: usize,
    next_producer: usize,
    next_consumer: usize,
    stats: TurnStats,
}

impl TurnScheduler {
    /// Create a scheduler with both turns at index 0
    pub fn new(producer_count: usize, consumer_count: usize) -> Self {
        debug!(producer_count, consumer_count, "TurnScheduler::new: called");
        Self {
            producer_count,
            consumer_count,
            next_producer: 0,
            next_consumer: 0,
            stats: TurnStats::default(),
        }
    }

    fn count(&self, role: Role) -> usize {
        match role {
            Role::Producer => self.producer_count,
            Role::Consumer => self.consumer_count,
        }
    }

    /// Index of the actor whose turn it is for `role`
    pub fn turn(&self, role: Role) -> usize {
        match role {
            Role::Producer => self.next_producer,
            Role::Consumer => self.next_consumer,
        }
    }

    /// Whether `actor` may attempt its operation now
    pub fn is_turn(&self, actor: ActorId) -> bool {
        let count = self.count(actor.role);
        count > 0 && self.turn(actor.role) % count == actor.index
    }

    /// Check eligibility and record the outcome in stats
    pub fn check(&mut self, actor: ActorId) -> bool {
        let eligible = self.is_turn(actor);
        if !eligible {
            debug!(%actor, turn = self.turn(actor.role), "TurnScheduler::check: not this actor's turn");
            match actor.role {
                Role::Producer => self.stats.producer_turns_denied += 1,
                Role::Consumer => self.stats.consumer_turns_denied += 1,
            }
        }
        eligible
    }

    /// Pass the turn to the next actor of `role` after a completed operation
    ///
    /// A role with no actors never advances.
    pub fn advance(&mut self, role: Role) -> usize {
        let count = self.count(role);
        if count == 0 {
            debug!(%role, "TurnScheduler::advance: no actors for role");
            return 0;
        }

        let next = match role {
            Role::Producer => {
                self.next_producer = (self.next_producer + 1) % count;
                self.stats.producer_turns_completed += 1;
                self.next_producer
            }
            Role::Consumer => {
                self.next_consumer = (self.next_consumer + 1) % count;
                self.stats.consumer_turns_completed += 1;
                self.next_consumer
            }
        };
        debug!(%role, next, "TurnScheduler::advance: turn passed");
        next
    }

    /// Rewind both turns to index 0
    pub fn reset(&mut self) {
        debug!("TurnScheduler::reset: called");
        self.next_producer = 0;
        self.next_consumer = 0;
        self.stats = TurnStats::default();
    }

    pub fn snapshot(&self) -> TurnSnapshot {
        TurnSnapshot {
            producer: self.next_producer,
            consumer: self.next_consumer,
        }
    }

    pub fn stats(&self) -> TurnStats {
        self.stats
    }
}
