//! Observability log
//!
//! Every buffer operation and every anomaly is recorded here. The log keeps
//! the most recent entries only; `SimStats` keeps running totals.

use std::collections::VecDeque;

use serde::Serialize;
use tracing::debug;

use crate::domain::{ActorId, Item, SyncMode};

/// Something that happened during a run
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case", rename_all_fields = "kebab-case")]
pub enum SimEvent {
    Started { mode: SyncMode },
    Paused,
    Resumed,
    Stopped { discarded_waiters: usize },
    Produced { actor: ActorId, item: Item, slot: usize },
    Consumed { actor: ActorId, item: Item, slot: usize },
    /// An unread item was clobbered (race injection)
    Overwrite { actor: ActorId, slot: usize, lost: Item, item: Item },
    /// A slot was read while empty (race injection)
    StaleRead { actor: ActorId, slot: usize },
    Waiting { actor: ActorId, condition: String },
    Woken { actor: ActorId, by: ActorId, condition: String },
    LockMisuse { actor: ActorId, owner: Option<ActorId> },
    CriticalSectionFailure { actor: ActorId, reason: String },
}

impl SimEvent {
    /// Whether this event exposes a race-condition anomaly
    pub fn is_anomaly(&self) -> bool {
        matches!(self, SimEvent::Overwrite { .. } | SimEvent::StaleRead { .. })
    }

    /// Human-readable one-line description
    pub fn describe(&self) -> String {
        match self {
            SimEvent::Started { mode } => format!("started ({})", mode),
            SimEvent::Paused => "paused".to_string(),
            SimEvent::Resumed => "resumed".to_string(),
            SimEvent::Stopped { discarded_waiters } => {
                format!("stopped ({} waiters discarded)", discarded_waiters)
            }
            SimEvent::Produced { actor, item, slot } => format!("{} put {} in slot {}", actor, item, slot),
            SimEvent::Consumed { actor, item, slot } => format!("{} took {} from slot {}", actor, item, slot),
            SimEvent::Overwrite { actor, slot, lost, item } => {
                format!("{} overwrote {} with {} in slot {}", actor, lost, item, slot)
            }
            SimEvent::StaleRead { actor, slot } => format!("{} read empty slot {}", actor, slot),
            SimEvent::Waiting { actor, condition } => format!("{} waits on {}", actor, condition),
            SimEvent::Woken { actor, by, condition } => format!("{} woke {} via {}", by, actor, condition),
            SimEvent::LockMisuse { actor, owner } => match owner {
                Some(owner) => format!("{} released a lock held by {}", actor, owner),
                None => format!("{} released an unlocked mutex", actor),
            },
            SimEvent::CriticalSectionFailure { actor, reason } => {
                format!("{} failed in critical section: {}", actor, reason)
            }
        }
    }
}

/// An event stamped with the virtual time it happened at
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    #[serde(rename = "time-ms")]
    pub time_ms: u64,
    #[serde(flatten)]
    pub event: SimEvent,
}

/// Running totals that survive log eviction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SimStats {
    pub produced: u64,
    pub consumed: u64,
    pub overwrites: u64,
    pub stale_reads: u64,
    pub waits: u64,
    pub lock_misuses: u64,
    pub failures: u64,
}

impl SimStats {
    fn record(&mut self, event: &SimEvent) {
        match event {
            SimEvent::Produced { .. } => self.produced += 1,
            SimEvent::Consumed { .. } => self.consumed += 1,
            SimEvent::Overwrite { .. } => self.overwrites += 1,
            SimEvent::StaleRead { .. } => self.stale_reads += 1,
            SimEvent::Waiting { .. } => self.waits += 1,
            SimEvent::LockMisuse { .. } => self.lock_misuses += 1,
            SimEvent::CriticalSectionFailure { .. } => self.failures += 1,
            SimEvent::Started { .. }
            | SimEvent::Paused
            | SimEvent::Resumed
            | SimEvent::Stopped { .. }
            | SimEvent::Woken { .. } => {}
        }
    }
}

/// Bounded ring of recent events plus totals
#[derive(Debug)]
pub struct EventLog {
    entries: VecDeque<EventRecord>,
    capacity: usize,
    stats: SimStats,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            stats: SimStats::default(),
        }
    }

    pub fn push(&mut self, time_ms: u64, event: SimEvent) {
        debug!(time_ms, event = %event.describe(), "EventLog::push");
        self.stats.record(&event);
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(EventRecord { time_ms, event });
    }

    pub fn entries(&self) -> impl Iterator<Item = &EventRecord> {
        self.entries.iter()
    }

    /// Remove and return every buffered entry, oldest first
    pub fn drain(&mut self) -> Vec<EventRecord> {
        self.entries.drain(..).collect()
    }

    pub fn stats(&self) -> SimStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
