//! Read-only view of a run for presentation layers

use serde::Serialize;

use crate::actor::{Consumer, ConsumerState, Producer, ProducerState};
use crate::buffer::BufferSnapshot;
use crate::domain::SyncMode;
use crate::mutex::MutexSnapshot;
use crate::scheduler::{TurnSnapshot, TurnStats};

use super::core::RunState;
use super::events::SimStats;

/// Point-in-time copy of every observable piece of simulation state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimSnapshot {
    #[serde(rename = "time-ms")]
    pub time_ms: u64,
    #[serde(rename = "run-state")]
    pub run_state: RunState,
    pub mode: SyncMode,
    pub seed: u64,
    pub buffer: BufferSnapshot,
    pub producers: Vec<Producer>,
    pub consumers: Vec<Consumer>,
    pub mutex: MutexSnapshot,
    pub turns: TurnSnapshot,
    #[serde(rename = "turn-stats")]
    pub turn_stats: TurnStats,
    pub stats: SimStats,
}

impl SimSnapshot {
    /// Actors currently inside a critical section
    pub fn holding_lock_count(&self) -> usize {
        let producers = self
            .producers
            .iter()
            .filter(|p| p.state == ProducerState::HoldingLock)
            .count();
        let consumers = self
            .consumers
            .iter()
            .filter(|c| c.state == ConsumerState::HoldingLock)
            .count();
        producers + consumers
    }

    /// Every actor is idle with nothing outstanding
    pub fn all_idle(&self) -> bool {
        self.producers
            .iter()
            .all(|p| p.state == ProducerState::Idle && !p.in_flight)
            && self
                .consumers
                .iter()
                .all(|c| c.state == ConsumerState::Idle && !c.in_flight)
    }
}
