//! Consumer actor

use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ActorId, Role, SyncMode};
use crate::error::SimError;
use crate::mutex::{NOT_EMPTY, NOT_FULL};
use crate::simulation::{SimContext, SimEvent};

use super::state::{ConsumerState, transition};

/// A consumer and its lifecycle flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Consumer {
    pub id: ActorId,
    /// Reads completed, stale ones included
    pub completed: u64,
    pub state: ConsumerState,
    #[serde(rename = "in-flight")]
    pub in_flight: bool,
}

impl Consumer {
    pub fn new(index: usize) -> Self {
        Self {
            id: ActorId::consumer(index),
            completed: 0,
            state: ConsumerState::Idle,
            in_flight: false,
        }
    }

    pub(crate) fn set_state(&mut self, next: ConsumerState, mode: SyncMode) -> Result<(), SimError> {
        transition(self.id, &mut self.state, next, mode)
    }

    pub(crate) fn reset_idle(&mut self) {
        self.state = ConsumerState::Idle;
        self.in_flight = false;
    }
}

fn set_state(ctx: &SimContext, id: ActorId, next: ConsumerState) -> Result<(), SimError> {
    let mut consumers = ctx.consumers.borrow_mut();
    let consumer = consumers.get_mut(id.index).ok_or(SimError::UnknownActor(id))?;
    consumer.set_state(next, ctx.mode)
}

/// Decide whether consumer `index` starts an operation on this tick
pub(crate) fn begin(ctx: &SimContext, index: usize) -> Result<bool, SimError> {
    let id = ActorId::consumer(index);
    debug!(%id, "consumer::begin: called");

    let mut consumers = ctx.consumers.borrow_mut();
    let consumer = consumers.get_mut(index).ok_or(SimError::UnknownActor(id))?;
    if consumer.in_flight {
        return Err(SimError::ReentrancyViolation { actor: id });
    }

    if !ctx.turns.borrow_mut().check(id) {
        if ctx.mode.is_synchronized() {
            consumer.set_state(ConsumerState::WaitingTurn, ctx.mode)?;
        }
        return Ok(false);
    }

    consumer.set_state(ConsumerState::Consuming, ctx.mode)?;
    consumer.in_flight = true;
    Ok(true)
}

/// Carry one consume operation to completion
pub(crate) async fn run(ctx: Rc<SimContext>, id: ActorId) {
    debug!(%id, mode = %ctx.mode, "consumer::run: called");
    let result = match ctx.mode {
        SyncMode::Synchronized => consume_synchronized(&ctx, id).await,
        SyncMode::Unsynchronized => consume_unsynchronized(&ctx, id).await,
    };

    match result {
        Ok(()) => finish(&ctx, id),
        Err(err) => ctx.recover(id, err),
    }
}

async fn consume_synchronized(ctx: &SimContext, id: ActorId) -> Result<(), SimError> {
    ctx.mutex.acquire(id).await?;

    while ctx.buffer.borrow().is_empty() {
        set_state(ctx, id, ConsumerState::Waiting)?;
        ctx.record(SimEvent::Waiting {
            actor: id,
            condition: NOT_EMPTY.to_string(),
        });
        ctx.wait(NOT_EMPTY, id).await?;
    }

    set_state(ctx, id, ConsumerState::HoldingLock)?;
    ctx.take_fault(id)?;
    ctx.transfer_delay(id).await?;

    let outcome = ctx
        .buffer
        .borrow_mut()
        .try_read()
        .ok_or_else(|| SimError::CriticalSectionFailure {
            actor: id,
            reason: "buffer empty after emptiness check".to_string(),
        })?;
    let item = outcome.item.ok_or_else(|| SimError::CriticalSectionFailure {
        actor: id,
        reason: format!("slot {} empty despite occupancy", outcome.slot),
    })?;
    ctx.record(SimEvent::Consumed {
        actor: id,
        item,
        slot: outcome.slot,
    });

    if let Some(woken) = ctx.mutex.notify(NOT_FULL) {
        ctx.record(SimEvent::Woken {
            actor: woken,
            by: id,
            condition: NOT_FULL.to_string(),
        });
    }
    ctx.release(id)?;
    Ok(())
}

async fn consume_unsynchronized(ctx: &SimContext, id: ActorId) -> Result<(), SimError> {
    ctx.take_fault(id)?;
    ctx.transfer_delay(id).await?;

    let outcome = ctx.buffer.borrow_mut().read();
    match outcome.item {
        Some(item) => ctx.record(SimEvent::Consumed {
            actor: id,
            item,
            slot: outcome.slot,
        }),
        None => {
            warn!(%id, slot = outcome.slot, "Unsynchronized read found an empty slot");
            ctx.record(SimEvent::StaleRead {
                actor: id,
                slot: outcome.slot,
            });
        }
    }
    Ok(())
}

fn finish(ctx: &SimContext, id: ActorId) {
    ctx.turns.borrow_mut().advance(Role::Consumer);

    let mut consumers = ctx.consumers.borrow_mut();
    let Some(consumer) = consumers.get_mut(id.index) else {
        return;
    };
    consumer.completed += 1;
    consumer.in_flight = false;
    if consumer.set_state(ConsumerState::Idle, ctx.mode).is_err() {
        consumer.reset_idle();
    }
    debug!(%id, completed = consumer.completed, "consumer::finish: operation complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_consumer_is_idle() {
        let consumer = Consumer::new(2);
        assert_eq!(consumer.id.to_string(), "C2");
        assert_eq!(consumer.state, ConsumerState::Idle);
        assert_eq!(consumer.completed, 0);
    }

    #[test]
    fn test_unsync_rejects_waiting_turn() {
        let mut consumer = Consumer::new(0);
        let err = consumer
            .set_state(ConsumerState::WaitingTurn, SyncMode::Unsynchronized)
            .unwrap_err();
        assert!(matches!(err, SimError::InvalidTransition { .. }));
        assert_eq!(consumer.state, ConsumerState::Idle);
    }
}
