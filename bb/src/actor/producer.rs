//! Producer actor

use std::rc::Rc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::domain::{ActorId, Item, Role, SyncMode};
use crate::error::SimError;
use crate::mutex::{NOT_EMPTY, NOT_FULL};
use crate::simulation::{SimContext, SimEvent};

use super::state::{ProducerState, transition};

/// Display colors handed out by producer index
const PALETTE: [&str; 6] = ["red", "green", "blue", "magenta", "cyan", "yellow"];

/// A producer and its lifecycle flags
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Producer {
    pub id: ActorId,
    /// Color tag used when rendering this producer's items
    pub color: &'static str,
    /// Items successfully stored
    pub completed: u64,
    pub state: ProducerState,
    /// An item has been generated and not yet stored
    #[serde(rename = "has-item")]
    pub has_item: bool,
    /// An operation is outstanding; further ticks are ignored
    #[serde(rename = "in-flight")]
    pub in_flight: bool,
}

impl Producer {
    pub fn new(index: usize) -> Self {
        Self {
            id: ActorId::producer(index),
            color: PALETTE[index % PALETTE.len()],
            completed: 0,
            state: ProducerState::Idle,
            has_item: false,
            in_flight: false,
        }
    }

    pub(crate) fn set_state(&mut self, next: ProducerState, mode: SyncMode) -> Result<(), SimError> {
        transition(self.id, &mut self.state, next, mode)
    }

    /// Drop back to idle regardless of the transition table
    pub(crate) fn reset_idle(&mut self) {
        self.state = ProducerState::Idle;
        self.has_item = false;
        self.in_flight = false;
    }
}

fn set_state(ctx: &SimContext, id: ActorId, next: ProducerState) -> Result<(), SimError> {
    let mut producers = ctx.producers.borrow_mut();
    let producer = producers.get_mut(id.index).ok_or(SimError::UnknownActor(id))?;
    producer.set_state(next, ctx.mode)
}

/// Decide whether producer `index` starts an operation on this tick
///
/// Returns the freshly generated item when the operation should run.
pub(crate) fn begin(ctx: &SimContext, index: usize) -> Result<Option<Item>, SimError> {
    let id = ActorId::producer(index);
    debug!(%id, "producer::begin: called");

    {
        let mut producers = ctx.producers.borrow_mut();
        let producer = producers.get_mut(index).ok_or(SimError::UnknownActor(id))?;
        if producer.in_flight {
            return Err(SimError::ReentrancyViolation { actor: id });
        }

        if !ctx.turns.borrow_mut().check(id) {
            // Unsynchronized actors stay idle while they wait for their turn
            if ctx.mode.is_synchronized() {
                producer.set_state(ProducerState::WaitingTurn, ctx.mode)?;
            }
            return Ok(None);
        }

        producer.set_state(ProducerState::Producing, ctx.mode)?;
        producer.in_flight = true;
        producer.has_item = true;
    }

    Ok(Some(ctx.next_item(id)))
}

/// Carry one produce operation to completion
pub(crate) async fn run(ctx: Rc<SimContext>, id: ActorId, item: Item) {
    debug!(%id, %item, mode = %ctx.mode, "producer::run: called");
    let result = match ctx.mode {
        SyncMode::Synchronized => produce_synchronized(&ctx, id, item).await,
        SyncMode::Unsynchronized => produce_unsynchronized(&ctx, id, item).await,
    };

    match result {
        Ok(()) => finish(&ctx, id),
        Err(err) => ctx.recover(id, err),
    }
}

async fn produce_synchronized(ctx: &SimContext, id: ActorId, item: Item) -> Result<(), SimError> {
    ctx.mutex.acquire(id).await?;

    while ctx.buffer.borrow().is_full() {
        set_state(ctx, id, ProducerState::Waiting)?;
        ctx.record(SimEvent::Waiting {
            actor: id,
            condition: NOT_FULL.to_string(),
        });
        ctx.wait(NOT_FULL, id).await?;
    }

    set_state(ctx, id, ProducerState::HoldingLock)?;
    ctx.take_fault(id)?;
    ctx.transfer_delay(id).await?;

    let outcome = ctx
        .buffer
        .borrow_mut()
        .try_write(item)
        .ok_or_else(|| SimError::CriticalSectionFailure {
            actor: id,
            reason: "buffer full after capacity check".to_string(),
        })?;
    ctx.record(SimEvent::Produced {
        actor: id,
        item,
        slot: outcome.slot,
    });

    if let Some(woken) = ctx.mutex.notify(NOT_EMPTY) {
        ctx.record(SimEvent::Woken {
            actor: woken,
            by: id,
            condition: NOT_EMPTY.to_string(),
        });
    }
    ctx.release(id)?;
    Ok(())
}

async fn produce_unsynchronized(ctx: &SimContext, id: ActorId, item: Item) -> Result<(), SimError> {
    ctx.take_fault(id)?;
    ctx.transfer_delay(id).await?;

    let outcome = ctx.buffer.borrow_mut().write(item);
    ctx.record(SimEvent::Produced {
        actor: id,
        item,
        slot: outcome.slot,
    });
    if let Some(lost) = outcome.overwritten {
        warn!(%id, %lost, slot = outcome.slot, "Unsynchronized write overwrote an unread item");
        ctx.record(SimEvent::Overwrite {
            actor: id,
            slot: outcome.slot,
            lost,
            item,
        });
    }
    Ok(())
}

fn finish(ctx: &SimContext, id: ActorId) {
    ctx.turns.borrow_mut().advance(Role::Producer);

    let mut producers = ctx.producers.borrow_mut();
    let Some(producer) = producers.get_mut(id.index) else {
        return;
    };
    producer.completed += 1;
    producer.has_item = false;
    producer.in_flight = false;
    if producer.set_state(ProducerState::Idle, ctx.mode).is_err() {
        producer.reset_idle();
    }
    debug!(%id, completed = producer.completed, "producer::finish: operation complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_producer_is_idle() {
        let producer = Producer::new(1);
        assert_eq!(producer.id, ActorId::producer(1));
        assert_eq!(producer.color, "green");
        assert_eq!(producer.state, ProducerState::Idle);
        assert!(!producer.in_flight);
    }

    #[test]
    fn test_palette_wraps() {
        assert_eq!(Producer::new(PALETTE.len()).color, Producer::new(0).color);
    }

    #[test]
    fn test_reset_idle_clears_flags() {
        let mut producer = Producer::new(0);
        producer
            .set_state(ProducerState::Producing, SyncMode::Synchronized)
            .unwrap();
        producer.in_flight = true;
        producer.has_item = true;

        producer.reset_idle();
        assert_eq!(producer.state, ProducerState::Idle);
        assert!(!producer.in_flight && !producer.has_item);
    }

    #[test]
    fn test_serialize_flags_kebab_case() {
        let json = serde_json::to_string(&Producer::new(0)).unwrap();
        assert!(json.contains("\"has-item\":false"));
        assert!(json.contains("\"in-flight\":false"));
        assert!(json.contains("\"state\":\"idle\""));
    }
}
