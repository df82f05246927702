//! Waiter handles and mutex snapshots

use std::collections::BTreeMap;

use serde::Serialize;
use tokio::sync::oneshot;

use crate::domain::ActorId;

/// Condition signalled by consumers after freeing a slot
pub const NOT_FULL: &str = "not_full";

/// Condition signalled by producers after filling a slot
pub const NOT_EMPTY: &str = "not_empty";

/// A suspended caller waiting to be handed the lock
#[derive(Debug)]
pub(crate) struct Waiter {
    pub owner: ActorId,
    pub tx: oneshot::Sender<()>,
}

impl Waiter {
    pub fn new(owner: ActorId) -> (Self, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        (Self { owner, tx }, rx)
    }

    /// The suspended future was dropped and can never be resumed
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Read-only view of the mutex for presentation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MutexSnapshot {
    pub locked: bool,
    pub owner: Option<ActorId>,
    /// Callers waiting for the lock, head first
    #[serde(rename = "acquire-queue")]
    pub acquire_queue: Vec<ActorId>,
    /// Callers parked on each condition, head first
    pub conditions: BTreeMap<String, Vec<ActorId>>,
}

impl MutexSnapshot {
    /// Total number of suspended callers across all queues
    pub fn waiter_count(&self) -> usize {
        self.acquire_queue.len() + self.conditions.values().map(Vec::len).sum::<usize>()
    }
}
