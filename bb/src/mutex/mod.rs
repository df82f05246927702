//! Cooperative mutex with named condition variables
//!
//! A binary lock shared by every actor. Suspended callers are represented by
//! explicit resumption handles (oneshot senders) held in FIFO queues:
//! - **Acquire queue:** callers waiting for the lock
//! - **Condition queues:** callers parked in `wait`, keyed by condition name
//!
//! Handles are only ever resolved by the mutex itself, either when the lock is
//! handed off or when a condition is notified.

mod core;
mod waiter;

pub use self::core::CooperativeMutex;
pub use waiter::{MutexSnapshot, NOT_EMPTY, NOT_FULL};
