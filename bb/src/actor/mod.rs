//! Producer and consumer actors
//!
//! Each actor is plain data (id, counters, state) stored in the simulation
//! context. A tick either declines synchronously (not running, not this
//! actor's turn, already in flight) or starts one operation as a future on
//! the simulation's executor.

mod consumer;
mod producer;
mod state;

pub use consumer::Consumer;
pub use producer::Producer;
pub use state::{ActorState, ConsumerState, ProducerState};

pub(crate) use consumer::{begin as begin_consume, run as run_consume};
pub(crate) use producer::{begin as begin_produce, run as run_produce};

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Simulation is stopped or paused
    Suppressed,
    /// Actor still has an operation outstanding
    InFlight,
    /// Another actor of the same role holds the turn
    NotTurn,
    /// A new operation was started
    Started,
}
