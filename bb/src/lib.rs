//! boundbuf - Bounded-Buffer Producer/Consumer Simulator
//!
//! A fixed-capacity circular buffer shared by producer and consumer actors.
//! Synchronized runs go through a cooperative mutex with condition variables;
//! unsynchronized runs drop the lock and capacity checks so overwrites and
//! stale reads become observable.
//!
//! # Core Concepts
//!
//! - **Cooperative Concurrency**: Actor operations are futures on a
//!   single-threaded executor, interleaving only at await points
//! - **Virtual Time**: The clock moves only through explicit steps, so every
//!   run replays identically for a given seed
//! - **Turn Fairness**: Same-role actors act in strict round-robin order
//! - **Race Injection**: The same actors and buffer, minus synchronization
//!
//! # Modules
//!
//! - [`mutex`] - Cooperative mutex with FIFO hand-off and named conditions
//! - [`scheduler`] - Round-robin turn scheduler
//! - [`buffer`] - Circular buffer with checked and unchecked access
//! - [`actor`] - Producer/consumer state machines and step logic
//! - [`clock`] - Virtual clock with jittered ticks and timers
//! - [`simulation`] - Lifecycle, stepping, snapshots and the event log
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod actor;
pub mod buffer;
pub mod cli;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod mutex;
pub mod scheduler;
pub mod simulation;

// Re-export commonly used types
pub use actor::{Consumer, ConsumerState, Producer, ProducerState, TickOutcome};
pub use buffer::{BufferSnapshot, CircularBuffer};
pub use clock::{ClockConfig, SimulationClock};
pub use config::SimConfig;
pub use domain::{ActorId, Item, Role, SyncMode};
pub use error::SimError;
pub use mutex::{CooperativeMutex, MutexSnapshot, NOT_EMPTY, NOT_FULL};
pub use scheduler::{TurnScheduler, TurnSnapshot};
pub use simulation::{EventRecord, RunState, SimEvent, SimSnapshot, SimStats, Simulation};
