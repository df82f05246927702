//! Simulation driver, run context and observability

mod context;
mod core;
mod events;
mod snapshot;

pub use self::core::{RunState, Simulation};
pub use context::SimContext;
pub use events::{EventLog, EventRecord, SimEvent, SimStats};
pub use snapshot::SimSnapshot;
